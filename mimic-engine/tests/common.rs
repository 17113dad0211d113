#![allow(dead_code)]

use std::sync::OnceLock;

use mimic_common::observability::{LogConfig, LogFormat};
use mimic_engine::catalog::{CatalogDocument, TraitCatalog};

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "mimic-tests",
            log_dir: Some(std::env::temp_dir().join("mimic-tests")),
            emit_stderr: true,
            format: if std::env::var("MIMIC_LOG_FORMAT")
                .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            default_filter: "debug".to_string(),
        };

        mimic_common::observability::init_logging(config).unwrap_or_default()
    });
}

pub fn catalog_from(doc: serde_json::Value) -> TraitCatalog {
    let doc: CatalogDocument = serde_json::from_value(doc).expect("catalog document");
    TraitCatalog::from_document(doc).expect("valid catalog")
}
