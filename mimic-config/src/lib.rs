//! Loader for workspace configuration with YAML + environment overlays.
//!
//! Sources are merged in the order they are attached, with `MIMIC_`-prefixed
//! environment variables applied on top (`MIMIC_GENERATOR__FONT_SUBSET_SIZE=12`
//! maps to `generator.font_subset_size`). String values may reference other
//! environment variables as `${VAR}`; those are expanded after merging.
use config::{Config, ConfigError, Environment, File};
use mimic_common::observability::{LogConfig, LogFormat};
use mimic_common::{BatchSettings, GeneratorSettings};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MimicConfig {
    pub version: Option<String>,
    pub generator: GeneratorSettings,
    pub batch: BatchSettings,
    pub logging: LoggingSettings,
}

/// Logging section; converts into [`LogConfig`] for `init_logging`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub format: LogFormat,
    pub emit_stderr: bool,
    pub default_filter: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            emit_stderr: false,
            default_filter: "info".into(),
            log_dir: None,
        }
    }
}

impl LoggingSettings {
    pub fn to_log_config(&self, app_name: &'static str) -> LogConfig {
        LogConfig {
            app_name,
            log_dir: self.log_dir.clone(),
            emit_stderr: self.emit_stderr,
            format: self.format,
            default_filter: self.default_filter.clone(),
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) if s.contains('$') => {
            let mut cur = std::mem::take(s);
            for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                let expanded = match shellexpand::env(&cur) {
                    Ok(cow) => cow.into_owned(),
                    Err(_) => break,
                };
                if expanded == cur {
                    break;
                }
                cur = expanded;
            }
            *s = cur;
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct MimicConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for MimicConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl MimicConfigLoader {
    /// Start with no files; `MIMIC_` environment overrides are layered last in [`load`](Self::load).
    ///
    /// ```
    /// use mimic_config::MimicConfigLoader;
    ///
    /// let config = MimicConfigLoader::new()
    ///     .with_yaml_str("version: '1'")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.generator.font_subset_size, 30);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, e.g. a per-user override.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use mimic_common::observability::LogFormat;
    /// use mimic_config::MimicConfigLoader;
    ///
    /// let cfg = MimicConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// generator:
    ///   font_subset_size: 12
    /// batch:
    ///   attempt_factor: 8
    /// logging:
    ///   format: json
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.generator.font_subset_size, 12);
    /// assert_eq!(cfg.batch.attempt_factor, 8);
    /// assert_eq!(cfg.logging.format, LogFormat::Json);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    pub fn load(self) -> Result<MimicConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("MIMIC")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("MIMIC_TEST_DIR", Some("/srv/logs"), || {
            let mut v = json!({ "log_dir": "${MIMIC_TEST_DIR}/mimic" });
            expand_env_in_value(&mut v);
            assert_eq!(v, json!({ "log_dir": "/srv/logs/mimic" }));
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [("INNER", Some("debug")), ("OUTER", Some("mimic_engine=${INNER}"))],
            || {
                let mut v = json!(["${OUTER}", 4, null]);
                expand_env_in_value(&mut v);
                assert_eq!(v, json!(["mimic_engine=debug", 4, null]));
            },
        );
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${MIMIC_DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${MIMIC_DOES_NOT_EXIST}"));
    }

    #[test]
    fn logging_settings_convert_to_log_config() {
        let settings = LoggingSettings {
            emit_stderr: true,
            default_filter: "mimic_engine=trace".into(),
            ..LoggingSettings::default()
        };
        let log = settings.to_log_config("mimic-tests");
        assert_eq!(log.app_name, "mimic-tests");
        assert!(log.emit_stderr);
        assert_eq!(log.default_filter, "mimic_engine=trace");
    }
}
