//! File helpers for callers that persist catalogs, requests, and results.
//!
//! Generation itself never touches the filesystem; these functions sit on
//! either side of it.
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use mimic_common::Result;
use serde::Serialize;
use tracing::info;

use crate::batch::BatchOutcome;
use crate::catalog::{CatalogDocument, ImportMode, ImportStats, TraitCatalog};
use crate::generator::GeneratedProfile;
use crate::request::MetaProfileRequest;

pub fn read_catalog_document(path: &Path) -> Result<CatalogDocument> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn load_catalog(path: &Path) -> Result<TraitCatalog> {
    TraitCatalog::from_document(read_catalog_document(path)?)
}

pub fn import_catalog_file(
    catalog: &mut TraitCatalog,
    path: &Path,
    mode: ImportMode,
) -> Result<ImportStats> {
    let document = read_catalog_document(path)?;
    let stats = catalog.import(document, mode)?;
    info!(path = %path.display(), ?mode, "catalog.import.file");
    Ok(stats)
}

pub fn export_catalog(catalog: &TraitCatalog, path: &Path) -> Result<()> {
    write_json(path, &catalog.export())
}

pub fn read_request(path: &Path) -> Result<MetaProfileRequest> {
    let text = std::fs::read_to_string(path)?;
    MetaProfileRequest::from_json(&text)
}

pub fn write_profile(path: &Path, profile: &GeneratedProfile) -> Result<()> {
    write_json(path, profile)
}

/// Writes `<stem>.json` (array of profiles) and `<stem>.summary.json` into `dir`.
pub fn export_batch(dir: &Path, stem: &str, outcome: &BatchOutcome) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let profiles = dir.join(format!("{stem}.json"));
    let summary = dir.join(format!("{stem}.summary.json"));
    write_json(&profiles, &outcome.profiles)?;
    write_json(&summary, &outcome.summary)?;
    info!(
        path = %profiles.display(),
        produced = outcome.summary.produced,
        "batch.exported"
    );
    Ok((profiles, summary))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchDeduper;
    use crate::generator::ProfileGenerator;
    use mimic_common::MimicError;

    #[test]
    fn catalog_export_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let catalog = TraitCatalog::builtin().unwrap();

        export_catalog(&catalog, &path).unwrap();
        let reloaded = load_catalog(&path).unwrap();
        assert_eq!(reloaded.export(), catalog.export());
    }

    #[test]
    fn batch_export_writes_array_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = TraitCatalog::builtin().unwrap();
        let generator = ProfileGenerator::new(&catalog);
        let outcome = BatchDeduper::new(&generator).run(&MetaProfileRequest::new(5), 3);

        let (profiles, summary) = export_batch(dir.path(), "run", &outcome).unwrap();
        let array: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(profiles).unwrap()).unwrap();
        assert_eq!(array.as_array().unwrap().len(), outcome.summary.produced);
        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(summary).unwrap()).unwrap();
        assert_eq!(summary["requested"], 3);
    }

    #[test]
    fn missing_files_are_io_errors() {
        let err = load_catalog(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, MimicError::Io(_)));
    }
}
