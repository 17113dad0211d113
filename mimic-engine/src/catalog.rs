//! Trait catalog: definitions, weighted options, and the GPU/font sub-catalogs.
//!
//! A [`TraitCatalog`] is built or updated from a [`CatalogDocument`] by its
//! owner and then shared read-only by any number of generation calls.
//! Imports are validated in full before anything is applied, so a rejected
//! document leaves the catalog untouched.
use std::collections::{BTreeMap, BTreeSet, HashMap};

use mimic_common::{MimicError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::value::{Value, ValueKind};

/// Schema major version accepted by [`TraitCatalog::import`].
pub const SCHEMA_MAJOR: &str = "1.";
pub const SCHEMA_VERSION: &str = "1.0";

const BUILTIN_CATALOG: &str = include_str!("../assets/default_catalog.json");

/// Filtering tags shared by options and GPU entries. `None` is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextTags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
}

/// Anything the context filter can narrow.
pub trait Tagged {
    fn region(&self) -> Option<&str>;
    fn vendor(&self) -> Option<&str>;
    fn device_class(&self) -> Option<&str>;
}

/// Anything the weighted sampler can pick from.
pub trait Weighted {
    fn weight(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraitDefinition {
    pub key: String,
    pub kind: ValueKind,
    pub default_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitOption {
    pub key: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(flatten)]
    pub tags: ContextTags,
    /// Already-resolved trait values this option requires.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub when: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuEntry {
    /// Hardware vendor family, e.g. `NVIDIA`; matched against the context vendor.
    pub gpu_vendor: String,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    #[serde(default)]
    pub os: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontEntry {
    pub name: String,
    #[serde(default)]
    pub os: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

impl Tagged for TraitOption {
    fn region(&self) -> Option<&str> {
        self.tags.region.as_deref()
    }
    fn vendor(&self) -> Option<&str> {
        self.tags.vendor.as_deref()
    }
    fn device_class(&self) -> Option<&str> {
        self.tags.device_class.as_deref()
    }
}

impl Weighted for TraitOption {
    fn weight(&self) -> f64 {
        self.weight
    }
}

impl Tagged for GpuEntry {
    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
    fn vendor(&self) -> Option<&str> {
        Some(&self.gpu_vendor)
    }
    fn device_class(&self) -> Option<&str> {
        self.device_class.as_deref()
    }
}

impl Weighted for GpuEntry {
    fn weight(&self) -> f64 {
        self.weight
    }
}

impl GpuEntry {
    pub fn supports_os(&self, os: &str) -> bool {
        supports_os(&self.os, os)
    }
}

impl FontEntry {
    pub fn supports_os(&self, os: &str) -> bool {
        supports_os(&self.os, os)
    }
}

/// OS names compare case-insensitively (`macos` == `macOS`).
fn supports_os(list: &[String], os: &str) -> bool {
    list.iter().any(|candidate| candidate.eq_ignore_ascii_case(os))
}

impl TraitOption {
    /// True when every `when` condition is satisfied by `resolved`.
    pub fn conditions_hold(&self, resolved: &BTreeMap<String, Value>) -> bool {
        self.when
            .iter()
            .all(|(key, expected)| resolved.get(key) == Some(expected))
    }
}

/// Wire form of a trait definition; `valueType` may be omitted when the default is non-null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionRecord {
    pub key: String,
    #[serde(default)]
    pub default_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueKind>,
}

impl TryFrom<DefinitionRecord> for TraitDefinition {
    type Error = MimicError;

    fn try_from(record: DefinitionRecord) -> Result<Self> {
        let kind = match (record.value_type, record.default_value.kind()) {
            (Some(kind), _) => kind,
            (None, ValueKind::Null) => {
                return Err(MimicError::Catalog(format!(
                    "trait '{}' has a null default and no valueType",
                    record.key
                )))
            }
            (None, inferred) => inferred,
        };
        if !kind.accepts(&record.default_value) {
            return Err(MimicError::Catalog(format!(
                "trait '{}' default {} is not a {:?}",
                record.key, record.default_value, kind
            )));
        }
        Ok(Self {
            key: record.key,
            kind,
            default_value: record.default_value,
        })
    }
}

impl From<&TraitDefinition> for DefinitionRecord {
    fn from(def: &TraitDefinition) -> Self {
        Self {
            key: def.key.clone(),
            default_value: def.default_value.clone(),
            value_type: Some(def.kind),
        }
    }
}

/// JSON import/export document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub definitions: Vec<DefinitionRecord>,
    #[serde(default)]
    pub options: Vec<TraitOption>,
    #[serde(default)]
    pub gpus: Vec<GpuEntry>,
    #[serde(default)]
    pub fonts: Vec<FontEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Add or update by key; unrelated entries stay.
    Merge,
    /// Keys present in the document replace their definition and whole option list.
    Overwrite,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub definitions_added: usize,
    pub definitions_updated: usize,
    pub options_added: usize,
    pub options_updated: usize,
    pub options_dropped: usize,
    pub gpus_upserted: usize,
    pub fonts_upserted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TraitCatalog {
    definitions: Vec<TraitDefinition>,
    index: HashMap<String, usize>,
    options: HashMap<String, Vec<TraitOption>>,
    gpus: Vec<GpuEntry>,
    fonts: Vec<FontEntry>,
}

impl TraitCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog shipped with the crate, covering every registered tier key.
    pub fn builtin() -> Result<Self> {
        let document: CatalogDocument = serde_json::from_str(BUILTIN_CATALOG)?;
        Self::from_document(document)
    }

    pub fn from_document(document: CatalogDocument) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.import(document, ImportMode::Overwrite)?;
        Ok(catalog)
    }

    /// Apply `document` atomically; on error the catalog is unchanged.
    pub fn import(&mut self, document: CatalogDocument, mode: ImportMode) -> Result<ImportStats> {
        if let Some(version) = &document.schema_version {
            if !version.starts_with(SCHEMA_MAJOR) {
                return Err(MimicError::Catalog(format!(
                    "unsupported schema version {version}"
                )));
            }
        }

        let mut seen = BTreeSet::new();
        let mut incoming = Vec::with_capacity(document.definitions.len());
        for record in document.definitions {
            if !seen.insert(record.key.clone()) {
                return Err(MimicError::Catalog(format!(
                    "duplicate definition '{}'",
                    record.key
                )));
            }
            incoming.push(TraitDefinition::try_from(record)?);
        }

        let mut next = self.clone();
        let mut stats = ImportStats::default();

        let mut retyped = Vec::new();
        for def in incoming {
            match next.index.get(&def.key) {
                Some(&pos) => {
                    if next.definitions[pos].kind != def.kind {
                        retyped.push(def.key.clone());
                    }
                    next.definitions[pos] = def;
                    stats.definitions_updated += 1;
                }
                None => {
                    next.index.insert(def.key.clone(), next.definitions.len());
                    next.definitions.push(def);
                    stats.definitions_added += 1;
                }
            }
        }

        if mode == ImportMode::Overwrite {
            let touched: BTreeSet<&str> = seen
                .iter()
                .map(String::as_str)
                .chain(document.options.iter().map(|o| o.key.as_str()))
                .collect();
            for key in touched {
                if let Some(list) = next.options.get_mut(key) {
                    stats.options_dropped += list.len();
                    list.clear();
                }
            }
        }

        // Options kept from before must still fit a definition whose kind changed.
        for key in &retyped {
            for option in next.options(key) {
                next.check_option(option)?;
            }
        }

        for option in document.options {
            next.check_option(&option)?;
            let list = next.options.entry(option.key.clone()).or_default();
            match list.iter_mut().find(|existing| existing.value == option.value) {
                Some(existing) if mode == ImportMode::Merge => {
                    *existing = option;
                    stats.options_updated += 1;
                }
                _ => {
                    list.push(option);
                    stats.options_added += 1;
                }
            }
        }

        for gpu in document.gpus {
            check_weight("gpu", &gpu.webgl_renderer, gpu.weight)?;
            match next.gpus.iter_mut().find(|g| {
                g.webgl_vendor == gpu.webgl_vendor && g.webgl_renderer == gpu.webgl_renderer
            }) {
                Some(existing) => *existing = gpu,
                None => next.gpus.push(gpu),
            }
            stats.gpus_upserted += 1;
        }

        for font in document.fonts {
            match next
                .fonts
                .iter_mut()
                .find(|f| f.name.eq_ignore_ascii_case(&font.name))
            {
                Some(existing) => *existing = font,
                None => next.fonts.push(font),
            }
            stats.fonts_upserted += 1;
        }

        *self = next;
        info!(
            ?mode,
            definitions = self.definitions.len(),
            added = stats.definitions_added,
            options_added = stats.options_added,
            options_dropped = stats.options_dropped,
            "catalog.import.applied"
        );
        Ok(stats)
    }

    fn check_option(&self, option: &TraitOption) -> Result<()> {
        let def = self.definition(&option.key).ok_or_else(|| {
            MimicError::Catalog(format!("option for undefined trait '{}'", option.key))
        })?;
        check_weight("option", &option.key, option.weight)?;
        if !def.kind.accepts(&option.value) {
            return Err(MimicError::Catalog(format!(
                "option {} for '{}' is not a {:?}",
                option.value, option.key, def.kind
            )));
        }
        Ok(())
    }

    /// Full catalog in insertion order.
    pub fn export(&self) -> CatalogDocument {
        debug!(definitions = self.definitions.len(), "catalog.export");
        CatalogDocument {
            schema_version: Some(SCHEMA_VERSION.to_string()),
            definitions: self.definitions.iter().map(DefinitionRecord::from).collect(),
            options: self
                .definitions
                .iter()
                .flat_map(|def| self.options(&def.key).iter().cloned())
                .collect(),
            gpus: self.gpus.clone(),
            fonts: self.fonts.clone(),
        }
    }

    pub fn definition(&self, key: &str) -> Option<&TraitDefinition> {
        self.index.get(key).map(|&pos| &self.definitions[pos])
    }

    pub fn definitions(&self) -> &[TraitDefinition] {
        &self.definitions
    }

    /// Declared (insertion) order of `key`, used to order keys within a tier.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn options(&self, key: &str) -> &[TraitOption] {
        self.options.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn gpus(&self) -> &[GpuEntry] {
        &self.gpus
    }

    pub fn fonts(&self) -> &[FontEntry] {
        &self.fonts
    }

    pub fn fonts_for_os<'a>(&'a self, os: &'a str) -> impl Iterator<Item = &'a FontEntry> + 'a {
        self.fonts.iter().filter(move |font| font.supports_os(os))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn check_weight(what: &str, key: &str, weight: f64) -> Result<()> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(MimicError::Catalog(format!(
            "{what} '{key}' has invalid weight {weight}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> CatalogDocument {
        serde_json::from_value(value).unwrap()
    }

    fn base() -> TraitCatalog {
        TraitCatalog::from_document(doc(json!({
            "definitions": [
                { "key": "system.locale", "defaultValue": "en-US" },
                { "key": "system.timezone", "defaultValue": "UTC" }
            ],
            "options": [
                { "key": "system.locale", "value": "en-US", "weight": 3 },
                { "key": "system.locale", "value": "de-DE", "region": "DE" },
                { "key": "system.timezone", "value": "Europe/Berlin" }
            ]
        })))
        .unwrap()
    }

    #[test]
    fn builtin_catalog_loads() {
        let catalog = TraitCatalog::builtin().unwrap();
        assert!(catalog.contains("system.os.name"));
        assert!(catalog.contains("browser.userAgent"));
        assert!(!catalog.gpus().is_empty());
        assert!(catalog.fonts_for_os("windows").count() > 10);
    }

    #[test]
    fn merge_updates_matching_values_and_keeps_the_rest() {
        let mut catalog = base();
        let stats = catalog
            .import(
                doc(json!({
                    "options": [
                        { "key": "system.locale", "value": "en-US", "weight": 9 },
                        { "key": "system.locale", "value": "ja-JP", "region": "JP" }
                    ]
                })),
                ImportMode::Merge,
            )
            .unwrap();

        assert_eq!(stats.options_updated, 1);
        assert_eq!(stats.options_added, 1);
        let locales = catalog.options("system.locale");
        assert_eq!(locales.len(), 3);
        assert_eq!(locales[0].weight, 9.0);
        assert_eq!(catalog.options("system.timezone").len(), 1);
    }

    #[test]
    fn overwrite_replaces_option_lists_for_touched_keys() {
        let mut catalog = base();
        catalog
            .import(
                doc(json!({
                    "options": [ { "key": "system.locale", "value": "fr-FR" } ]
                })),
                ImportMode::Overwrite,
            )
            .unwrap();

        let locales = catalog.options("system.locale");
        assert_eq!(locales.len(), 1);
        assert_eq!(locales[0].value, Value::from("fr-FR"));
        assert_eq!(catalog.options("system.timezone").len(), 1);
    }

    #[test]
    fn rejected_import_leaves_catalog_untouched() {
        let mut catalog = base();
        let err = catalog
            .import(
                doc(json!({
                    "options": [
                        { "key": "system.locale", "value": "it-IT" },
                        { "key": "system.locale", "value": 42 }
                    ]
                })),
                ImportMode::Merge,
            )
            .unwrap_err();

        assert!(matches!(err, MimicError::Catalog(_)));
        assert_eq!(catalog.options("system.locale").len(), 2);
    }

    #[test]
    fn retyping_a_definition_rejects_its_surviving_options() {
        let mut catalog = TraitCatalog::from_document(doc(json!({
            "definitions": [ { "key": "device.viewport.width", "defaultValue": 1920 } ],
            "options": [ { "key": "device.viewport.width", "value": 1920 } ]
        })))
        .unwrap();

        let retyped = doc(json!({
            "definitions": [ { "key": "device.viewport.width", "defaultValue": "wide" } ]
        }));
        let err = catalog.import(retyped.clone(), ImportMode::Merge).unwrap_err();
        assert!(matches!(err, MimicError::Catalog(_)));
        let def = catalog.definition("device.viewport.width").unwrap();
        assert_eq!(def.kind, ValueKind::Int);
        assert_eq!(catalog.options("device.viewport.width")[0].value, Value::Int(1920));

        // Overwrite drops the old options first, so the new kind applies cleanly.
        catalog.import(retyped, ImportMode::Overwrite).unwrap();
        assert_eq!(
            catalog.definition("device.viewport.width").unwrap().kind,
            ValueKind::String
        );
        assert!(catalog.options("device.viewport.width").is_empty());
    }

    #[test]
    fn rejects_negative_weights_and_unknown_keys() {
        let mut catalog = base();
        let negative = doc(json!({
            "options": [ { "key": "system.locale", "value": "it-IT", "weight": -1 } ]
        }));
        assert!(catalog.import(negative, ImportMode::Merge).is_err());

        let unknown = doc(json!({ "options": [ { "key": "nope", "value": 1 } ] }));
        assert!(catalog.import(unknown, ImportMode::Merge).is_err());
    }

    #[test]
    fn rejects_duplicate_definitions_and_untyped_null_defaults() {
        let duplicate = doc(json!({
            "definitions": [
                { "key": "a", "defaultValue": 1 },
                { "key": "a", "defaultValue": 2 }
            ]
        }));
        assert!(TraitCatalog::from_document(duplicate).is_err());

        let untyped = doc(json!({ "definitions": [ { "key": "a" } ] }));
        assert!(TraitCatalog::from_document(untyped).is_err());

        let typed = doc(json!({
            "definitions": [ { "key": "a", "valueType": "String" } ]
        }));
        let catalog = TraitCatalog::from_document(typed).unwrap();
        assert_eq!(catalog.definition("a").unwrap().kind, ValueKind::String);
    }

    #[test]
    fn rejects_unsupported_schema_versions() {
        let future = doc(json!({ "schemaVersion": "2.0" }));
        assert!(TraitCatalog::from_document(future).is_err());
    }

    #[test]
    fn export_round_trips_through_import() {
        let catalog = TraitCatalog::builtin().unwrap();
        let exported = catalog.export();
        assert_eq!(exported.schema_version.as_deref(), Some(SCHEMA_VERSION));

        let reimported = TraitCatalog::from_document(exported.clone()).unwrap();
        assert_eq!(reimported.export(), exported);
    }
}
