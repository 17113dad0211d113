//! Public entry point: request in, profile or failure out.
use std::collections::BTreeMap;
use std::fmt;

use mimic_common::GeneratorSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn};

use crate::catalog::TraitCatalog;
use crate::diagnostics::{Diagnostic, Severity};
use crate::request::MetaProfileRequest;
use crate::resolver::{Resolution, TIER_COUNT};
use crate::validator::{ConsistencyValidator, RuleEnv};
use crate::value::Value;

/// Flat trait map returned by a successful generation. Never mutated after return.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedProfile(BTreeMap<String, Value>);

impl ResolvedProfile {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for ResolvedProfile {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

/// Success result; serializes as the flat trait map plus a `diagnostics` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedProfile {
    #[serde(flatten)]
    pub profile: ResolvedProfile,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// Generation stopped on an unrepairable inconsistency. No profile is returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("profile generation failed for seed {seed}: {}", first_error(.diagnostics))]
pub struct GenerationFailure {
    pub seed: u64,
    pub diagnostics: Vec<Diagnostic>,
}

fn first_error(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
        .map_or_else(|| "unknown error".to_string(), ToString::to_string)
}

impl GenerationFailure {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    ResolveTier(u8),
    Validate,
    Repair,
    Emit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => f.write_str("init"),
            Phase::ResolveTier(tier) => write!(f, "resolve-tier-{tier}"),
            Phase::Validate => f.write_str("validate"),
            Phase::Repair => f.write_str("repair"),
            Phase::Emit => f.write_str("emit"),
        }
    }
}

/// Orchestrates resolution and validation against a shared catalog snapshot.
///
/// The generator holds no mutable state, so one instance can serve
/// concurrent calls from several threads.
///
/// ```
/// use mimic_engine::catalog::TraitCatalog;
/// use mimic_engine::generator::ProfileGenerator;
/// use mimic_engine::request::MetaProfileRequest;
///
/// let catalog = TraitCatalog::builtin().unwrap();
/// let generator = ProfileGenerator::new(&catalog);
///
/// let a = generator.generate(&MetaProfileRequest::new(42)).unwrap();
/// let b = generator.generate(&MetaProfileRequest::new(42)).unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct ProfileGenerator<'a> {
    catalog: &'a TraitCatalog,
    settings: GeneratorSettings,
}

impl<'a> ProfileGenerator<'a> {
    pub fn new(catalog: &'a TraitCatalog) -> Self {
        Self::with_settings(catalog, GeneratorSettings::default())
    }

    pub fn with_settings(catalog: &'a TraitCatalog, settings: GeneratorSettings) -> Self {
        Self { catalog, settings }
    }

    pub fn catalog(&self) -> &'a TraitCatalog {
        self.catalog
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn generate(
        &self,
        request: &MetaProfileRequest,
    ) -> Result<GeneratedProfile, GenerationFailure> {
        let span = info_span!("generate", seed = request.seed);
        let _guard = span.enter();

        enter(Phase::Init);
        let mut resolution = Resolution::begin(self.catalog, request, &self.settings);
        for tier in 0..TIER_COUNT {
            enter(Phase::ResolveTier(tier));
            resolution.resolve_tier(tier);
        }
        let (resolved, mut sampler, mut diagnostics) = resolution.finish();

        enter(Phase::Validate);
        let pinned = request.pinned_keys();
        let validator = ConsistencyValidator::new(RuleEnv {
            catalog: self.catalog,
            context: &request.context,
            settings: &self.settings,
            pinned: &pinned,
        });
        let findings = validator.check(&resolved);
        let profile = if findings.is_empty() {
            resolved
        } else {
            enter(Phase::Repair);
            debug!(violations = findings.len(), "generator.repair.start");
            let repaired = validator.repair(&resolved, &mut sampler);
            diagnostics.extend(repaired.diagnostics);
            repaired.profile
        };

        if diagnostics.has_errors() {
            let diagnostics = diagnostics.into_vec();
            warn!(
                errors = diagnostics.iter().filter(|d| d.severity == Severity::Error).count(),
                "generator.failed"
            );
            return Err(GenerationFailure {
                seed: request.seed,
                diagnostics,
            });
        }

        enter(Phase::Emit);
        let diagnostics = diagnostics.into_vec();
        debug!(
            traits = profile.len(),
            diagnostics = diagnostics.len(),
            draws = sampler.draws(),
            "generator.emitted"
        );
        Ok(GeneratedProfile {
            profile: ResolvedProfile(profile),
            diagnostics,
        })
    }
}

fn enter(phase: Phase) {
    debug!(%phase, "generator.phase");
}
