use std::collections::{BTreeMap, BTreeSet};

use mimic_common::{MimicError, Result};
use serde::{Deserialize, Serialize};

use crate::plan::{PlanEntry, RandomizationRule};
use crate::value::Value;

/// Tags the caller wants the profile to satisfy. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
}

/// Input to a single generation call.
///
/// ```
/// use mimic_engine::request::MetaProfileRequest;
/// use mimic_engine::plan::RandomizationRule;
///
/// let request = MetaProfileRequest::new(7)
///     .with_explicit("system.locale", "de-DE")
///     .with_lock("system.os.name")
///     .with_rule("device.viewport.width", RandomizationRule::UniformInt { min: 1280, max: 1920 });
///
/// assert!(request.is_locked("system.locale"));
/// assert!(request.is_locked("system.os.name"));
/// assert!(!request.is_locked("device.viewport.width"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaProfileRequest {
    /// Values copied verbatim into the profile; they win over everything.
    #[serde(default)]
    pub explicit_traits: BTreeMap<String, Value>,
    /// Keys that must not be re-randomized, even when the plan names them.
    #[serde(default)]
    pub locked_keys: BTreeSet<String>,
    #[serde(default)]
    pub plan: BTreeMap<String, PlanEntry>,
    #[serde(default)]
    pub context: RequestContext,
    #[serde(default)]
    pub seed: u64,
}

impl MetaProfileRequest {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| MimicError::Request(e.to_string()))
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_explicit(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.explicit_traits.insert(key.into(), value.into());
        self
    }

    pub fn with_lock(mut self, key: impl Into<String>) -> Self {
        self.locked_keys.insert(key.into());
        self
    }

    pub fn with_rule(mut self, key: impl Into<String>, rule: RandomizationRule) -> Self {
        self.plan.insert(key.into(), PlanEntry::from(rule));
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Explicit and locked keys are both pinned for the whole call.
    pub fn is_locked(&self, key: &str) -> bool {
        self.explicit_traits.contains_key(key) || self.locked_keys.contains(key)
    }

    pub fn pinned_keys(&self) -> BTreeSet<String> {
        self.explicit_traits
            .keys()
            .chain(self.locked_keys.iter())
            .cloned()
            .collect()
    }
}
