//! Tiered trait resolution.
//!
//! The resolution order is data: [`REGISTRY`] assigns each derived key a tier,
//! its direct inputs, and how its value is produced. Keys the registry does
//! not name are sampled in tier 0. Within a tier, keys resolve in catalog
//! order, and each tier finishes before the next begins.
//!
//! Pinned keys (explicit or locked in the request) are written once during
//! [`Resolution::begin`] and never consume a draw. Their consumers still
//! resolve normally, conditioned on the pinned value. Pins also narrow the
//! traits they depend on: when every catalog option carrying a pinned value
//! declares a `when` condition on a key, that key is sampled only from the
//! values those conditions name. A pinned user agent does the same for the
//! OS and browser it names.
pub mod compose;

use std::collections::{BTreeMap, BTreeSet};

use mimic_common::GeneratorSettings;
use tracing::{debug, trace};

use crate::catalog::{GpuEntry, TraitCatalog, TraitDefinition, TraitOption};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::filter::{conditioned, ContextFilter};
use crate::keys;
use crate::plan::{shuffle_value, PlanEntry, RandomizationRule};
use crate::request::{MetaProfileRequest, RequestContext};
use crate::sampler::WeightedSampler;
use crate::value::Value;

pub const TIER_COUNT: u8 = 4;

/// What a computed derivation produced.
pub enum Derived {
    Value(Value),
    /// No rule applies; use weighted catalog sampling instead.
    Sample,
    /// Inputs were present but no valid value exists; the default is used with a warning.
    Unavailable(String),
}

pub enum Derivation {
    Sample,
    Compute(fn(&mut Resolution<'_>) -> Derived),
}

pub struct Registration {
    pub key: &'static str,
    pub tier: u8,
    pub inputs: &'static [&'static str],
    pub derivation: Derivation,
}

const fn sampled(key: &'static str, tier: u8, inputs: &'static [&'static str]) -> Registration {
    Registration {
        key,
        tier,
        inputs,
        derivation: Derivation::Sample,
    }
}

const fn computed(
    key: &'static str,
    tier: u8,
    inputs: &'static [&'static str],
    derive: fn(&mut Resolution<'_>) -> Derived,
) -> Registration {
    Registration {
        key,
        tier,
        inputs,
        derivation: Derivation::Compute(derive),
    }
}

pub static REGISTRY: &[Registration] = &[
    sampled(keys::OS_NAME, 0, &[]),
    sampled(keys::DEVICE_CLASS, 0, &[]),
    sampled(keys::LOCALE, 0, &[]),
    computed(keys::PLATFORM, 1, &[keys::OS_NAME], derive_platform),
    sampled(keys::CPU_ARCH, 1, &[keys::OS_NAME]),
    sampled(keys::GPU_VENDOR, 1, &[keys::OS_NAME]),
    sampled(keys::TIMEZONE, 1, &[keys::LOCALE]),
    computed(keys::LANGUAGES, 1, &[keys::LOCALE], derive_languages),
    computed(keys::MAX_TOUCH_POINTS, 1, &[keys::DEVICE_CLASS], derive_touch_points),
    sampled(keys::VIEWPORT_HEIGHT, 1, &[keys::VIEWPORT_WIDTH]),
    sampled(keys::BROWSER_NAME, 2, &[keys::OS_NAME]),
    computed(keys::BROWSER_ENGINE, 2, &[keys::BROWSER_NAME], derive_engine),
    sampled(keys::BROWSER_VERSION, 2, &[keys::BROWSER_NAME]),
    computed(
        keys::WEBGL_VENDOR,
        2,
        &[keys::GPU_VENDOR, keys::OS_NAME],
        derive_webgl_vendor,
    ),
    computed(
        keys::WEBGL_RENDERER,
        2,
        &[keys::WEBGL_VENDOR, keys::OS_NAME],
        derive_webgl_renderer,
    ),
    sampled(keys::FONTS_MODE, 2, &[]),
    computed(
        keys::USER_AGENT,
        3,
        &[keys::OS_NAME, keys::BROWSER_NAME, keys::BROWSER_VERSION],
        derive_user_agent,
    ),
    computed(
        keys::CLIENT_HINTS,
        3,
        &[keys::USER_AGENT, keys::PLATFORM],
        derive_client_hints,
    ),
    computed(
        keys::FONTS_LIST,
        3,
        &[keys::OS_NAME, keys::FONTS_MODE],
        derive_font_list,
    ),
];

pub fn registration(key: &str) -> Option<&'static Registration> {
    REGISTRY.iter().find(|r| r.key == key)
}

pub fn tier_of(key: &str) -> u8 {
    registration(key).map_or(0, |r| r.tier)
}

/// GPU entries eligible for `os` under the request context.
pub fn gpu_candidates<'c>(
    catalog: &'c TraitCatalog,
    context: &RequestContext,
    os: &str,
) -> Vec<&'c GpuEntry> {
    ContextFilter::new(context)
        .apply(catalog.gpus())
        .into_iter()
        .filter(|gpu| gpu.supports_os(os))
        .collect()
}

/// Font names available for `os`, in catalog order.
pub fn font_names(catalog: &TraitCatalog, os: &str) -> Vec<String> {
    catalog.fonts_for_os(os).map(|f| f.name.clone()).collect()
}

/// In-progress state of one generation call.
pub struct Resolution<'a> {
    catalog: &'a TraitCatalog,
    request: &'a MetaProfileRequest,
    settings: &'a GeneratorSettings,
    pinned: BTreeSet<String>,
    sampler: WeightedSampler,
    resolved: BTreeMap<String, Value>,
    diagnostics: Diagnostics,
}

impl<'a> Resolution<'a> {
    /// Seed the RNG and copy pinned values into the profile.
    pub fn begin(
        catalog: &'a TraitCatalog,
        request: &'a MetaProfileRequest,
        settings: &'a GeneratorSettings,
    ) -> Self {
        let mut diagnostics = Diagnostics::default();
        let mut resolved = BTreeMap::new();

        for (key, value) in &request.explicit_traits {
            match catalog.definition(key) {
                Some(def) if !def.kind.accepts(value) => diagnostics.warn(
                    key.as_str(),
                    format!("explicit value {value} is not a {:?}; kept as given", def.kind),
                ),
                Some(_) => {}
                None => diagnostics.push(Diagnostic::info(
                    key.as_str(),
                    "explicit trait is not in the catalog; kept as given",
                )),
            }
            resolved.insert(key.clone(), value.clone());
        }

        for key in &request.locked_keys {
            if resolved.contains_key(key) {
                continue;
            }
            match catalog.definition(key) {
                Some(def) => {
                    resolved.insert(key.clone(), def.default_value.clone());
                }
                None => diagnostics.push(Diagnostic::info(
                    key.as_str(),
                    "locked key is not in the catalog; ignored",
                )),
            }
        }

        for key in request.plan.keys() {
            if !catalog.contains(key) {
                diagnostics.push(Diagnostic::info(
                    key.as_str(),
                    "plan rule names a key outside the catalog; ignored",
                ));
            }
        }

        Self {
            catalog,
            request,
            settings,
            pinned: request.pinned_keys(),
            sampler: WeightedSampler::from_seed(request.seed),
            resolved,
            diagnostics,
        }
    }

    /// Resolve every catalog key assigned to `tier`; returns how many were drawn.
    pub fn resolve_tier(&mut self, tier: u8) -> usize {
        let catalog = self.catalog;
        let mut count = 0;
        for def in catalog.definitions().iter().filter(|d| tier_of(&d.key) == tier) {
            if self.request.is_locked(&def.key) {
                if self.request.plan.contains_key(&def.key) {
                    self.diagnostics.push(Diagnostic::info(
                        def.key.as_str(),
                        "plan rule ignored for a pinned key",
                    ));
                }
                trace!(key = %def.key, "resolver.trait.pinned");
                continue;
            }
            let value = self.resolve_key(def);
            self.resolved.insert(def.key.clone(), value);
            count += 1;
        }
        debug!(tier, count, draws = self.sampler.draws(), "resolver.tier.resolved");
        count
    }

    fn resolve_key(&mut self, def: &TraitDefinition) -> Value {
        let key = def.key.as_str();
        let mut shuffle = false;
        match self.request.plan.get(key) {
            Some(PlanEntry::Rule(RandomizationRule::Shuffle)) => shuffle = true,
            Some(PlanEntry::Rule(rule)) => {
                let drawn = rule.draw(&mut self.sampler, self.settings.normal_floor);
                match drawn.and_then(|v| def.kind.coerce(v)) {
                    Some(value) => {
                        trace!(key, %value, "resolver.trait.planned");
                        return value;
                    }
                    None => self.diagnostics.warn(
                        key,
                        format!("plan output is not a {:?}; sampling from catalog", def.kind),
                    ),
                }
            }
            Some(PlanEntry::Malformed { reason, .. }) => self.diagnostics.warn(
                key,
                format!("malformed plan rule ({reason}); sampling from catalog"),
            ),
            None => {}
        }

        let value = self.derive(def);
        if !shuffle {
            return value;
        }
        match shuffle_value(&value, &mut self.sampler) {
            Ok(shuffled) => shuffled,
            Err(reason) => {
                self.diagnostics.warn(key, format!("{reason}; left unshuffled"));
                value
            }
        }
    }

    fn derive(&mut self, def: &TraitDefinition) -> Value {
        let key = def.key.as_str();
        if let Some(reg) = registration(key) {
            let missing: Vec<&str> = reg
                .inputs
                .iter()
                .copied()
                .filter(|input| self.value(input).is_none())
                .collect();
            if !missing.is_empty() {
                self.diagnostics.warn(
                    key,
                    format!("unmet dependency on {}; using default", missing.join(", ")),
                );
                return def.default_value.clone();
            }
            if let Derivation::Compute(compute) = reg.derivation {
                match compute(self) {
                    Derived::Value(value) => return value,
                    Derived::Unavailable(reason) => {
                        self.diagnostics
                            .warn(key, format!("{reason}; using default"));
                        return def.default_value.clone();
                    }
                    Derived::Sample => {}
                }
            }
        }
        self.sample(def)
    }

    fn sample(&mut self, def: &TraitDefinition) -> Value {
        let key = def.key.as_str();
        let options = self.catalog.options(key);
        if options.is_empty() {
            trace!(key, "resolver.trait.no_options");
            return def.default_value.clone();
        }

        let eligible = ContextFilter::new(&self.request.context).apply(options);
        if eligible.is_empty() {
            self.diagnostics.warn(
                key,
                format!(
                    "no option matches context {:?}; using default",
                    self.request.context
                ),
            );
            return def.default_value.clone();
        }

        let eligible = conditioned(eligible, &self.resolved);
        if eligible.is_empty() {
            self.diagnostics
                .warn(key, "no option satisfies resolved traits; using default");
            return def.default_value.clone();
        }
        let eligible = self.narrow_to_pins(key, eligible);

        self.sampler
            .pick(&eligible)
            .map(|option| option.value.clone())
            .unwrap_or_else(|| def.default_value.clone())
    }

    /// Drop options a pinned trait cannot coexist with. When nothing survives,
    /// the unnarrowed set is kept and the validator reports the conflict.
    fn narrow_to_pins<'o>(&self, key: &str, eligible: Vec<&'o TraitOption>) -> Vec<&'o TraitOption> {
        let allowed = self.pinned_allowances(key);
        if allowed.is_empty() {
            return eligible;
        }
        let narrowed: Vec<&TraitOption> = eligible
            .iter()
            .copied()
            .filter(|option| {
                allowed
                    .iter()
                    .all(|values| values.iter().any(|v| same_value(v, &option.value)))
            })
            .collect();
        if narrowed.is_empty() {
            trace!(key, "resolver.trait.pins_unsatisfiable");
            return eligible;
        }
        narrowed
    }

    /// One allowed-value set per pinned trait that constrains `key`.
    fn pinned_allowances(&self, key: &str) -> Vec<Vec<Value>> {
        let mut allowed = Vec::new();
        for pinned in self.pinned.iter().filter(|p| p.as_str() != key) {
            let Some(pinned_value) = self.value(pinned) else {
                continue;
            };
            let holders: Vec<&TraitOption> = self
                .catalog
                .options(pinned)
                .iter()
                .filter(|option| option.value == *pinned_value)
                .collect();
            let values: Option<Vec<Value>> = holders
                .iter()
                .map(|option| option.when.get(key).cloned())
                .collect();
            match values {
                Some(values) if !values.is_empty() => allowed.push(values),
                _ => {}
            }
        }

        if self.pinned.contains(keys::USER_AGENT) {
            let family = self.str_value(keys::USER_AGENT).and_then(|ua| match key {
                keys::OS_NAME => compose::ua_os_family(ua),
                keys::BROWSER_NAME => compose::ua_browser_family(ua),
                _ => None,
            });
            if let Some(family) = family {
                allowed.push(vec![Value::from(family)]);
            }
        }
        allowed
    }

    /// Resolved, non-null value for `key`.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.resolved.get(key).filter(|v| !v.is_null())
    }

    pub fn str_value(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(Value::as_str)
    }

    pub fn catalog(&self) -> &'a TraitCatalog {
        self.catalog
    }

    pub fn context(&self) -> &'a RequestContext {
        &self.request.context
    }

    pub fn settings(&self) -> &'a GeneratorSettings {
        self.settings
    }

    pub fn sampler(&mut self) -> &mut WeightedSampler {
        &mut self.sampler
    }

    pub fn finish(self) -> (BTreeMap<String, Value>, WeightedSampler, Diagnostics) {
        (self.resolved, self.sampler, self.diagnostics)
    }
}

// Inputs are present by the time these run; the `Sample` fallbacks cover
// non-string payloads only.

fn derive_platform(r: &mut Resolution<'_>) -> Derived {
    match r.str_value(keys::OS_NAME).and_then(compose::platform_for_os) {
        Some(platform) => Derived::Value(Value::from(platform)),
        None => Derived::Sample,
    }
}

fn derive_languages(r: &mut Resolution<'_>) -> Derived {
    match r.str_value(keys::LOCALE) {
        Some(locale) => Derived::Value(Value::from(compose::languages_for_locale(locale))),
        None => Derived::Sample,
    }
}

fn derive_touch_points(r: &mut Resolution<'_>) -> Derived {
    match r.str_value(keys::DEVICE_CLASS) {
        Some(class) if class.eq_ignore_ascii_case("desktop") => Derived::Value(Value::Int(0)),
        _ => Derived::Sample,
    }
}

fn derive_engine(r: &mut Resolution<'_>) -> Derived {
    match r.str_value(keys::BROWSER_NAME).and_then(compose::engine_for_browser) {
        Some(engine) => Derived::Value(Value::from(engine)),
        None => Derived::Sample,
    }
}

fn derive_webgl_vendor(r: &mut Resolution<'_>) -> Derived {
    let (Some(os), Some(vendor)) = (r.str_value(keys::OS_NAME), r.str_value(keys::GPU_VENDOR))
    else {
        return Derived::Sample;
    };
    let (os, vendor) = (os.to_string(), vendor.to_string());
    let candidates: Vec<&GpuEntry> = gpu_candidates(r.catalog(), r.context(), &os)
        .into_iter()
        .filter(|gpu| gpu.gpu_vendor.eq_ignore_ascii_case(&vendor))
        .collect();
    match r.sampler().pick(&candidates) {
        Some(gpu) => Derived::Value(Value::from(gpu.webgl_vendor.as_str())),
        None => Derived::Unavailable(format!("no GPU entry for {vendor} on {os}")),
    }
}

fn derive_webgl_renderer(r: &mut Resolution<'_>) -> Derived {
    let (Some(os), Some(webgl_vendor)) =
        (r.str_value(keys::OS_NAME), r.str_value(keys::WEBGL_VENDOR))
    else {
        return Derived::Sample;
    };
    let (os, webgl_vendor) = (os.to_string(), webgl_vendor.to_string());
    let candidates: Vec<&GpuEntry> = gpu_candidates(r.catalog(), r.context(), &os)
        .into_iter()
        .filter(|gpu| gpu.webgl_vendor == webgl_vendor)
        .collect();
    match r.sampler().pick(&candidates) {
        Some(gpu) => Derived::Value(Value::from(gpu.webgl_renderer.as_str())),
        None => Derived::Unavailable(format!("no renderer for {webgl_vendor} on {os}")),
    }
}

fn derive_user_agent(r: &mut Resolution<'_>) -> Derived {
    let composed = match (
        r.str_value(keys::OS_NAME),
        r.str_value(keys::BROWSER_NAME),
        r.str_value(keys::BROWSER_VERSION),
    ) {
        (Some(os), Some(browser), Some(version)) => {
            match compose::user_agent(os, browser, version, r.str_value(keys::CPU_ARCH)) {
                Some(ua) => Ok(ua),
                None => Err(format!("no user agent template for {browser} on {os}")),
            }
        }
        _ => return Derived::Sample,
    };
    match composed {
        Ok(ua) => Derived::Value(Value::String(ua)),
        Err(reason) => Derived::Unavailable(reason),
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => a == b,
    }
}

fn derive_client_hints(r: &mut Resolution<'_>) -> Derived {
    match (r.str_value(keys::USER_AGENT), r.str_value(keys::PLATFORM)) {
        (Some(ua), Some(platform)) => Derived::Value(compose::client_hints(ua, platform)),
        _ => Derived::Sample,
    }
}

fn derive_font_list(r: &mut Resolution<'_>) -> Derived {
    let (Some(os), Some(mode)) = (r.str_value(keys::OS_NAME), r.str_value(keys::FONTS_MODE))
    else {
        return Derived::Sample;
    };
    let (os, mode) = (os.to_string(), mode.to_ascii_lowercase());
    match mode.as_str() {
        "real" => Derived::Value(Value::StringArray(Vec::new())),
        "custom" => {
            let names = font_names(r.catalog(), &os);
            if names.is_empty() {
                return Derived::Unavailable(format!("no fonts catalogued for {os}"));
            }
            let size = r.settings().font_subset_size;
            Derived::Value(Value::StringArray(r.sampler().subset(&names, size)))
        }
        _ => Derived::Sample,
    }
}
