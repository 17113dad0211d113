//! Post-resolution consistency rules.
//!
//! Each rule pairs a predicate with a repair. [`ConsistencyValidator::check`]
//! lists violations; [`ConsistencyValidator::repair`] applies one repair pass
//! to a copy of the profile and re-checks it once. Repairs that would touch a
//! pinned key, or that cannot produce a value, become `Error` diagnostics.
use std::collections::{BTreeMap, BTreeSet};

use mimic_common::GeneratorSettings;
use tracing::{debug, warn};

use crate::catalog::{GpuEntry, TraitCatalog, TraitOption};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::filter::{conditioned, ContextFilter};
use crate::keys;
use crate::request::RequestContext;
use crate::resolver::compose;
use crate::resolver::{font_names, gpu_candidates};
use crate::sampler::WeightedSampler;
use crate::value::Value;

pub type TraitMap = BTreeMap<String, Value>;

type Changes = Vec<(&'static str, Value)>;

pub const DEVICE_MEMORY_BUCKETS: [f64; 8] = [0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0];
pub const MAX_HARDWARE_CONCURRENCY: i64 = 32;

/// Read-only inputs a rule may consult.
pub struct RuleEnv<'a> {
    pub catalog: &'a TraitCatalog,
    pub context: &'a RequestContext,
    pub settings: &'a GeneratorSettings,
    pub pinned: &'a BTreeSet<String>,
}

pub struct ConsistencyRule {
    pub name: &'static str,
    /// Key reported when the rule fails outright.
    pub key: &'static str,
    check: fn(&TraitMap, &RuleEnv<'_>) -> Option<String>,
    repair: fn(&TraitMap, &RuleEnv<'_>, &mut WeightedSampler) -> Result<Changes, String>,
}

pub static RULES: &[ConsistencyRule] = &[
    ConsistencyRule {
        name: "ua-browser-os",
        key: keys::USER_AGENT,
        check: check_ua_browser_os,
        repair: repair_ua_browser_os,
    },
    ConsistencyRule {
        name: "os-platform",
        key: keys::PLATFORM,
        check: check_os_platform,
        repair: repair_os_platform,
    },
    ConsistencyRule {
        name: "ua-platform",
        key: keys::PLATFORM,
        check: check_ua_platform,
        repair: repair_ua_platform,
    },
    ConsistencyRule {
        name: "browser-engine",
        key: keys::BROWSER_ENGINE,
        check: check_browser_engine,
        repair: repair_browser_engine,
    },
    ConsistencyRule {
        name: "webgl-gpu-pair",
        key: keys::WEBGL_RENDERER,
        check: check_webgl_pair,
        repair: repair_webgl_pair,
    },
    ConsistencyRule {
        name: "fonts-custom-nonempty",
        key: keys::FONTS_LIST,
        check: check_custom_fonts,
        repair: repair_custom_fonts,
    },
    ConsistencyRule {
        name: "languages-locale",
        key: keys::LANGUAGES,
        check: check_languages,
        repair: repair_languages,
    },
    ConsistencyRule {
        name: "locale-timezone",
        key: keys::TIMEZONE,
        check: check_locale_timezone,
        repair: repair_locale_timezone,
    },
    ConsistencyRule {
        name: "touch-points-desktop",
        key: keys::MAX_TOUCH_POINTS,
        check: check_touch_points,
        repair: repair_touch_points,
    },
    ConsistencyRule {
        name: "hardware-concurrency-range",
        key: keys::HARDWARE_CONCURRENCY,
        check: check_concurrency,
        repair: repair_concurrency,
    },
    ConsistencyRule {
        name: "device-memory-bucket",
        key: keys::DEVICE_MEMORY,
        check: check_memory,
        repair: repair_memory,
    },
    ConsistencyRule {
        name: "client-hints-ua",
        key: keys::CLIENT_HINTS,
        check: check_client_hints,
        repair: repair_client_hints,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub rule: &'static str,
    pub key: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Repaired {
    pub profile: TraitMap,
    pub diagnostics: Diagnostics,
}

pub struct ConsistencyValidator<'a> {
    env: RuleEnv<'a>,
}

impl<'a> ConsistencyValidator<'a> {
    pub fn new(env: RuleEnv<'a>) -> Self {
        Self { env }
    }

    pub fn check(&self, profile: &TraitMap) -> Vec<Finding> {
        RULES
            .iter()
            .filter_map(|rule| {
                (rule.check)(profile, &self.env).map(|message| Finding {
                    rule: rule.name,
                    key: rule.key,
                    message,
                })
            })
            .collect()
    }

    /// One repair pass in rule order, then a single re-check of every rule.
    ///
    /// Each rule is evaluated against the partially repaired profile, so a
    /// repair can both fix and expose later violations within the same pass.
    pub fn repair(&self, profile: &TraitMap, sampler: &mut WeightedSampler) -> Repaired {
        let mut next = profile.clone();
        let mut diagnostics = Diagnostics::default();
        let mut failed = BTreeSet::new();

        for rule in RULES {
            let Some(message) = (rule.check)(&next, &self.env) else {
                continue;
            };

            match (rule.repair)(&next, &self.env, sampler) {
                Ok(changes) => {
                    if let Some((key, _)) = changes.iter().find(|(k, _)| self.env.pinned.contains(*k)) {
                        diagnostics.push(Diagnostic::error(
                            *key,
                            format!("{}: {message}; repair would overwrite pinned key", rule.name),
                        ));
                        failed.insert(rule.name);
                        continue;
                    }
                    for (key, value) in changes {
                        let before = next.get(key).cloned().unwrap_or_default();
                        diagnostics.warn(
                            key,
                            format!("{}: {message}; repaired {before} -> {value}", rule.name),
                        );
                        debug!(rule = rule.name, key, "validator.rule.repaired");
                        next.insert(key.to_string(), value);
                    }
                }
                Err(reason) => {
                    diagnostics.push(Diagnostic::error(
                        rule.key,
                        format!("{}: {message}; {reason}", rule.name),
                    ));
                    failed.insert(rule.name);
                }
            }
        }

        for rule in RULES.iter().filter(|r| !failed.contains(r.name)) {
            if let Some(message) = (rule.check)(&next, &self.env) {
                warn!(rule = rule.name, "validator.rule.unresolved");
                diagnostics.push(Diagnostic::error(
                    rule.key,
                    format!("{}: still violated after repair: {message}", rule.name),
                ));
            }
        }

        Repaired {
            profile: next,
            diagnostics,
        }
    }
}

fn text<'p>(profile: &'p TraitMap, key: &str) -> Option<&'p str> {
    profile.get(key).and_then(Value::as_str)
}

/// Options for `key` that the context admits and whose `when` conditions hold in `p`.
fn eligible_options<'e>(key: &str, p: &TraitMap, env: &RuleEnv<'e>) -> Vec<&'e TraitOption> {
    conditioned(ContextFilter::new(env.context).apply(env.catalog.options(key)), p)
}

fn check_ua_browser_os(p: &TraitMap, _: &RuleEnv<'_>) -> Option<String> {
    let ua = text(p, keys::USER_AGENT)?;
    let mut conflicts = Vec::new();
    if let (Some(claimed), Some(os)) = (compose::ua_os_family(ua), text(p, keys::OS_NAME)) {
        if !claimed.eq_ignore_ascii_case(os) {
            conflicts.push(format!("user agent names {claimed} but OS is {os}"));
        }
    }
    if let (Some(claimed), Some(browser)) =
        (compose::ua_browser_family(ua), text(p, keys::BROWSER_NAME))
    {
        if !claimed.eq_ignore_ascii_case(browser) {
            conflicts.push(format!("user agent names {claimed} but browser is {browser}"));
        }
    }
    (!conflicts.is_empty()).then(|| conflicts.join("; "))
}

/// A pinned user agent moves OS and browser to what it names. Otherwise the
/// agent is recomposed, switching to a browser the OS supports if needed.
fn repair_ua_browser_os(
    p: &TraitMap,
    env: &RuleEnv<'_>,
    sampler: &mut WeightedSampler,
) -> Result<Changes, String> {
    let ua = text(p, keys::USER_AGENT).ok_or("no user agent")?;
    if env.pinned.contains(keys::USER_AGENT) {
        let mut changes = Vec::new();
        if let Some(claimed) = compose::ua_os_family(ua) {
            if text(p, keys::OS_NAME).is_some_and(|os| !os.eq_ignore_ascii_case(claimed)) {
                changes.push((keys::OS_NAME, Value::from(claimed)));
            }
        }
        if let Some(claimed) = compose::ua_browser_family(ua) {
            if text(p, keys::BROWSER_NAME).is_some_and(|b| !b.eq_ignore_ascii_case(claimed)) {
                changes.push((keys::BROWSER_NAME, Value::from(claimed)));
            }
        }
        return Ok(changes);
    }

    let os = text(p, keys::OS_NAME).ok_or("no OS")?;
    let browser = text(p, keys::BROWSER_NAME).ok_or("no browser")?;
    let version = text(p, keys::BROWSER_VERSION).ok_or("no browser version")?;
    let arch = text(p, keys::CPU_ARCH);
    if let Some(ua) = compose::user_agent(os, browser, version, arch) {
        return Ok(vec![(keys::USER_AGENT, Value::String(ua))]);
    }
    if env.pinned.contains(keys::BROWSER_NAME) {
        return Err(format!("no user agent template for {browser} on {os}"));
    }

    let browsers: Vec<&TraitOption> = eligible_options(keys::BROWSER_NAME, p, env)
        .into_iter()
        .filter(|option| {
            option
                .value
                .as_str()
                .is_some_and(|b| compose::user_agent(os, b, version, arch).is_some())
        })
        .collect();
    let replacement = sampler
        .pick(&browsers)
        .ok_or_else(|| format!("no catalogued browser has a user agent template for {os}"))?;
    let browser = replacement.value.as_str().ok_or("browser option is not a string")?;

    let mut changes = vec![(keys::BROWSER_NAME, replacement.value.clone())];
    let mut version = version.to_string();
    if !env.pinned.contains(keys::BROWSER_VERSION) {
        let mut next = p.clone();
        next.insert(keys::BROWSER_NAME.to_string(), replacement.value.clone());
        let versions = eligible_options(keys::BROWSER_VERSION, &next, env);
        if let Some(option) = sampler.pick(&versions) {
            if let Some(picked) = option.value.as_str() {
                version = picked.to_string();
                changes.push((keys::BROWSER_VERSION, option.value.clone()));
            }
        }
    }
    let ua = compose::user_agent(os, browser, &version, arch)
        .ok_or_else(|| format!("no user agent template for {browser} on {os}"))?;
    changes.push((keys::USER_AGENT, Value::String(ua)));
    Ok(changes)
}

fn check_ua_platform(p: &TraitMap, _: &RuleEnv<'_>) -> Option<String> {
    let family = compose::ua_os_family(text(p, keys::USER_AGENT)?)?;
    let expected = compose::platform_for_os(family)?;
    let actual = p.get(keys::PLATFORM)?;
    (actual.as_str() != Some(expected))
        .then(|| format!("{family} user agent requires platform {expected}, found {actual}"))
}

fn repair_ua_platform(p: &TraitMap, _: &RuleEnv<'_>, _: &mut WeightedSampler) -> Result<Changes, String> {
    let expected = text(p, keys::USER_AGENT)
        .and_then(compose::ua_os_family)
        .and_then(compose::platform_for_os)
        .ok_or("user agent names no known OS")?;
    Ok(vec![(keys::PLATFORM, Value::from(expected))])
}

fn check_os_platform(p: &TraitMap, _: &RuleEnv<'_>) -> Option<String> {
    let os = text(p, keys::OS_NAME)?;
    let expected = compose::platform_for_os(os)?;
    let actual = p.get(keys::PLATFORM)?;
    (actual.as_str() != Some(expected))
        .then(|| format!("{os} requires platform {expected}, found {actual}"))
}

fn repair_os_platform(p: &TraitMap, _: &RuleEnv<'_>, _: &mut WeightedSampler) -> Result<Changes, String> {
    let expected = text(p, keys::OS_NAME)
        .and_then(compose::platform_for_os)
        .ok_or("unknown OS")?;
    Ok(vec![(keys::PLATFORM, Value::from(expected))])
}

fn check_browser_engine(p: &TraitMap, _: &RuleEnv<'_>) -> Option<String> {
    let browser = text(p, keys::BROWSER_NAME)?;
    let expected = compose::engine_for_browser(browser)?;
    let actual = p.get(keys::BROWSER_ENGINE)?;
    (actual.as_str() != Some(expected))
        .then(|| format!("{browser} requires engine {expected}, found {actual}"))
}

fn repair_browser_engine(p: &TraitMap, _: &RuleEnv<'_>, _: &mut WeightedSampler) -> Result<Changes, String> {
    let expected = text(p, keys::BROWSER_NAME)
        .and_then(compose::engine_for_browser)
        .ok_or("unknown browser")?;
    Ok(vec![(keys::BROWSER_ENGINE, Value::from(expected))])
}

fn check_webgl_pair(p: &TraitMap, env: &RuleEnv<'_>) -> Option<String> {
    let os = text(p, keys::OS_NAME)?;
    let vendor = p.get(keys::WEBGL_VENDOR)?;
    let renderer = p.get(keys::WEBGL_RENDERER)?;
    let known = gpu_candidates(env.catalog, env.context, os).iter().any(|gpu| {
        vendor.as_str() == Some(gpu.webgl_vendor.as_str())
            && renderer.as_str() == Some(gpu.webgl_renderer.as_str())
    });
    (!known).then(|| format!("WebGL pair {vendor} / {renderer} is not catalogued for {os}"))
}

fn repair_webgl_pair(
    p: &TraitMap,
    env: &RuleEnv<'_>,
    sampler: &mut WeightedSampler,
) -> Result<Changes, String> {
    let os = text(p, keys::OS_NAME).ok_or("no OS")?;
    let candidates = gpu_candidates(env.catalog, env.context, os);
    if candidates.is_empty() {
        return Err(format!("GPU catalog has no entry for {os}"));
    }
    let vendor = text(p, keys::WEBGL_VENDOR).unwrap_or_default();
    let renderer = text(p, keys::WEBGL_RENDERER).unwrap_or_default();

    if env.pinned.contains(keys::WEBGL_RENDERER) {
        if let Some(gpu) = candidates.iter().find(|g| g.webgl_renderer == renderer) {
            return Ok(vec![(keys::WEBGL_VENDOR, Value::from(gpu.webgl_vendor.as_str()))]);
        }
    }

    let same_vendor: Vec<&GpuEntry> = candidates
        .iter()
        .copied()
        .filter(|g| g.webgl_vendor == vendor)
        .collect();
    if let Some(gpu) = sampler.pick(&same_vendor) {
        return Ok(vec![(keys::WEBGL_RENDERER, Value::from(gpu.webgl_renderer.as_str()))]);
    }
    if env.pinned.contains(keys::WEBGL_VENDOR) {
        return Err(format!("no renderer for pinned vendor {vendor} on {os}"));
    }

    let hardware: Vec<&GpuEntry> = match text(p, keys::GPU_VENDOR) {
        Some(family) => candidates
            .iter()
            .copied()
            .filter(|g| g.gpu_vendor.eq_ignore_ascii_case(family))
            .collect(),
        None => Vec::new(),
    };
    let pool = if hardware.is_empty() { &candidates } else { &hardware };
    let gpu = sampler
        .pick(pool)
        .ok_or_else(|| format!("GPU catalog has no entry for {os}"))?;
    Ok(vec![
        (keys::WEBGL_VENDOR, Value::from(gpu.webgl_vendor.as_str())),
        (keys::WEBGL_RENDERER, Value::from(gpu.webgl_renderer.as_str())),
    ])
}

fn check_custom_fonts(p: &TraitMap, _: &RuleEnv<'_>) -> Option<String> {
    let mode = text(p, keys::FONTS_MODE)?;
    let list = p.get(keys::FONTS_LIST)?;
    let populated = list.as_string_array().is_some_and(|fonts| !fonts.is_empty());
    (mode.eq_ignore_ascii_case("custom") && !populated)
        .then(|| "custom font mode requires a non-empty font list".to_string())
}

fn repair_custom_fonts(
    p: &TraitMap,
    env: &RuleEnv<'_>,
    sampler: &mut WeightedSampler,
) -> Result<Changes, String> {
    let os = text(p, keys::OS_NAME).ok_or("no OS to choose fonts for")?;
    let names = font_names(env.catalog, os);
    if names.is_empty() {
        return Err(format!("no fonts catalogued for {os}"));
    }
    let subset = sampler.subset(&names, env.settings.font_subset_size);
    Ok(vec![(keys::FONTS_LIST, Value::from(subset))])
}

fn check_languages(p: &TraitMap, _: &RuleEnv<'_>) -> Option<String> {
    let locale = text(p, keys::LOCALE)?;
    let languages = p.get(keys::LANGUAGES)?;
    let first = languages
        .as_string_array()
        .and_then(|items| items.first())
        .map(|tag| compose::primary_subtag(tag));
    let wanted = compose::primary_subtag(locale);
    (!first.is_some_and(|tag| tag.eq_ignore_ascii_case(wanted)))
        .then(|| format!("languages {languages} do not start with locale {locale}"))
}

fn repair_languages(p: &TraitMap, _: &RuleEnv<'_>, _: &mut WeightedSampler) -> Result<Changes, String> {
    let locale = text(p, keys::LOCALE).ok_or("no locale")?;
    Ok(vec![(
        keys::LANGUAGES,
        Value::from(compose::languages_for_locale(locale)),
    )])
}

/// Only judged when the catalog offers some timezone for the current locale.
fn check_locale_timezone(p: &TraitMap, env: &RuleEnv<'_>) -> Option<String> {
    let locale = text(p, keys::LOCALE)?;
    let timezone = p.get(keys::TIMEZONE)?;
    let allowed = eligible_options(keys::TIMEZONE, p, env);
    (!allowed.is_empty() && !allowed.iter().any(|option| option.value == *timezone))
        .then(|| format!("timezone {timezone} is not catalogued for locale {locale}"))
}

fn repair_locale_timezone(
    p: &TraitMap,
    env: &RuleEnv<'_>,
    sampler: &mut WeightedSampler,
) -> Result<Changes, String> {
    let allowed = eligible_options(keys::TIMEZONE, p, env);
    let option = sampler
        .pick(&allowed)
        .ok_or("no timezone is catalogued for the locale")?;
    Ok(vec![(keys::TIMEZONE, option.value.clone())])
}

fn check_touch_points(p: &TraitMap, _: &RuleEnv<'_>) -> Option<String> {
    let class = text(p, keys::DEVICE_CLASS)?;
    let points = p.get(keys::MAX_TOUCH_POINTS)?;
    (class.eq_ignore_ascii_case("desktop") && points.as_i64() != Some(0))
        .then(|| format!("desktop devices report 0 touch points, found {points}"))
}

fn repair_touch_points(_: &TraitMap, _: &RuleEnv<'_>, _: &mut WeightedSampler) -> Result<Changes, String> {
    Ok(vec![(keys::MAX_TOUCH_POINTS, Value::Int(0))])
}

fn check_concurrency(p: &TraitMap, _: &RuleEnv<'_>) -> Option<String> {
    let cores = p.get(keys::HARDWARE_CONCURRENCY)?.as_f64()?;
    (!(1.0..=MAX_HARDWARE_CONCURRENCY as f64).contains(&cores))
        .then(|| format!("hardware concurrency {cores} outside 1..={MAX_HARDWARE_CONCURRENCY}"))
}

fn repair_concurrency(p: &TraitMap, _: &RuleEnv<'_>, _: &mut WeightedSampler) -> Result<Changes, String> {
    let cores = p
        .get(keys::HARDWARE_CONCURRENCY)
        .and_then(Value::as_f64)
        .ok_or("hardware concurrency is not numeric")?;
    let clamped = (cores.round() as i64).clamp(1, MAX_HARDWARE_CONCURRENCY);
    Ok(vec![(keys::HARDWARE_CONCURRENCY, Value::Int(clamped))])
}

fn nearest_bucket(memory: f64) -> f64 {
    DEVICE_MEMORY_BUCKETS
        .iter()
        .copied()
        .min_by(|a, b| (a - memory).abs().total_cmp(&(b - memory).abs()))
        .unwrap_or(8.0)
}

fn check_memory(p: &TraitMap, _: &RuleEnv<'_>) -> Option<String> {
    let memory = p.get(keys::DEVICE_MEMORY)?.as_f64()?;
    (!DEVICE_MEMORY_BUCKETS.contains(&memory))
        .then(|| format!("device memory {memory} is not a reported bucket"))
}

fn repair_memory(p: &TraitMap, _: &RuleEnv<'_>, _: &mut WeightedSampler) -> Result<Changes, String> {
    let current = p.get(keys::DEVICE_MEMORY).ok_or("no device memory")?;
    let memory = current.as_f64().ok_or("device memory is not numeric")?;
    let bucket = nearest_bucket(memory);
    let value = match current {
        Value::Int(_) if bucket.fract() == 0.0 => Value::Int(bucket as i64),
        _ => Value::Double(bucket),
    };
    Ok(vec![(keys::DEVICE_MEMORY, value)])
}

fn check_client_hints(p: &TraitMap, _: &RuleEnv<'_>) -> Option<String> {
    let ua = text(p, keys::USER_AGENT)?;
    let platform = text(p, keys::PLATFORM)?;
    let hints = p.get(keys::CLIENT_HINTS)?;
    (*hints != compose::client_hints(ua, platform))
        .then(|| "client hints disagree with user agent and platform".to_string())
}

fn repair_client_hints(p: &TraitMap, _: &RuleEnv<'_>, _: &mut WeightedSampler) -> Result<Changes, String> {
    match (text(p, keys::USER_AGENT), text(p, keys::PLATFORM)) {
        (Some(ua), Some(platform)) => Ok(vec![(keys::CLIENT_HINTS, compose::client_hints(ua, platform))]),
        _ => Err("user agent or platform missing".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogDocument;
    use crate::diagnostics::Severity;
    use serde_json::json;

    fn gpu_catalog() -> TraitCatalog {
        let doc: CatalogDocument = serde_json::from_value(json!({
            "definitions": [],
            "gpus": [
                {
                    "gpuVendor": "NVIDIA",
                    "webglVendor": "Google Inc. (NVIDIA)",
                    "webglRenderer": "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
                    "os": ["Windows"]
                },
                {
                    "gpuVendor": "Intel",
                    "webglVendor": "Google Inc. (Intel)",
                    "webglRenderer": "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)",
                    "os": ["Windows"]
                }
            ],
            "fonts": [ { "name": "Arial", "os": ["Windows"] }, { "name": "Tahoma", "os": ["windows"] } ]
        }))
        .unwrap();
        TraitCatalog::from_document(doc).unwrap()
    }

    fn trait_catalog() -> TraitCatalog {
        let doc: CatalogDocument = serde_json::from_value(json!({
            "definitions": [
                { "key": "system.locale", "defaultValue": "en-US" },
                { "key": "system.timezone", "defaultValue": "America/New_York" },
                { "key": "browser.name", "defaultValue": "Chrome" },
                { "key": "browser.version", "defaultValue": "131.0.0.0" }
            ],
            "options": [
                { "key": "system.timezone", "value": "America/New_York", "when": { "system.locale": "en-US" } },
                { "key": "system.timezone", "value": "Asia/Shanghai", "when": { "system.locale": "zh-CN" } },
                { "key": "browser.name", "value": "Chrome", "when": { "system.os.name": "Windows" } },
                { "key": "browser.name", "value": "Safari", "when": { "system.os.name": "macOS" } },
                { "key": "browser.version", "value": "131.0.0.0", "when": { "browser.name": "Chrome" } },
                { "key": "browser.version", "value": "17.6", "when": { "browser.name": "Safari" } }
            ]
        }))
        .unwrap();
        TraitCatalog::from_document(doc).unwrap()
    }

    fn errors(repaired: &Repaired) -> Vec<&Diagnostic> {
        repaired
            .diagnostics
            .as_slice()
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect()
    }

    fn pins(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|k| k.to_string()).collect()
    }

    fn profile(entries: &[(&str, Value)]) -> TraitMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn run(catalog: &TraitCatalog, pinned: &BTreeSet<String>, p: &TraitMap) -> Repaired {
        run_in(&RequestContext::default(), catalog, pinned, p)
    }

    fn run_in(
        context: &RequestContext,
        catalog: &TraitCatalog,
        pinned: &BTreeSet<String>,
        p: &TraitMap,
    ) -> Repaired {
        let settings = GeneratorSettings::default();
        let validator = ConsistencyValidator::new(RuleEnv {
            catalog,
            context,
            settings: &settings,
            pinned,
        });
        validator.repair(p, &mut WeightedSampler::from_seed(0))
    }

    #[test]
    fn repairs_platform_without_touching_the_input() {
        let catalog = gpu_catalog();
        let input = profile(&[
            (keys::OS_NAME, Value::from("Windows")),
            (keys::PLATFORM, Value::from("MacIntel")),
        ]);
        let repaired = run(&catalog, &BTreeSet::new(), &input);
        assert_eq!(input[keys::PLATFORM], Value::from("MacIntel"));
        assert_eq!(repaired.profile[keys::PLATFORM], Value::from("Win32"));
        let diags = repaired.diagnostics.as_slice();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert!(diags[0].message.contains("MacIntel"));
    }

    #[test]
    fn repair_targeting_a_pinned_key_is_an_error() {
        let catalog = gpu_catalog();
        let pinned: BTreeSet<String> = [keys::PLATFORM.to_string()].into();
        let input = profile(&[
            (keys::OS_NAME, Value::from("Windows")),
            (keys::PLATFORM, Value::from("MacIntel")),
        ]);
        let repaired = run(&catalog, &pinned, &input);
        assert!(repaired.diagnostics.has_errors());
        assert_eq!(repaired.profile[keys::PLATFORM], Value::from("MacIntel"));
    }

    #[test]
    fn mismatched_renderer_is_resampled_for_the_vendor() {
        let catalog = gpu_catalog();
        let input = profile(&[
            (keys::OS_NAME, Value::from("Windows")),
            (keys::WEBGL_VENDOR, Value::from("Google Inc. (Intel)")),
            (keys::WEBGL_RENDERER, Value::from("Mali-G78")),
        ]);
        let repaired = run(&catalog, &BTreeSet::new(), &input);
        assert!(!repaired.diagnostics.has_errors());
        assert_eq!(
            repaired.profile[keys::WEBGL_RENDERER],
            Value::from("ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)")
        );
    }

    #[test]
    fn missing_gpu_coverage_is_unrepairable() {
        let catalog = gpu_catalog();
        let input = profile(&[
            (keys::OS_NAME, Value::from("iOS")),
            (keys::WEBGL_VENDOR, Value::from("Apple Inc.")),
            (keys::WEBGL_RENDERER, Value::from("Apple GPU")),
        ]);
        let repaired = run(&catalog, &BTreeSet::new(), &input);
        let errors: Vec<_> = repaired
            .diagnostics
            .as_slice()
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("webgl-gpu-pair"));
    }

    #[test]
    fn empty_custom_font_list_is_filled_for_the_os() {
        let catalog = gpu_catalog();
        let input = profile(&[
            (keys::OS_NAME, Value::from("Windows")),
            (keys::FONTS_MODE, Value::from("custom")),
            (keys::FONTS_LIST, Value::StringArray(Vec::new())),
        ]);
        let repaired = run(&catalog, &BTreeSet::new(), &input);
        let mut fonts = repaired.profile[keys::FONTS_LIST]
            .as_string_array()
            .unwrap()
            .to_vec();
        fonts.sort();
        assert_eq!(fonts, ["Arial", "Tahoma"]);
    }

    #[test]
    fn numeric_ranges_are_clamped_to_plausible_values() {
        let catalog = gpu_catalog();
        let input = profile(&[
            (keys::HARDWARE_CONCURRENCY, Value::Int(64)),
            (keys::DEVICE_MEMORY, Value::Double(6.0)),
            (keys::DEVICE_CLASS, Value::from("desktop")),
            (keys::MAX_TOUCH_POINTS, Value::Int(10)),
        ]);
        let repaired = run(&catalog, &BTreeSet::new(), &input);
        assert_eq!(repaired.profile[keys::HARDWARE_CONCURRENCY], Value::Int(32));
        assert_eq!(repaired.profile[keys::DEVICE_MEMORY], Value::Double(4.0));
        assert_eq!(repaired.profile[keys::MAX_TOUCH_POINTS], Value::Int(0));
    }

    #[test]
    fn client_hints_are_recomposed_after_platform_repair() {
        let catalog = gpu_catalog();
        let ua = compose::user_agent("Windows", "Chrome", "131.0.0.0", None).unwrap();
        let input = profile(&[
            (keys::OS_NAME, Value::from("Windows")),
            (keys::PLATFORM, Value::from("MacIntel")),
            (keys::USER_AGENT, Value::from(ua.as_str())),
            (keys::CLIENT_HINTS, compose::client_hints(&ua, "MacIntel")),
        ]);
        let repaired = run(&catalog, &BTreeSet::new(), &input);
        assert!(!repaired.diagnostics.has_errors());
        assert_eq!(
            repaired.profile[keys::CLIENT_HINTS],
            compose::client_hints(&ua, "Win32")
        );
    }

    #[test]
    fn consistent_profiles_produce_no_findings() {
        let catalog = gpu_catalog();
        let context = RequestContext::default();
        let settings = GeneratorSettings::default();
        let pinned = BTreeSet::new();
        let validator = ConsistencyValidator::new(RuleEnv {
            catalog: &catalog,
            context: &context,
            settings: &settings,
            pinned: &pinned,
        });
        let input = profile(&[
            (keys::OS_NAME, Value::from("Windows")),
            (keys::PLATFORM, Value::from("Win32")),
            (keys::LOCALE, Value::from("de-DE")),
            (keys::LANGUAGES, Value::from(compose::languages_for_locale("de-DE"))),
            (keys::DEVICE_MEMORY, Value::Int(8)),
        ]);
        assert!(validator.check(&input).is_empty());
    }

    #[test]
    fn stale_user_agent_is_recomposed_from_os_and_browser() {
        let catalog = trait_catalog();
        let chrome = compose::user_agent("Windows", "Chrome", "131.0.0.0", None).unwrap();
        let input = profile(&[
            (keys::OS_NAME, Value::from("macOS")),
            (keys::BROWSER_NAME, Value::from("Safari")),
            (keys::BROWSER_VERSION, Value::from("17.6")),
            (keys::USER_AGENT, Value::from(chrome.as_str())),
        ]);
        let repaired = run(&catalog, &BTreeSet::new(), &input);
        assert!(errors(&repaired).is_empty());
        assert_eq!(
            repaired.profile[keys::USER_AGENT],
            Value::from(compose::user_agent("macOS", "Safari", "17.6", None).unwrap().as_str())
        );
    }

    #[test]
    fn browser_without_a_template_for_the_os_is_swapped() {
        let catalog = trait_catalog();
        let chrome = compose::user_agent("Windows", "Chrome", "131.0.0.0", None).unwrap();
        let input = profile(&[
            (keys::OS_NAME, Value::from("Windows")),
            (keys::BROWSER_NAME, Value::from("Safari")),
            (keys::BROWSER_VERSION, Value::from("17.6")),
            (keys::USER_AGENT, Value::from("Mozilla/5.0 (Macintosh) Version/17.6 Safari/605.1.15")),
        ]);
        let repaired = run(&catalog, &BTreeSet::new(), &input);
        assert!(errors(&repaired).is_empty());
        assert_eq!(repaired.profile[keys::BROWSER_NAME], Value::from("Chrome"));
        assert_eq!(repaired.profile[keys::BROWSER_VERSION], Value::from("131.0.0.0"));
        assert_eq!(repaired.profile[keys::USER_AGENT], Value::from(chrome.as_str()));
    }

    #[test]
    fn pinned_os_and_browser_without_a_template_fail() {
        let catalog = trait_catalog();
        let chrome = compose::user_agent("Windows", "Chrome", "131.0.0.0", None).unwrap();
        let input = profile(&[
            (keys::OS_NAME, Value::from("Windows")),
            (keys::BROWSER_NAME, Value::from("Safari")),
            (keys::BROWSER_VERSION, Value::from("17.6")),
            (keys::USER_AGENT, Value::from(chrome.as_str())),
        ]);
        let repaired = run(&catalog, &pins(&[keys::OS_NAME, keys::BROWSER_NAME]), &input);
        let errors = errors(&repaired);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("ua-browser-os"));
    }

    #[test]
    fn pinned_user_agent_moves_os_and_platform() {
        let catalog = gpu_catalog();
        let iphone = compose::user_agent("iOS", "Safari", "18.1", None).unwrap();
        let input = profile(&[
            (keys::OS_NAME, Value::from("macOS")),
            (keys::PLATFORM, Value::from("MacIntel")),
            (keys::BROWSER_NAME, Value::from("Safari")),
            (keys::USER_AGENT, Value::from(iphone.as_str())),
        ]);
        let repaired = run(&catalog, &pins(&[keys::USER_AGENT]), &input);
        assert!(errors(&repaired).is_empty());
        assert_eq!(repaired.profile[keys::OS_NAME], Value::from("iOS"));
        assert_eq!(repaired.profile[keys::PLATFORM], Value::from("iPhone"));
        assert_eq!(repaired.profile[keys::USER_AGENT], Value::from(iphone.as_str()));
    }

    #[test]
    fn user_agent_against_a_pinned_platform_is_an_error() {
        let catalog = gpu_catalog();
        let iphone = compose::user_agent("iOS", "Safari", "18.1", None).unwrap();
        let input = profile(&[
            (keys::PLATFORM, Value::from("MacIntel")),
            (keys::USER_AGENT, Value::from(iphone.as_str())),
        ]);
        let repaired = run(&catalog, &pins(&[keys::USER_AGENT, keys::PLATFORM]), &input);
        let errors = errors(&repaired);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("ua-platform"));
    }

    #[test]
    fn timezone_outside_the_locale_is_resampled() {
        let catalog = trait_catalog();
        let input = profile(&[
            (keys::LOCALE, Value::from("zh-CN")),
            (keys::TIMEZONE, Value::from("America/New_York")),
        ]);
        let repaired = run(&catalog, &BTreeSet::new(), &input);
        assert!(errors(&repaired).is_empty());
        assert_eq!(repaired.profile[keys::TIMEZONE], Value::from("Asia/Shanghai"));

        let pinned = run(&catalog, &pins(&[keys::TIMEZONE]), &input);
        let errors = errors(&pinned);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("locale-timezone"));
    }

    #[test]
    fn uncatalogued_locales_leave_the_timezone_alone() {
        let catalog = trait_catalog();
        let input = profile(&[
            (keys::LOCALE, Value::from("fr-CA")),
            (keys::TIMEZONE, Value::from("America/Toronto")),
        ]);
        assert!(run(&catalog, &BTreeSet::new(), &input).diagnostics.as_slice().is_empty());
    }

    #[test]
    fn gpu_pair_excluded_by_the_context_is_a_violation() {
        let doc: CatalogDocument = serde_json::from_value(json!({
            "gpus": [
                {
                    "gpuVendor": "Apple",
                    "webglVendor": "Apple Inc.",
                    "webglRenderer": "Apple GPU",
                    "os": ["iOS"],
                    "deviceClass": "ipad"
                }
            ]
        }))
        .unwrap();
        let catalog = TraitCatalog::from_document(doc).unwrap();
        let input = profile(&[
            (keys::OS_NAME, Value::from("iOS")),
            (keys::WEBGL_VENDOR, Value::from("Apple Inc.")),
            (keys::WEBGL_RENDERER, Value::from("Apple GPU")),
        ]);

        let ipad = RequestContext {
            device_class: Some("ipad".into()),
            ..RequestContext::default()
        };
        assert!(run_in(&ipad, &catalog, &BTreeSet::new(), &input)
            .diagnostics
            .as_slice()
            .is_empty());

        let phone = RequestContext {
            device_class: Some("ios".into()),
            ..RequestContext::default()
        };
        let repaired = run_in(&phone, &catalog, &BTreeSet::new(), &input);
        let errors = errors(&repaired);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("webgl-gpu-pair"));
    }
}
