//! Pure string derivations shared by the resolver and the validator.
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::value::Value;

const MAX_LANGUAGES: usize = 6;

/// `navigator.platform` for an OS family.
pub fn platform_for_os(os: &str) -> Option<&'static str> {
    match os.to_ascii_lowercase().as_str() {
        "windows" => Some("Win32"),
        "macos" => Some("MacIntel"),
        "linux" => Some("Linux x86_64"),
        "android" => Some("Linux armv8l"),
        "ios" => Some("iPhone"),
        _ => None,
    }
}

pub fn engine_for_browser(browser: &str) -> Option<&'static str> {
    match browser.to_ascii_lowercase().as_str() {
        "chrome" | "edge" | "opera" | "brave" => Some("Blink"),
        "firefox" => Some("Gecko"),
        "safari" => Some("WebKit"),
        _ => None,
    }
}

/// `[locale, primary]`, then English fallbacks when the locale is not English.
pub fn languages_for_locale(locale: &str) -> Vec<String> {
    let primary = locale.split(['-', '_']).next().unwrap_or(locale);
    let mut languages = vec![locale.to_string()];
    if !primary.is_empty() && primary != locale {
        languages.push(primary.to_string());
    }
    if !primary.eq_ignore_ascii_case("en") {
        languages.extend(["en-US".to_string(), "en".to_string()]);
    }
    languages.dedup();
    languages.truncate(MAX_LANGUAGES);
    languages
}

pub fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

fn linux_arch(arch: Option<&str>) -> &'static str {
    match arch.map(str::to_ascii_lowercase).as_deref() {
        Some("arm64" | "aarch64") => "aarch64",
        _ => "x86_64",
    }
}

fn chromium_token(os: &str, arch: Option<&str>) -> Option<String> {
    Some(match os {
        "windows" => "Windows NT 10.0; Win64; x64".to_string(),
        "macos" => "Macintosh; Intel Mac OS X 10_15_7".to_string(),
        "linux" => format!("X11; Linux {}", linux_arch(arch)),
        "android" => "Linux; Android 10; K".to_string(),
        _ => return None,
    })
}

/// Compose a user agent string, or `None` for an unsupported OS/browser pair.
pub fn user_agent(os: &str, browser: &str, version: &str, arch: Option<&str>) -> Option<String> {
    let os = os.to_ascii_lowercase();
    let mobile = if os == "android" { "Mobile " } else { "" };
    match browser.to_ascii_lowercase().as_str() {
        "chrome" => {
            let token = chromium_token(&os, arch)?;
            Some(format!(
                "Mozilla/5.0 ({token}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} {mobile}Safari/537.36"
            ))
        }
        "edge" => {
            let token = chromium_token(&os, arch)?;
            Some(format!(
                "Mozilla/5.0 ({token}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} {mobile}Safari/537.36 Edg/{version}"
            ))
        }
        "firefox" => {
            let token = match os.as_str() {
                "windows" => "Windows NT 10.0; Win64; x64".to_string(),
                "macos" => "Macintosh; Intel Mac OS X 10.15".to_string(),
                "linux" => format!("X11; Linux {}", linux_arch(arch)),
                "android" => {
                    return Some(format!(
                        "Mozilla/5.0 (Android 14; Mobile; rv:{version}) Gecko/{version} Firefox/{version}"
                    ))
                }
                _ => return None,
            };
            Some(format!(
                "Mozilla/5.0 ({token}; rv:{version}) Gecko/20100101 Firefox/{version}"
            ))
        }
        "safari" => match os.as_str() {
            "macos" => Some(format!(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{version} Safari/605.1.15"
            )),
            "ios" => Some(format!(
                "Mozilla/5.0 (iPhone; CPU iPhone OS {} like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{version} Mobile/15E148 Safari/604.1",
                version.replace('.', "_")
            )),
            _ => None,
        },
        _ => None,
    }
}

/// OS family named by a user agent's platform token.
///
/// iPad user agents are left unclassified since their `navigator.platform`
/// varies between `iPad` and `MacIntel`.
pub fn ua_os_family(user_agent: &str) -> Option<&'static str> {
    if user_agent.contains("iPhone") {
        Some("iOS")
    } else if user_agent.contains("iPad") {
        None
    } else if user_agent.contains("Android") {
        Some("Android")
    } else if user_agent.contains("Windows") {
        Some("Windows")
    } else if user_agent.contains("Macintosh") {
        Some("macOS")
    } else if user_agent.contains("Linux") || user_agent.contains("X11") {
        Some("Linux")
    } else {
        None
    }
}

/// Browser family of a user agent. Chromium forks are checked before Chrome,
/// and Chrome before Safari, since their tokens nest.
pub fn ua_browser_family(user_agent: &str) -> Option<&'static str> {
    if user_agent.contains("Edg/") || user_agent.contains("EdgA/") || user_agent.contains("EdgiOS/") {
        Some("Edge")
    } else if user_agent.contains("OPR/") {
        Some("Opera")
    } else if user_agent.contains("Firefox/") || user_agent.contains("FxiOS/") {
        Some("Firefox")
    } else if user_agent.contains("Chrome/") || user_agent.contains("CriOS/") {
        Some("Chrome")
    } else if user_agent.contains("Safari/") && user_agent.contains("Version/") {
        Some("Safari")
    } else {
        None
    }
}

fn chromium_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(Edg|Chrome)/(\d+)").ok())
        .as_ref()
}

/// Brand and major version of a Chromium user agent; Edge wins over Chrome.
pub fn chromium_brand(user_agent: &str) -> Option<(&'static str, String)> {
    let mut found = None;
    for caps in chromium_regex()?.captures_iter(user_agent) {
        let major = caps[2].to_string();
        match &caps[1] {
            "Edg" => return Some(("Microsoft Edge", major)),
            _ => found = found.or(Some(("Google Chrome", major))),
        }
    }
    found
}

fn platform_hint(platform: &str) -> &'static str {
    let lower = platform.to_ascii_lowercase();
    if lower == "win32" {
        "Windows"
    } else if lower == "macintel" {
        "macOS"
    } else if lower.starts_with("iphone") || lower.starts_with("ipad") {
        "iOS"
    } else if lower.contains("arm") || lower.contains("android") {
        "Android"
    } else if lower.contains("linux") {
        "Linux"
    } else {
        "Unknown"
    }
}

/// `Sec-CH-UA*` headers implied by a user agent; empty for non-Chromium browsers.
pub fn client_hints(user_agent: &str, platform: &str) -> Value {
    let mut headers = BTreeMap::new();
    if let Some((brand, major)) = chromium_brand(user_agent) {
        headers.insert(
            "sec-ch-ua".to_string(),
            Value::String(format!(
                "\"{brand}\";v=\"{major}\", \"Chromium\";v=\"{major}\", \"Not_A Brand\";v=\"24\""
            )),
        );
        let mobile = if user_agent.contains("Mobile") { "?1" } else { "?0" };
        headers.insert("sec-ch-ua-mobile".to_string(), Value::from(mobile));
        headers.insert(
            "sec-ch-ua-platform".to_string(),
            Value::String(format!("\"{}\"", platform_hint(platform))),
        );
    }
    Value::Object(headers)
}
