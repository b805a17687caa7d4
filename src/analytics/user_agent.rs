//! User-agent classification
//!
//! Produces the device, OS and browser strings stored with every visit.
//! When a uap-core `regexes.yaml` is configured the `user-agent-parser`
//! crate does the work; otherwise a small keyword classifier covers the
//! common agents. Neither path fails: anything unrecognized is "Unknown".

use anyhow::{Context, Result};
use std::borrow::Cow;
use user_agent_parser::UserAgentParser;

use crate::analytics::models::UNKNOWN;

/// Device families that always count as mobile
const MOBILE_DEVICE_FAMILIES: [&str; 3] = ["iPhone", "iPad", "Android"];

/// Case-sensitive user-agent fragments that mark a mobile agent
const MOBILE_UA_MARKERS: [&str; 7] = [
    "Mobile",
    "iPhone",
    "iPod",
    "iPad",
    "Android",
    "BlackBerry",
    "IEMobile",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInfo {
    pub device: String,
    pub os: String,
    pub browser: String,
    pub is_mobile: bool,
}

impl AgentInfo {
    fn unknown() -> Self {
        Self {
            device: UNKNOWN.to_string(),
            os: UNKNOWN.to_string(),
            browser: UNKNOWN.to_string(),
            is_mobile: false,
        }
    }
}

#[derive(Default)]
pub struct UserAgentClassifier {
    parser: Option<UserAgentParser>,
}

impl UserAgentClassifier {
    /// Keyword-only classifier
    pub fn new() -> Self {
        Self { parser: None }
    }

    /// Classifier backed by a uap-core regexes file, when a path is given
    pub fn from_regexes(path: Option<&str>) -> Result<Self> {
        let parser = match path {
            Some(path) => Some(
                UserAgentParser::from_path(path)
                    .map_err(|e| anyhow::anyhow!("{e:?}"))
                    .with_context(|| format!("Failed to load user-agent regexes from {path}"))?,
            ),
            None => None,
        };

        Ok(Self { parser })
    }

    pub fn classify(&self, user_agent: Option<&str>) -> AgentInfo {
        let Some(user_agent) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) else {
            return AgentInfo::unknown();
        };

        let (device, os, browser) = match &self.parser {
            Some(parser) => classify_with_parser(parser, user_agent),
            None => classify_with_keywords(user_agent),
        };

        let is_mobile = is_mobile_agent(&device, user_agent);

        AgentInfo {
            device,
            os,
            browser,
            is_mobile,
        }
    }
}

/// Either the device family is a known mobile family or the raw agent carries
/// a mobile marker
pub fn is_mobile_agent(device: &str, user_agent: &str) -> bool {
    MOBILE_DEVICE_FAMILIES.contains(&device)
        || MOBILE_UA_MARKERS
            .iter()
            .any(|marker| user_agent.contains(marker))
}

fn classify_with_parser(parser: &UserAgentParser, user_agent: &str) -> (String, String, String) {
    let device = parser.parse_device(user_agent);
    let os = parser.parse_os(user_agent);
    let product = parser.parse_product(user_agent);

    let device = known_name(device.name.as_ref())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN.to_string());

    let os = known_name(os.name.as_ref())
        .map(|name| {
            with_version(
                name,
                &[os.major.as_ref(), os.minor.as_ref(), os.patch.as_ref()],
            )
        })
        .unwrap_or_else(|| UNKNOWN.to_string());

    let browser = known_name(product.name.as_ref())
        .map(|name| {
            with_version(
                name,
                &[
                    product.major.as_ref(),
                    product.minor.as_ref(),
                    product.patch.as_ref(),
                ],
            )
        })
        .unwrap_or_else(|| UNKNOWN.to_string());

    (device, os, browser)
}

/// uap-core reports "Other" for anything it cannot place
fn known_name<'a>(name: Option<&'a Cow<'_, str>>) -> Option<&'a str> {
    name.map(|n| &**n)
        .filter(|n| !n.is_empty() && *n != "Other")
}

fn with_version(name: &str, parts: &[Option<&Cow<'_, str>>]) -> String {
    let version: Vec<&str> = parts
        .iter()
        .map_while(|part| part.map(|p| &**p))
        .filter(|p| !p.is_empty())
        .collect();

    if version.is_empty() {
        name.to_string()
    } else {
        format!("{} {}", name, version.join("."))
    }
}

fn classify_with_keywords(user_agent: &str) -> (String, String, String) {
    (
        keyword_device(user_agent).to_string(),
        keyword_os(user_agent),
        keyword_browser(user_agent),
    )
}

fn keyword_device(ua: &str) -> &'static str {
    if ua.contains("iPhone") {
        "iPhone"
    } else if ua.contains("iPad") {
        "iPad"
    } else if ua.contains("iPod") {
        "iPod"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("BlackBerry") {
        "BlackBerry"
    } else if ua.contains("Windows Phone") {
        "Windows Phone"
    } else {
        UNKNOWN
    }
}

fn keyword_os(ua: &str) -> String {
    if let Some(version) = token_after(ua, "Android ") {
        return format!("Android {version}");
    }
    if ua.contains("Android") {
        return "Android".to_string();
    }
    if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
        return match token_after(ua, "OS ") {
            Some(version) => format!("iOS {}", version.replace('_', ".")),
            None => "iOS".to_string(),
        };
    }
    if ua.contains("Windows Phone") {
        return "Windows Phone".to_string();
    }
    if let Some(version) = token_after(ua, "Windows NT ") {
        return format!("Windows {}", windows_release(version));
    }
    if let Some(version) = token_after(ua, "Mac OS X ") {
        return format!("Mac OS X {}", version.replace('_', "."));
    }
    if ua.contains("CrOS") {
        return "Chrome OS".to_string();
    }
    if ua.contains("Linux") {
        return "Linux".to_string();
    }
    UNKNOWN.to_string()
}

fn windows_release(nt_version: &str) -> &str {
    match nt_version {
        "10.0" => "10",
        "6.3" => "8.1",
        "6.2" => "8",
        "6.1" => "7",
        other => other,
    }
}

fn keyword_browser(ua: &str) -> String {
    // Order matters: Edge and Opera also advertise Chrome, Chrome advertises Safari
    let candidates: [(&str, &str); 7] = [
        ("Edg/", "Edge"),
        ("OPR/", "Opera"),
        ("SamsungBrowser/", "Samsung Internet"),
        ("Firefox/", "Firefox"),
        ("CriOS/", "Chrome Mobile iOS"),
        ("Chrome/", "Chrome"),
        ("Version/", "Safari"),
    ];

    for (marker, name) in candidates {
        if let Some(version) = token_after(ua, marker) {
            if name == "Safari" && !ua.contains("Safari/") {
                continue;
            }
            let name = match name {
                "Chrome" if ua.contains("Mobile") => "Chrome Mobile",
                "Safari" if ua.contains("Mobile") => "Mobile Safari",
                other => other,
            };
            return format!("{name} {version}");
        }
    }

    if ua.contains("MSIE ") || ua.contains("Trident/") {
        return "IE".to_string();
    }

    UNKNOWN.to_string()
}

/// Version-like token following `marker`, e.g. `token_after(ua, "Firefox/")`
fn token_after<'a>(ua: &'a str, marker: &str) -> Option<&'a str> {
    let start = ua.find(marker)? + marker.len();
    let token: &str = ua[start..]
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '.' || c == '_'))
        .next()?;

    if token.starts_with(|c: char| c.is_ascii_digit()) {
        Some(token)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_SAFARI: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const ANDROID_CHROME: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.43 Mobile Safari/537.36";
    const MAC_CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const WINDOWS_FIREFOX: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const WINDOWS_EDGE: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.61";

    #[test]
    fn test_unknown_agent_yields_unknown_fields() {
        let classifier = UserAgentClassifier::new();
        for ua in [Some("totally-not-a-browser"), Some(""), None] {
            let info = classifier.classify(ua);
            assert_eq!(info.device, UNKNOWN);
            assert_eq!(info.os, UNKNOWN);
            assert_eq!(info.browser, UNKNOWN);
            assert!(!info.is_mobile);
        }
    }

    #[test]
    fn test_iphone_safari() {
        let info = UserAgentClassifier::new().classify(Some(IPHONE_SAFARI));
        assert_eq!(info.device, "iPhone");
        assert_eq!(info.os, "iOS 17.1");
        assert_eq!(info.browser, "Mobile Safari 17.1");
        assert!(info.is_mobile);
    }

    #[test]
    fn test_android_chrome() {
        let info = UserAgentClassifier::new().classify(Some(ANDROID_CHROME));
        assert_eq!(info.device, "Android");
        assert_eq!(info.os, "Android 14");
        assert_eq!(info.browser, "Chrome Mobile 120.0.6099.43");
        assert!(info.is_mobile);
    }

    #[test]
    fn test_desktop_agents() {
        let classifier = UserAgentClassifier::new();

        let mac = classifier.classify(Some(MAC_CHROME));
        assert_eq!(mac.device, UNKNOWN);
        assert_eq!(mac.os, "Mac OS X 10.15.7");
        assert_eq!(mac.browser, "Chrome 120.0.0.0");
        assert!(!mac.is_mobile);

        let firefox = classifier.classify(Some(WINDOWS_FIREFOX));
        assert_eq!(firefox.os, "Windows 10");
        assert_eq!(firefox.browser, "Firefox 121.0");

        let edge = classifier.classify(Some(WINDOWS_EDGE));
        assert_eq!(edge.browser, "Edge 120.0.2210.61");
    }

    #[test]
    fn test_mobile_detection_is_either_heuristic() {
        // Device family alone
        assert!(is_mobile_agent("iPad", "SomeAgent/1.0"));
        // Marker alone
        assert!(is_mobile_agent(UNKNOWN, "Opera/9.80 (BlackBerry; Opera Mini)"));
        // Markers are case-sensitive
        assert!(!is_mobile_agent(UNKNOWN, "mobile android lowercase"));
    }

    #[test]
    fn test_missing_regexes_file_is_an_error() {
        assert!(UserAgentClassifier::from_regexes(Some("/nonexistent/regexes.yaml")).is_err());
        assert!(UserAgentClassifier::from_regexes(None).is_ok());
    }
}
