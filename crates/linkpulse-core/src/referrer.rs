/// Traffic-source class of a referrer string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferrerType {
    Search,
    Social,
    Direct,
    Other,
}

impl ReferrerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferrerType::Search => "search",
            ReferrerType::Social => "social",
            ReferrerType::Direct => "direct",
            ReferrerType::Other => "other",
        }
    }
}

const SEARCH_ENGINES: &[&str] = &["google", "bing", "yahoo"];
const SOCIAL_NETWORKS: &[&str] = &["facebook", "twitter", "instagram", "linkedin"];

/// Classify a raw referrer string. The rollups store the raw string and this
/// class; the report layer presents the hostname.
pub fn classify_referrer(referrer: &str) -> ReferrerType {
    let r = referrer.trim().to_lowercase();
    if r.is_empty() || r == "direct" {
        return ReferrerType::Direct;
    }
    if SEARCH_ENGINES.iter().any(|s| r.contains(s)) {
        return ReferrerType::Search;
    }
    if SOCIAL_NETWORKS.iter().any(|s| r.contains(s)) {
        return ReferrerType::Social;
    }
    ReferrerType::Other
}

/// Extract the hostname from a referrer URL.
///
/// Returns `None` if the string is empty or has no host part.
pub fn referrer_hostname(referrer: &str) -> Option<String> {
    if referrer.is_empty() {
        return None;
    }
    let stripped = referrer
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = stripped.split('/').next()?.split('?').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

/// The label shown for a referrer in reports: hostname when parseable,
/// `"direct"` for empty strings, the raw value otherwise.
pub fn display_referrer(referrer: &str) -> String {
    if referrer.is_empty() {
        return "direct".to_string();
    }
    referrer_hostname(referrer).unwrap_or_else(|| referrer.to_string())
}
