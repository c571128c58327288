use serde::{Deserialize, Serialize};

/// Geographic attributes derived from a visitor IP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// Device attributes derived from a User-Agent string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
}

/// Parse a User-Agent string via `woothee`.
///
/// Never fails: a missing or unclassifiable UA yields all-empty fields.
/// woothee categories map to our device-type convention:
///   "smartphone" / "mobilephone" -> "mobile"
///   "tablet"                     -> "tablet"
///   everything else              -> "desktop"
pub fn device_of(user_agent: Option<&str>) -> DeviceInfo {
    let ua = match user_agent {
        Some(ua) if !ua.is_empty() => ua,
        _ => return DeviceInfo::default(),
    };

    let Some(result) = woothee::parser::Parser::new().parse(ua) else {
        // Unparseable but present: the visitor still loaded a page, so
        // classify conservatively as desktop with no browser/os detail.
        return DeviceInfo {
            device_type: Some("desktop".to_string()),
            browser: None,
            os: None,
        };
    };

    let device_type = match result.category {
        "smartphone" | "mobilephone" => "mobile",
        "tablet" => "tablet",
        _ => "desktop",
    };

    // woothee reports "UNKNOWN" / empty for fields it cannot determine.
    let browser = non_unknown(result.name);
    let os = non_unknown(result.os);

    DeviceInfo {
        device_type: Some(device_type.to_string()),
        browser,
        os,
    }
}

fn non_unknown(value: &str) -> Option<String> {
    if value.is_empty() || value == "UNKNOWN" {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_DESKTOP: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";

    #[test]
    fn desktop_browser_is_classified() {
        let d = device_of(Some(CHROME_DESKTOP));
        assert_eq!(d.device_type.as_deref(), Some("desktop"));
        assert_eq!(d.browser.as_deref(), Some("Chrome"));
        assert!(d.os.is_some());
    }

    #[test]
    fn phone_and_tablet_are_classified() {
        assert_eq!(
            device_of(Some(IPHONE)).device_type.as_deref(),
            Some("mobile")
        );
        assert_eq!(device_of(Some(IPAD)).device_type.as_deref(), Some("tablet"));
    }

    #[test]
    fn missing_input_yields_empty_fields() {
        assert_eq!(device_of(None), DeviceInfo::default());
        assert_eq!(device_of(Some("")), DeviceInfo::default());
    }

    #[test]
    fn gibberish_defaults_to_desktop_without_detail() {
        let d = device_of(Some("definitely-not-a-browser"));
        assert_eq!(d.device_type.as_deref(), Some("desktop"));
        assert_eq!(d.browser, None);
    }

    #[test]
    fn enrichment_is_idempotent() {
        // Deterministic: repeated parsing of the same input is identical.
        assert_eq!(device_of(Some(CHROME_DESKTOP)), device_of(Some(CHROME_DESKTOP)));
        assert_eq!(device_of(Some(IPHONE)), device_of(Some(IPHONE)));
    }
}
