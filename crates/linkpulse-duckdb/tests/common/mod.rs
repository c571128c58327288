use chrono::{DateTime, Duration, Utc};

use linkpulse_core::event::{LinkClick, ProfileView};

/// A fixed reference instant well in the past so tests never straddle a UTC
/// midnight while running.
pub fn t0() -> DateTime<Utc> {
    Utc::now() - Duration::days(1)
}

pub fn sample_view(profile_id: &str, session_id: &str, at: DateTime<Utc>) -> ProfileView {
    ProfileView {
        id: uuid::Uuid::new_v4().to_string(),
        profile_id: profile_id.to_string(),
        session_id: Some(session_id.to_string()),
        visitor_ip: Some("203.0.113.9".to_string()),
        user_agent: Some("Mozilla/5.0 Chrome/120".to_string()),
        referrer: None,
        country: Some("PL".to_string()),
        region: Some("Mazovia".to_string()),
        city: Some("Warsaw".to_string()),
        device_type: Some("desktop".to_string()),
        browser: Some("Chrome".to_string()),
        os: Some("macOS".to_string()),
        created_at: at,
    }
}

pub fn sample_click(
    profile_id: &str,
    session_id: &str,
    link_index: i64,
    at: DateTime<Utc>,
) -> LinkClick {
    LinkClick {
        id: uuid::Uuid::new_v4().to_string(),
        profile_id: profile_id.to_string(),
        link_index,
        link_title: Some(format!("Link {link_index}")),
        link_url: Some(format!("https://example.com/{link_index}")),
        session_id: Some(session_id.to_string()),
        visitor_ip: Some("203.0.113.9".to_string()),
        user_agent: Some("Mozilla/5.0 Chrome/120".to_string()),
        referrer: None,
        country: Some("PL".to_string()),
        region: Some("Mazovia".to_string()),
        city: Some("Warsaw".to_string()),
        device_type: Some("desktop".to_string()),
        browser: Some("Chrome".to_string()),
        os: Some("macOS".to_string()),
        created_at: at,
    }
}
