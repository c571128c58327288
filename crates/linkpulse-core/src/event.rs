use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The payload a microsite sends to `POST /api/track/view`.
///
/// `visitorIp` and `userAgent` are normally taken from the request headers;
/// the body fields override them when present (batch senders use this).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrackViewRequest {
    pub profile_id: String,
    pub session_id: Option<String>,
    pub referrer: Option<String>,
    /// Event time as epoch milliseconds; defaults to the server clock.
    pub timestamp: Option<i64>,
    pub visitor_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// The payload for `POST /api/track/click`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrackClickRequest {
    pub profile_id: String,
    /// Zero-based position of the clicked link on the profile page.
    pub link_index: i64,
    pub link_title: Option<String>,
    pub link_url: Option<String>,
    pub session_id: Option<String>,
    pub referrer: Option<String>,
    pub timestamp: Option<i64>,
    pub visitor_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchViewsRequest {
    pub views: Vec<TrackViewRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EndSessionRequest {
    pub session_id: String,
}

/// An enriched profile-view row, mirroring the `profile_views` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: String,
    pub profile_id: String,
    pub session_id: Option<String>,
    pub visitor_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An enriched link-click row, mirroring the `link_clicks` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkClick {
    pub id: String,
    pub profile_id: String,
    pub link_index: i64,
    pub link_title: Option<String>,
    pub link_url: Option<String>,
    pub session_id: Option<String>,
    pub visitor_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A visitor session, mirroring the `sessions` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub profile_id: String,
    pub visitor_ip: Option<String>,
    pub user_agent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub page_views: i64,
    pub link_clicks: i64,
}

/// A durable notification-bus row, mirroring the `realtime_events` table.
/// Written inside the ingest transaction; marked processed after the
/// in-process fan-out.
#[derive(Debug, Clone)]
pub struct RealtimeEventRow {
    pub id: String,
    pub profile_id: String,
    pub kind: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}
