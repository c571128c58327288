use serde::{Deserialize, Serialize};

/// The composed analytics report served by `GET /api/analytics/profile/:id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub profile_views: i64,
    pub unique_views: i64,
    pub total_clicks: i64,
    pub unique_clicks: i64,
    pub total_links: i64,
    pub average_clicks_per_link: f64,
    pub top_link: Option<TopLink>,
    pub time_series_data: Vec<TimeSeriesPoint>,
    pub geographic_data: Vec<GeoEntry>,
    pub device_data: Vec<DeviceEntry>,
    pub referrer_data: Vec<ReferrerEntry>,
    pub link_performance: Vec<LinkPerformance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    /// Bucket label, formatted per the report period (see `timerange`).
    pub date: String,
    pub views: i64,
    pub clicks: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoEntry {
    pub country: String,
    pub region: Option<String>,
    pub city: String,
    pub views: i64,
    pub clicks: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEntry {
    pub device_type: String,
    pub browser: String,
    pub os: String,
    pub views: i64,
    pub clicks: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerEntry {
    /// Hostname when the stored referrer parses as a URL, `"direct"` for
    /// empty referrers, the raw string otherwise.
    pub referrer: String,
    pub referrer_type: String,
    pub views: i64,
    pub clicks: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPerformance {
    pub link_index: i64,
    pub link_title: String,
    pub link_url: String,
    pub clicks: i64,
    pub unique_clicks: i64,
    /// Percentage of range views that clicked this link; 0 when no views.
    pub ctr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopLink {
    pub link_index: i64,
    pub title: String,
    pub url: String,
    pub clicks: i64,
}

/// The live tuple pushed to dashboards and served by the realtime endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeSnapshot {
    pub active_users: i64,
    pub recent_views: i64,
    pub recent_clicks: i64,
}
