use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use linkpulse_core::timerange::TimeRange;

use crate::error::AppError;
use crate::query::get_analytics;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    /// Preset range: 7d | 30d | 90d | 1y. Explicit start/end override it.
    pub period: Option<String>,
    /// Epoch milliseconds, inclusive start.
    pub start: Option<i64>,
    /// Epoch milliseconds, exclusive end.
    pub end: Option<i64>,
}

fn resolve_range(query: &AnalyticsQuery) -> Result<TimeRange, AppError> {
    if let (Some(start), Some(end)) = (query.start, query.end) {
        return TimeRange::from_millis(start, end).ok_or_else(|| {
            AppError::Validation("start/end must be valid epoch milliseconds with start <= end".to_string())
        });
    }
    let preset = query.period.as_deref().unwrap_or("30d");
    TimeRange::from_preset(preset, Utc::now()).ok_or_else(|| {
        AppError::Validation(format!(
            "unknown period: {preset} (expected one of 7d, 30d, 90d, 1y)"
        ))
    })
}

/// `GET /api/analytics/profile/{profile_id}` — the full report.
#[tracing::instrument(skip(state, query))]
pub async fn profile_analytics(
    State(state): State<SharedState>,
    Path(profile_id): Path<String>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = resolve_range(&query)?;
    let report = get_analytics(&state, &profile_id, range)
        .await
        .map_err(|e| AppError::Unavailable(format!("analytics query failed: {e}")))?;
    Ok(Json(report))
}

/// `GET /api/analytics/profile/{profile_id}/summary` — fixed 30-day report.
#[tracing::instrument(skip(state))]
pub async fn profile_summary(
    State(state): State<SharedState>,
    Path(profile_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let range = TimeRange::from_preset("30d", Utc::now())
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("30d preset must parse")))?;
    let report = get_analytics(&state, &profile_id, range)
        .await
        .map_err(|e| AppError::Unavailable(format!("analytics query failed: {e}")))?;
    Ok(Json(report))
}

/// `GET /api/analytics/profile/{profile_id}/realtime` — live tuple.
/// Never consults the report cache.
#[tracing::instrument(skip(state))]
pub async fn profile_realtime(
    State(state): State<SharedState>,
    Path(profile_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state
        .db
        .realtime_snapshot(&profile_id, Utc::now())
        .await
        .map_err(|e| AppError::Unavailable(format!("realtime query failed: {e}")))?;
    Ok(Json(snapshot))
}

/// `GET /api/analytics/links/{profile_id}` — period-scoped link slice.
#[tracing::instrument(skip(state, query))]
pub async fn profile_links(
    State(state): State<SharedState>,
    Path(profile_id): Path<String>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = resolve_range(&query)?;
    let report = get_analytics(&state, &profile_id, range)
        .await
        .map_err(|e| AppError::Unavailable(format!("analytics query failed: {e}")))?;
    Ok(Json(json!({
        "totalLinks": report.total_links,
        "averageClicksPerLink": report.average_clicks_per_link,
        "topLink": report.top_link,
        "linkPerformance": report.link_performance,
    })))
}

/// `GET /api/analytics/geo/{profile_id}` — period-scoped geographic slice.
#[tracing::instrument(skip(state, query))]
pub async fn profile_geo(
    State(state): State<SharedState>,
    Path(profile_id): Path<String>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = resolve_range(&query)?;
    let report = get_analytics(&state, &profile_id, range)
        .await
        .map_err(|e| AppError::Unavailable(format!("analytics query failed: {e}")))?;
    Ok(Json(json!({ "geographicData": report.geographic_data })))
}
