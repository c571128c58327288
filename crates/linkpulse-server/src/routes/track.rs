use std::future::Future;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde_json::json;
use tracing::warn;

use linkpulse_core::event::{
    BatchViewsRequest, EndSessionRequest, LinkClick, ProfileView, RealtimeEventRow,
    TrackClickRequest, TrackViewRequest,
};
use linkpulse_core::session::generate_session_id;

use crate::error::AppError;
use crate::realtime::publish_ingest_event;
use crate::state::{AppState, SharedState};

const MAX_BATCH: usize = 100;
const WRITE_ATTEMPTS: u32 = 3;

/// `POST /api/track/view` — record one profile view.
#[tracing::instrument(skip(state, headers, req))]
pub async fn track_view(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<TrackViewRequest>,
) -> Result<impl IntoResponse, AppError> {
    enforce_rate_limit(&state, &headers).await?;
    if req.profile_id.trim().is_empty() {
        return Err(AppError::Validation(
            "profileId must be non-empty".to_string(),
        ));
    }
    check_profile(&state, &req.profile_id).await?;

    let (view, bus) = build_view(&state, req, &headers)?;
    write_with_retry(|| state.db.insert_view(&view, Some(&bus)), "view").await?;

    // Dispatch strictly after the store write committed.
    let data = json!({
        "viewId": view.id,
        "sessionId": view.session_id,
        "country": view.country,
        "deviceType": view.device_type,
        "referrer": view.referrer,
    });
    publish_ingest_event(&state, "view", &view.profile_id, data, &bus.id).await;

    Ok(Json(json!({
        "success": true,
        "data": { "viewId": view.id, "sessionId": view.session_id }
    })))
}

/// `POST /api/track/click` — record one link click.
#[tracing::instrument(skip(state, headers, req))]
pub async fn track_click(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<TrackClickRequest>,
) -> Result<impl IntoResponse, AppError> {
    enforce_rate_limit(&state, &headers).await?;
    if req.profile_id.trim().is_empty() {
        return Err(AppError::Validation(
            "profileId must be non-empty".to_string(),
        ));
    }
    if req.link_index < 0 {
        return Err(AppError::Validation(
            "linkIndex must be zero or positive".to_string(),
        ));
    }
    check_profile(&state, &req.profile_id).await?;

    let session_id = resolve_session_id(req.session_id.clone());
    let created_at = resolve_timestamp(req.timestamp)?;
    let visitor_ip = req.visitor_ip.clone().or_else(|| client_ip(&headers));
    let user_agent = req.user_agent.clone().or_else(|| header_user_agent(&headers));
    let (geo, device) = state
        .enricher
        .enrich(visitor_ip.as_deref(), user_agent.as_deref());

    let click = LinkClick {
        id: uuid::Uuid::new_v4().to_string(),
        profile_id: req.profile_id,
        link_index: req.link_index,
        link_title: req.link_title,
        link_url: req.link_url,
        session_id: Some(session_id.clone()),
        visitor_ip,
        user_agent,
        referrer: req.referrer,
        country: geo.country,
        region: geo.region,
        city: geo.city,
        device_type: device.device_type,
        browser: device.browser,
        os: device.os,
        created_at,
    };
    let data = json!({
        "clickId": click.id,
        "sessionId": session_id,
        "linkIndex": click.link_index,
        "linkTitle": click.link_title,
    });
    let bus = bus_row(&click.profile_id, "click", &data, created_at);

    write_with_retry(|| state.db.insert_click(&click, Some(&bus)), "click").await?;
    publish_ingest_event(&state, "click", &click.profile_id, data, &bus.id).await;

    Ok(Json(json!({
        "success": true,
        "data": { "clickId": click.id, "sessionId": session_id }
    })))
}

/// `POST /api/track/batch/views` — record a batch of views in one store
/// transaction. Session and daily counters are still maintained per event.
#[tracing::instrument(skip(state, headers, req))]
pub async fn track_batch_views(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<BatchViewsRequest>,
) -> Result<impl IntoResponse, AppError> {
    enforce_rate_limit(&state, &headers).await?;
    if req.views.is_empty() {
        return Err(AppError::Validation("views must be non-empty".to_string()));
    }
    if req.views.len() > MAX_BATCH {
        return Err(AppError::Validation(format!(
            "views exceeds the batch maximum of {MAX_BATCH}"
        )));
    }

    let mut rows = Vec::with_capacity(req.views.len());
    for event in req.views {
        check_profile(&state, &event.profile_id).await?;
        rows.push(build_view(&state, event, &headers)?);
    }
    // The session upserts assume chronological order within the transaction.
    rows.sort_by_key(|(view, _)| view.created_at);
    let (views, bus): (Vec<ProfileView>, Vec<RealtimeEventRow>) = rows.into_iter().unzip();

    write_with_retry(|| async { state.db.insert_views_batch(&views, &bus).await.map(|_| ()) }, "batch").await?;

    for (view, bus_row) in views.iter().zip(&bus) {
        let data = json!({
            "viewId": view.id,
            "sessionId": view.session_id,
            "country": view.country,
            "deviceType": view.device_type,
            "referrer": view.referrer,
        });
        publish_ingest_event(&state, "view", &view.profile_id, data, &bus_row.id).await;
    }

    Ok(Json(json!({
        "success": true,
        "data": { "trackedCount": views.len() }
    })))
}

/// `POST /api/track/session/end` — close a session. Idempotent.
#[tracing::instrument(skip(state, req))]
pub async fn end_session(
    State(state): State<SharedState>,
    Json(req): Json<EndSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.session_id.trim().is_empty() {
        return Err(AppError::Validation(
            "sessionId must be non-empty".to_string(),
        ));
    }
    let found = state
        .db
        .end_session(&req.session_id, Utc::now())
        .await
        .map_err(|e| AppError::Unavailable(format!("session store write failed: {e}")))?;
    if !found {
        return Err(AppError::NotFound(format!(
            "unknown session: {}",
            req.session_id
        )));
    }
    Ok(Json(json!({ "success": true })))
}

/// `GET /api/track/session/{session_id}` — fetch one session.
#[tracing::instrument(skip(state))]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .db
        .get_session(&session_id)
        .await
        .map_err(|e| AppError::Unavailable(format!("session read failed: {e}")))?
        .ok_or_else(|| AppError::NotFound(format!("unknown session: {session_id}")))?;
    Ok(Json(json!({ "success": true, "data": session })))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn enforce_rate_limit(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let ip = client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    if !state.check_rate_limit(&ip).await {
        return Err(AppError::RateLimited);
    }
    Ok(())
}

/// Optional chain probe before accepting an event. A definitive "does not
/// exist" rejects; a probe failure is unknown and the event is accepted, so
/// a chain outage never loses data.
async fn check_profile(state: &AppState, profile_id: &str) -> Result<(), AppError> {
    if !state.config.profile_check {
        return Ok(());
    }
    match state.chain.profile_exists(profile_id).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::NotFound(format!("unknown profile: {profile_id}"))),
        Err(e) => {
            warn!(profile_id, error = %e, "Chain probe failed; accepting event");
            Ok(())
        }
    }
}

fn build_view(
    state: &AppState,
    req: TrackViewRequest,
    headers: &HeaderMap,
) -> Result<(ProfileView, RealtimeEventRow), AppError> {
    if req.profile_id.trim().is_empty() {
        return Err(AppError::Validation(
            "profileId must be non-empty".to_string(),
        ));
    }
    let session_id = resolve_session_id(req.session_id);
    let created_at = resolve_timestamp(req.timestamp)?;
    let visitor_ip = req.visitor_ip.or_else(|| client_ip(headers));
    let user_agent = req.user_agent.or_else(|| header_user_agent(headers));
    let (geo, device) = state
        .enricher
        .enrich(visitor_ip.as_deref(), user_agent.as_deref());

    let view = ProfileView {
        id: uuid::Uuid::new_v4().to_string(),
        profile_id: req.profile_id,
        session_id: Some(session_id.clone()),
        visitor_ip,
        user_agent,
        referrer: req.referrer,
        country: geo.country,
        region: geo.region,
        city: geo.city,
        device_type: device.device_type,
        browser: device.browser,
        os: device.os,
        created_at,
    };
    let data = json!({ "viewId": view.id, "sessionId": session_id });
    let bus = bus_row(&view.profile_id, "view", &data, created_at);
    Ok((view, bus))
}

fn bus_row(
    profile_id: &str,
    kind: &str,
    data: &serde_json::Value,
    created_at: DateTime<Utc>,
) -> RealtimeEventRow {
    RealtimeEventRow {
        id: uuid::Uuid::new_v4().to_string(),
        profile_id: profile_id.to_string(),
        kind: kind.to_string(),
        payload: data.to_string(),
        created_at,
    }
}

fn resolve_session_id(provided: Option<String>) -> String {
    provided
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(generate_session_id)
}

fn resolve_timestamp(millis: Option<i64>) -> Result<DateTime<Utc>, AppError> {
    match millis {
        None => Ok(Utc::now()),
        Some(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| AppError::Validation("timestamp out of range".to_string())),
    }
}

/// Real client IP from `X-Forwarded-For` (first entry).
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn header_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

/// Run a store write up to three times with jittered backoff before
/// surfacing `Unavailable`. The event is never silently dropped: the final
/// failure reaches the caller.
async fn write_with_retry<F, Fut>(mut op: F, what: &str) -> Result<(), AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let mut last_err = None;
    for attempt in 0..WRITE_ATTEMPTS {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < WRITE_ATTEMPTS {
                    let jitter = rand::thread_rng().gen_range(0..50);
                    let backoff = 50 * (attempt as u64 + 1) + jitter;
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }
    }
    let e = last_err.expect("at least one attempt ran");
    warn!(what, error = %e, "Event store write failed after retries");
    Err(AppError::Unavailable(format!("{what} write failed")))
}
