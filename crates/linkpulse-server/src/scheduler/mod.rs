use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use linkpulse_duckdb::retention::ROLLUP_RETENTION_DAYS;

use crate::state::AppState;

/// Hour (UTC) at which the daily retention run starts.
const RETENTION_HOUR_UTC: u32 = 3;

const ORPHAN_CLOSE_INTERVAL: Duration = Duration::from_secs(60 * 60);
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Delivered realtime bus rows are kept for a day before being swept.
const REALTIME_BUS_RETENTION_HOURS: i64 = 24;

/// Sleep until the next occurrence of `hour:00` UTC.
pub async fn sleep_until_utc_hour(hour: u32) {
    let now = Utc::now();
    let today_at = now
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .unwrap_or_default()
        .and_utc();
    let next = if today_at > now {
        today_at
    } else {
        today_at + ChronoDuration::days(1)
    };
    let secs = (next - now).num_seconds().max(1) as u64;
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

/// One retention pass. Deletes are independent per table: a failure is
/// logged and the remaining tables still run; the next scheduled pass
/// retries.
pub async fn run_retention_once(state: &Arc<AppState>) {
    let now = Utc::now();
    let cfg = &state.config;

    let views_cutoff = now - ChronoDuration::days(cfg.retention_views_days as i64);
    match state.db.delete_views_before(views_cutoff).await {
        Ok(n) if n > 0 => info!(removed = n, "Retention: profile_views"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Retention failed for profile_views"),
    }

    let clicks_cutoff = now - ChronoDuration::days(cfg.retention_clicks_days as i64);
    match state.db.delete_clicks_before(clicks_cutoff).await {
        Ok(n) if n > 0 => info!(removed = n, "Retention: link_clicks"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Retention failed for link_clicks"),
    }

    let sessions_cutoff = now - ChronoDuration::days(cfg.retention_sessions_days as i64);
    match state.db.delete_sessions_before(sessions_cutoff).await {
        Ok(n) if n > 0 => info!(removed = n, "Retention: sessions"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Retention failed for sessions"),
    }

    let rollup_cutoff = now.date_naive() - ChronoDuration::days(ROLLUP_RETENTION_DAYS);
    match state.db.delete_rollups_before(rollup_cutoff).await {
        Ok(n) if n > 0 => info!(removed = n, "Retention: rollup tables"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Retention failed for rollup tables"),
    }

    let bus_cutoff = now - ChronoDuration::hours(REALTIME_BUS_RETENTION_HOURS);
    match state.db.delete_processed_realtime_before(bus_cutoff).await {
        Ok(n) if n > 0 => info!(removed = n, "Retention: realtime_events"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Retention failed for realtime_events"),
    }
}

/// Background loop: retention pass every day at 03:00 UTC.
pub async fn run_retention_loop(state: Arc<AppState>) {
    loop {
        sleep_until_utc_hour(RETENTION_HOUR_UTC).await;
        run_retention_once(&state).await;
    }
}

/// Background loop: close orphaned sessions every hour.
pub async fn run_orphan_close_loop(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(ORPHAN_CLOSE_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match state.db.close_orphan_sessions(Utc::now()).await {
            Ok(n) if n > 0 => info!(closed = n, "Closed orphaned sessions"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Orphan session closure failed"),
        }
    }
}

/// Background loop: purge expired analytics cache rows every six hours.
pub async fn run_cache_sweep_loop(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(CACHE_SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match state.db.cache_sweep(Utc::now()).await {
            Ok(n) if n > 0 => info!(removed = n, "Analytics cache swept"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Cache sweep failed"),
        }
    }
}

/// Background loop: best-effort physical space reclaim, weekly.
pub async fn run_checkpoint_loop(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(CHECKPOINT_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = state.db.checkpoint().await {
            error!(error = %e, "Checkpoint failed");
        }
    }
}
