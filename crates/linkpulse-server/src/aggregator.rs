use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::scheduler::sleep_until_utc_hour;
use crate::state::AppState;

/// Hour (UTC) at which the daily rollup run starts.
const ROLLUP_HOUR_UTC: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct AggregateOutcome {
    pub profiles: usize,
    pub failed: usize,
}

/// Bound on concurrent per-profile rollup passes.
fn max_parallelism() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (cores * 2).min(32)
}

/// Materialize all five rollup tables for every profile with raw events on
/// `day`. Profiles run concurrently under a semaphore; a failed profile is
/// logged and does not stop the run. Re-running a day is idempotent.
pub async fn aggregate_day(state: &Arc<AppState>, day: NaiveDate) -> Result<AggregateOutcome> {
    let profiles = state.db.profiles_with_events(day).await?;
    let total = profiles.len();
    let semaphore = Arc::new(Semaphore::new(max_parallelism()));

    let mut handles = Vec::with_capacity(total);
    for profile_id in profiles {
        let state = Arc::clone(state);
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let result = state.db.rollup_profile_day(&profile_id, day).await;
            (profile_id, result)
        }));
    }

    let mut failed = 0;
    for handle in handles {
        match handle.await {
            Ok((_, Ok(()))) => {}
            Ok((profile_id, Err(e))) => {
                failed += 1;
                error!(profile_id, %day, error = %e, "Rollup failed for profile");
            }
            Err(e) => {
                failed += 1;
                error!(%day, error = %e, "Rollup task panicked");
            }
        }
    }

    Ok(AggregateOutcome {
        profiles: total,
        failed,
    })
}

/// Background loop: aggregate yesterday (UTC) every day at 02:00 UTC.
pub async fn run_aggregator_loop(state: Arc<AppState>) {
    loop {
        sleep_until_utc_hour(ROLLUP_HOUR_UTC).await;
        let day = Utc::now().date_naive() - chrono::Duration::days(1);
        match aggregate_day(&state, day).await {
            Ok(outcome) => info!(
                %day,
                profiles = outcome.profiles,
                failed = outcome.failed,
                "Daily rollup run complete"
            ),
            Err(e) => error!(%day, error = %e, "Daily rollup run failed"),
        }
    }
}
