use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::backend::{date_str, ts};
use crate::DuckDbBackend;

/// Rollup rows are kept for two years regardless of the raw-table windows.
pub const ROLLUP_RETENTION_DAYS: i64 = 730;

/// Sessions with no end time and no activity for this long are closed by the
/// hourly orphan sweep.
pub const ORPHAN_SESSION_HOURS: i64 = 24;

/// Row-lifetime enforcement. Each delete stands alone; the scheduler logs a
/// failed table and carries on, retrying on the next run.
impl DuckDbBackend {
    pub async fn delete_views_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM profile_views WHERE created_at < ?1",
            duckdb::params![ts(cutoff)],
        )?;
        Ok(removed)
    }

    pub async fn delete_clicks_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM link_clicks WHERE created_at < ?1",
            duckdb::params![ts(cutoff)],
        )?;
        Ok(removed)
    }

    pub async fn delete_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM sessions WHERE started_at < ?1",
            duckdb::params![ts(cutoff)],
        )?;
        Ok(removed)
    }

    /// Delete rollup rows older than `cutoff_date` across all five tables.
    /// Returns the total rows removed.
    pub async fn delete_rollups_before(&self, cutoff_date: NaiveDate) -> Result<usize> {
        let conn = self.conn.lock().await;
        let date = date_str(cutoff_date);
        let mut removed = 0;
        for table in [
            "daily_stats",
            "link_stats",
            "geo_stats",
            "device_stats",
            "referrer_stats",
        ] {
            removed += conn.execute(
                &format!("DELETE FROM {table} WHERE date < ?1"),
                duckdb::params![date],
            )?;
        }
        Ok(removed)
    }

    pub async fn delete_processed_realtime_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM realtime_events WHERE processed AND created_at < ?1",
            duckdb::params![ts(cutoff)],
        )?;
        Ok(removed)
    }

    /// Close sessions that never received an explicit end: anything still
    /// open after 24 hours of silence gets `ended_at = now - 24h` and the
    /// corresponding duration. Returns the number of sessions closed.
    pub async fn close_orphan_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = ts(now - Duration::hours(ORPHAN_SESSION_HOURS));
        let conn = self.conn.lock().await;
        let closed = conn.execute(
            "UPDATE sessions
             SET ended_at = CAST(?1 AS TIMESTAMP),
                 duration_seconds = date_diff('second', started_at, CAST(?1 AS TIMESTAMP))
             WHERE ended_at IS NULL AND started_at < ?1",
            duckdb::params![cutoff],
        )?;
        Ok(closed)
    }

    /// Best-effort physical space reclaim.
    pub async fn checkpoint(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("CHECKPOINT")?;
        Ok(())
    }
}
