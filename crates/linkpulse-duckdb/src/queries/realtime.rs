use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use linkpulse_core::report::RealtimeSnapshot;

use crate::backend::ts;
use crate::DuckDbBackend;

impl DuckDbBackend {
    /// The live dashboard tuple. Always reads the raw tables; this is the
    /// freshness path and must never consult the report cache.
    ///
    /// Active users are open sessions (no end time) started within the last
    /// five minutes; recent views/clicks count rows from the last 60 seconds.
    pub async fn realtime_snapshot(
        &self,
        profile_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RealtimeSnapshot> {
        let conn = self.conn.lock().await;
        let active_cutoff = ts(now - Duration::minutes(5));
        let recent_cutoff = ts(now - Duration::seconds(60));

        let active_users: i64 = conn
            .prepare(
                "SELECT COUNT(*) FROM sessions
                 WHERE profile_id = ?1 AND ended_at IS NULL AND started_at >= ?2",
            )?
            .query_row(duckdb::params![profile_id, active_cutoff], |row| row.get(0))?;

        let recent_views: i64 = conn
            .prepare(
                "SELECT COUNT(*) FROM profile_views
                 WHERE profile_id = ?1 AND created_at >= ?2",
            )?
            .query_row(duckdb::params![profile_id, recent_cutoff], |row| row.get(0))?;

        let recent_clicks: i64 = conn
            .prepare(
                "SELECT COUNT(*) FROM link_clicks
                 WHERE profile_id = ?1 AND created_at >= ?2",
            )?
            .query_row(duckdb::params![profile_id, recent_cutoff], |row| row.get(0))?;

        Ok(RealtimeSnapshot {
            active_users,
            recent_views,
            recent_clicks,
        })
    }
}
