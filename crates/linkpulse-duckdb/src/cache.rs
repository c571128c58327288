use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::backend::ts;
use crate::DuckDbBackend;

/// The analytics report cache, backed by the `analytics_cache` table.
/// Callers treat every error here as a miss; a cache failure must never fail
/// a request.
impl DuckDbBackend {
    pub async fn cache_get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT payload FROM analytics_cache
             WHERE cache_key = ?1 AND expires_at > ?2",
        )?;
        let payload = stmt
            .query_row(duckdb::params![key, ts(now)], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                duckdb::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(payload)
    }

    pub async fn cache_put(
        &self,
        key: &str,
        payload: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO analytics_cache (cache_key, payload, expires_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (cache_key) DO UPDATE SET
                payload = EXCLUDED.payload,
                expires_at = EXCLUDED.expires_at",
            duckdb::params![key, payload, ts(expires_at)],
        )?;
        Ok(())
    }

    /// Drop expired entries; returns the number of rows removed.
    pub async fn cache_sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM analytics_cache WHERE expires_at < ?1",
            duckdb::params![ts(now)],
        )?;
        Ok(removed)
    }
}
