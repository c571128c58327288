use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use crate::schema::init_sql;

/// The DuckDB store for linkpulse.
///
/// DuckDB is single-writer: concurrent reads are fine, but concurrent writes
/// contend. The connection is wrapped in `Arc<Mutex<_>>` so the async runtime
/// serialises all store operations while the struct stays cheap to clone and
/// share across Axum handlers and scheduler loops. This mutex is also what
/// serialises competing writers to the same session row.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) the database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`,
    /// read from `Config.duckdb_memory_limit` at the call site. All schema
    /// statements are `IF NOT EXISTS`, so re-running them on startup is safe.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(path, memory_limit, "DuckDB opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Intended for tests; data is discarded
    /// when the struct is dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("1GB"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// `SELECT 1` liveness check for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Acquire the connection lock for direct queries.
    ///
    /// Intended for integration tests that need to verify stored rows.
    /// Production code uses the typed methods on this struct.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Format a timestamp the way every TIMESTAMP parameter is bound: UTC,
/// microsecond precision, no zone suffix.
pub(crate) fn ts(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Format a date column value (midnight-UTC truncation).
pub(crate) fn date_str(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Parse a TIMESTAMP column read back as VARCHAR.
pub(crate) fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    let fmt_full = "%Y-%m-%d %H:%M:%S%.f";
    let fmt_plain = "%Y-%m-%d %H:%M:%S";
    chrono::NaiveDateTime::parse_from_str(s, fmt_full)
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, fmt_plain))
        .ok()
        .map(|n| n.and_utc())
}
