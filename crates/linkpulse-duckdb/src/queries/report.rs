use anyhow::Result;
use chrono::{DateTime, Utc};
use duckdb::Connection;

use linkpulse_core::timerange::Period;

use crate::backend::ts;
use crate::DuckDbBackend;

/// Range totals over the raw event tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeTotals {
    pub views: i64,
    pub unique_views: i64,
    pub clicks: i64,
    pub unique_clicks: i64,
}

/// One row of a grouped dimension breakdown (views outer-joined with clicks).
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionRow {
    /// Key fields; meaning depends on the dimension:
    /// geo -> [country, city], device -> [device_type, browser, os],
    /// referrer -> [referrer].
    pub keys: Vec<String>,
    /// Extra non-key attribute (region for geo), when present.
    pub extra: Option<String>,
    pub views: i64,
    pub clicks: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkGroupRow {
    pub link_index: i64,
    pub link_title: String,
    pub link_url: String,
    pub clicks: i64,
    pub unique_clicks: i64,
}

impl DuckDbBackend {
    pub async fn range_totals(
        &self,
        profile_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RangeTotals> {
        let conn = self.conn.lock().await;
        range_totals_sync(&conn, profile_id, &ts(start), &ts(end))
    }

    /// Time-series rows grouped by the period's `date_trunc` bucket over both
    /// raw tables, chronological. Bucket keys are the truncated timestamps as
    /// VARCHAR; label formatting happens in the caller.
    pub async fn timeseries_rows(
        &self,
        profile_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period: Period,
    ) -> Result<Vec<(String, i64, i64)>> {
        let conn = self.conn.lock().await;
        // Trusted enum value, never user input.
        let unit = period.trunc_unit();
        let sql = format!(
            r#"
            WITH v AS (
                SELECT CAST(date_trunc('{unit}', created_at) AS VARCHAR) AS bucket, COUNT(*) AS views
                FROM profile_views
                WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3
                GROUP BY bucket
            ),
            c AS (
                SELECT CAST(date_trunc('{unit}', created_at) AS VARCHAR) AS bucket, COUNT(*) AS clicks
                FROM link_clicks
                WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3
                GROUP BY bucket
            )
            SELECT COALESCE(v.bucket, c.bucket) AS bucket,
                   COALESCE(v.views, 0),
                   COALESCE(c.clicks, 0)
            FROM v FULL OUTER JOIN c ON v.bucket = c.bucket
            ORDER BY bucket
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params![profile_id, ts(start), ts(end)], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn geo_rows(
        &self,
        profile_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<i64>,
    ) -> Result<Vec<DimensionRow>> {
        let conn = self.conn.lock().await;
        geo_rows_sync(&conn, profile_id, &ts(start), &ts(end), limit)
    }

    pub async fn device_rows(
        &self,
        profile_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<i64>,
    ) -> Result<Vec<DimensionRow>> {
        let conn = self.conn.lock().await;
        device_rows_sync(&conn, profile_id, &ts(start), &ts(end), limit)
    }

    pub async fn referrer_rows(
        &self,
        profile_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<i64>,
    ) -> Result<Vec<DimensionRow>> {
        let conn = self.conn.lock().await;
        referrer_rows_sync(&conn, profile_id, &ts(start), &ts(end), limit)
    }

    pub async fn link_group_rows(
        &self,
        profile_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LinkGroupRow>> {
        let conn = self.conn.lock().await;
        link_group_rows_sync(&conn, profile_id, &ts(start), &ts(end))
    }
}

pub(crate) fn range_totals_sync(
    conn: &Connection,
    profile_id: &str,
    start: &str,
    end: &str,
) -> Result<RangeTotals> {
    let mut stmt = conn.prepare(
        r#"
        SELECT
            (SELECT COUNT(*) FROM profile_views
             WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3),
            (SELECT COUNT(DISTINCT session_id) FROM profile_views
             WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3
               AND session_id IS NOT NULL),
            (SELECT COUNT(*) FROM link_clicks
             WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3),
            (SELECT COUNT(DISTINCT session_id) FROM link_clicks
             WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3
               AND session_id IS NOT NULL)
        "#,
    )?;
    let totals = stmt.query_row(duckdb::params![profile_id, start, end], |row| {
        Ok(RangeTotals {
            views: row.get(0)?,
            unique_views: row.get(1)?,
            clicks: row.get(2)?,
            unique_clicks: row.get(3)?,
        })
    })?;
    Ok(totals)
}

/// Geo breakdown keyed by (country, city) with null city coalesced to empty
/// string; rows with null country are omitted. Click counts are outer-joined
/// and default to zero. The same grouping feeds both the raw report path and
/// the geo_stats rollup, which is what keeps the two paths value-identical.
pub(crate) fn geo_rows_sync(
    conn: &Connection,
    profile_id: &str,
    start: &str,
    end: &str,
    limit: Option<i64>,
) -> Result<Vec<DimensionRow>> {
    let limit_sql = limit_clause(limit);
    let sql = format!(
        r#"
        WITH v AS (
            SELECT country, COALESCE(city, '') AS city, MAX(region) AS region, COUNT(*) AS views
            FROM profile_views
            WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3
              AND country IS NOT NULL AND country <> ''
            GROUP BY country, city
        ),
        c AS (
            SELECT country, COALESCE(city, '') AS city, COUNT(*) AS clicks
            FROM link_clicks
            WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3
              AND country IS NOT NULL AND country <> ''
            GROUP BY country, city
        )
        SELECT COALESCE(v.country, c.country) AS country,
               COALESCE(v.city, c.city) AS city,
               v.region,
               COALESCE(v.views, 0) AS views,
               COALESCE(c.clicks, 0) AS clicks
        FROM v FULL OUTER JOIN c ON v.country = c.country AND v.city = c.city
        ORDER BY views DESC, country, city
        {limit_sql}
        "#
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(duckdb::params![profile_id, start, end], |row| {
        Ok(DimensionRow {
            keys: vec![row.get(0)?, row.get(1)?],
            extra: row.get(2)?,
            views: row.get(3)?,
            clicks: row.get(4)?,
        })
    })?;
    collect(rows)
}

/// Device breakdown keyed by (device_type, browser, os), nulls coalesced to
/// empty string so the key matches the device_stats primary key.
pub(crate) fn device_rows_sync(
    conn: &Connection,
    profile_id: &str,
    start: &str,
    end: &str,
    limit: Option<i64>,
) -> Result<Vec<DimensionRow>> {
    let limit_sql = limit_clause(limit);
    let sql = format!(
        r#"
        WITH v AS (
            SELECT COALESCE(device_type, '') AS device_type,
                   COALESCE(browser, '') AS browser,
                   COALESCE(os, '') AS os,
                   COUNT(*) AS views
            FROM profile_views
            WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3
            GROUP BY device_type, browser, os
        ),
        c AS (
            SELECT COALESCE(device_type, '') AS device_type,
                   COALESCE(browser, '') AS browser,
                   COALESCE(os, '') AS os,
                   COUNT(*) AS clicks
            FROM link_clicks
            WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3
            GROUP BY device_type, browser, os
        )
        SELECT COALESCE(v.device_type, c.device_type) AS device_type,
               COALESCE(v.browser, c.browser) AS browser,
               COALESCE(v.os, c.os) AS os,
               COALESCE(v.views, 0) AS views,
               COALESCE(c.clicks, 0) AS clicks
        FROM v FULL OUTER JOIN c
          ON v.device_type = c.device_type AND v.browser = c.browser AND v.os = c.os
        ORDER BY views DESC, device_type, browser, os
        {limit_sql}
        "#
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(duckdb::params![profile_id, start, end], |row| {
        Ok(DimensionRow {
            keys: vec![row.get(0)?, row.get(1)?, row.get(2)?],
            extra: None,
            views: row.get(3)?,
            clicks: row.get(4)?,
        })
    })?;
    collect(rows)
}

/// Referrer breakdown keyed by the raw referrer string (empty string for
/// direct traffic). Classification and hostname reduction happen in the
/// caller.
pub(crate) fn referrer_rows_sync(
    conn: &Connection,
    profile_id: &str,
    start: &str,
    end: &str,
    limit: Option<i64>,
) -> Result<Vec<DimensionRow>> {
    let limit_sql = limit_clause(limit);
    let sql = format!(
        r#"
        WITH v AS (
            SELECT COALESCE(referrer, '') AS referrer, COUNT(*) AS views
            FROM profile_views
            WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3
            GROUP BY referrer
        ),
        c AS (
            SELECT COALESCE(referrer, '') AS referrer, COUNT(*) AS clicks
            FROM link_clicks
            WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3
            GROUP BY referrer
        )
        SELECT COALESCE(v.referrer, c.referrer) AS referrer,
               COALESCE(v.views, 0) AS views,
               COALESCE(c.clicks, 0) AS clicks
        FROM v FULL OUTER JOIN c ON v.referrer = c.referrer
        ORDER BY views DESC, referrer
        {limit_sql}
        "#
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(duckdb::params![profile_id, start, end], |row| {
        Ok(DimensionRow {
            keys: vec![row.get(0)?],
            extra: None,
            views: row.get(1)?,
            clicks: row.get(2)?,
        })
    })?;
    collect(rows)
}

pub(crate) fn link_group_rows_sync(
    conn: &Connection,
    profile_id: &str,
    start: &str,
    end: &str,
) -> Result<Vec<LinkGroupRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT link_index,
               COALESCE(link_title, 'Untitled') AS link_title,
               COALESCE(link_url, '') AS link_url,
               COUNT(*) AS clicks,
               COUNT(DISTINCT session_id) AS unique_clicks
        FROM link_clicks
        WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3
        GROUP BY link_index, link_title, link_url
        ORDER BY clicks DESC, link_index
        "#,
    )?;
    let rows = stmt.query_map(duckdb::params![profile_id, start, end], |row| {
        Ok(LinkGroupRow {
            link_index: row.get(0)?,
            link_title: row.get(1)?,
            link_url: row.get(2)?,
            clicks: row.get(3)?,
            unique_clicks: row.get(4)?,
        })
    })?;
    collect(rows)
}

fn limit_clause(limit: Option<i64>) -> String {
    match limit {
        Some(n) => format!("LIMIT {n}"),
        None => String::new(),
    }
}

fn collect<T>(rows: impl Iterator<Item = duckdb::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
