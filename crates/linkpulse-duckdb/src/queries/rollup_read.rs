use anyhow::Result;
use chrono::NaiveDate;

use crate::backend::date_str;
use crate::queries::report::{DimensionRow, LinkGroupRow, RangeTotals};
use crate::DuckDbBackend;

/// Reads over the rollup tables for the shortcut query path. Date bounds are
/// inclusive: a range `[start, end)` in timestamps covers the dates
/// `utc_date(start) ..= utc_date(end - 1ns)`; callers pass the resolved
/// inclusive day span.
impl DuckDbBackend {
    /// True when some day in the span has raw events but no aggregator pass
    /// yet. Ingest maintains `daily_stats` view/click counters as hints and
    /// leaves `sessions` at zero; only the aggregator fills it in, so a
    /// hint-only row marks a day the rollup substitution would misreport.
    pub async fn has_unaggregated_days(
        &self,
        profile_id: &str,
        first_day: NaiveDate,
        last_day: NaiveDate,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let hint_rows: i64 = conn
            .prepare(
                "SELECT COUNT(*) FROM daily_stats
                 WHERE profile_id = ?1 AND date >= ?2 AND date <= ?3
                   AND sessions = 0",
            )?
            .query_row(
                duckdb::params![profile_id, date_str(first_day), date_str(last_day)],
                |row| row.get(0),
            )?;
        Ok(hint_rows > 0)
    }

    pub async fn rollup_totals(
        &self,
        profile_id: &str,
        first_day: NaiveDate,
        last_day: NaiveDate,
    ) -> Result<RangeTotals> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT COALESCE(SUM(views), 0),
                    COALESCE(SUM(unique_views), 0),
                    COALESCE(SUM(clicks), 0),
                    COALESCE(SUM(unique_clicks), 0)
             FROM daily_stats
             WHERE profile_id = ?1 AND date >= ?2 AND date <= ?3",
        )?;
        let totals = stmt.query_row(
            duckdb::params![profile_id, date_str(first_day), date_str(last_day)],
            |row| {
                Ok(RangeTotals {
                    views: row.get(0)?,
                    unique_views: row.get(1)?,
                    clicks: row.get(2)?,
                    unique_clicks: row.get(3)?,
                })
            },
        )?;
        Ok(totals)
    }

    /// Per-day view/click counts, chronological. The caller composes these
    /// into day, week or month buckets.
    pub async fn rollup_daily_rows(
        &self,
        profile_id: &str,
        first_day: NaiveDate,
        last_day: NaiveDate,
    ) -> Result<Vec<(NaiveDate, i64, i64)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT CAST(date AS VARCHAR), views, clicks
             FROM daily_stats
             WHERE profile_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date",
        )?;
        let rows = stmt.query_map(
            duckdb::params![profile_id, date_str(first_day), date_str(last_day)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            let (date, views, clicks) = row?;
            if let Ok(day) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
                out.push((day, views, clicks));
            }
        }
        Ok(out)
    }

    pub async fn rollup_geo_rows(
        &self,
        profile_id: &str,
        first_day: NaiveDate,
        last_day: NaiveDate,
        limit: i64,
    ) -> Result<Vec<DimensionRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT country, city, MAX(region) AS region,
                    SUM(views) AS views, SUM(clicks) AS clicks
             FROM geo_stats
             WHERE profile_id = ?1 AND date >= ?2 AND date <= ?3
             GROUP BY country, city
             ORDER BY views DESC, country, city
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            duckdb::params![profile_id, date_str(first_day), date_str(last_day), limit],
            |row| {
                Ok(DimensionRow {
                    keys: vec![row.get(0)?, row.get(1)?],
                    extra: row.get(2)?,
                    views: row.get(3)?,
                    clicks: row.get(4)?,
                })
            },
        )?;
        collect(rows)
    }

    pub async fn rollup_device_rows(
        &self,
        profile_id: &str,
        first_day: NaiveDate,
        last_day: NaiveDate,
    ) -> Result<Vec<DimensionRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT device_type, browser, os,
                    SUM(views) AS views, SUM(clicks) AS clicks
             FROM device_stats
             WHERE profile_id = ?1 AND date >= ?2 AND date <= ?3
             GROUP BY device_type, browser, os
             ORDER BY views DESC, device_type, browser, os",
        )?;
        let rows = stmt.query_map(
            duckdb::params![profile_id, date_str(first_day), date_str(last_day)],
            |row| {
                Ok(DimensionRow {
                    keys: vec![row.get(0)?, row.get(1)?, row.get(2)?],
                    extra: None,
                    views: row.get(3)?,
                    clicks: row.get(4)?,
                })
            },
        )?;
        collect(rows)
    }

    pub async fn rollup_referrer_rows(
        &self,
        profile_id: &str,
        first_day: NaiveDate,
        last_day: NaiveDate,
        limit: i64,
    ) -> Result<Vec<DimensionRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT referrer, SUM(views) AS views, SUM(clicks) AS clicks
             FROM referrer_stats
             WHERE profile_id = ?1 AND date >= ?2 AND date <= ?3
             GROUP BY referrer
             ORDER BY views DESC, referrer
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            duckdb::params![profile_id, date_str(first_day), date_str(last_day), limit],
            |row| {
                Ok(DimensionRow {
                    keys: vec![row.get(0)?],
                    extra: None,
                    views: row.get(1)?,
                    clicks: row.get(2)?,
                })
            },
        )?;
        collect(rows)
    }

    /// Grouped by `link_index` alone, the same key the aggregator writes,
    /// so clicks for an index sum across days even when its title or url
    /// changed between them.
    pub async fn rollup_link_rows(
        &self,
        profile_id: &str,
        first_day: NaiveDate,
        last_day: NaiveDate,
    ) -> Result<Vec<LinkGroupRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT link_index, MAX(link_title) AS link_title, MAX(link_url) AS link_url,
                    SUM(clicks) AS clicks, SUM(unique_clicks) AS unique_clicks
             FROM link_stats
             WHERE profile_id = ?1 AND date >= ?2 AND date <= ?3
             GROUP BY link_index
             ORDER BY clicks DESC, link_index",
        )?;
        let rows = stmt.query_map(
            duckdb::params![profile_id, date_str(first_day), date_str(last_day)],
            |row| {
                Ok(LinkGroupRow {
                    link_index: row.get(0)?,
                    link_title: row.get(1)?,
                    link_url: row.get(2)?,
                    clicks: row.get(3)?,
                    unique_clicks: row.get(4)?,
                })
            },
        )?;
        collect(rows)
    }
}

fn collect<T>(rows: impl Iterator<Item = duckdb::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
