use anyhow::Result;
use chrono::NaiveDate;

use linkpulse_core::referrer::classify_referrer;

use crate::backend::{date_str, ts};
use crate::queries::report::{
    device_rows_sync, geo_rows_sync, referrer_rows_sync, range_totals_sync, LinkGroupRow,
};
use crate::DuckDbBackend;

/// Materialization of the five rollup tables for one profile and one closed
/// day. Every write is a natural-key UPSERT that replaces all aggregated
/// values, so re-running a day is idempotent as long as the raw tables are
/// unchanged.
impl DuckDbBackend {
    /// Profiles with at least one raw event on `day`, ordered for
    /// deterministic scheduling.
    pub async fn profiles_with_events(&self, day: NaiveDate) -> Result<Vec<String>> {
        let (start, end) = day_bounds(day);
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT profile_id FROM (
                SELECT profile_id FROM profile_views
                WHERE created_at >= ?1 AND created_at < ?2
                UNION ALL
                SELECT profile_id FROM link_clicks
                WHERE created_at >= ?1 AND created_at < ?2
            ) AS t
            ORDER BY profile_id
            "#,
        )?;
        let rows = stmt.query_map(duckdb::params![start, end], |row| row.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Run all five rollups for one profile/day. Callers treat a failure as
    /// per-profile: it is logged and the remaining profiles still run.
    pub async fn rollup_profile_day(&self, profile_id: &str, day: NaiveDate) -> Result<()> {
        self.rollup_daily_stats(profile_id, day).await?;
        self.rollup_link_stats(profile_id, day).await?;
        self.rollup_geo_stats(profile_id, day).await?;
        self.rollup_device_stats(profile_id, day).await?;
        self.rollup_referrer_stats(profile_id, day).await?;
        Ok(())
    }

    pub async fn rollup_daily_stats(&self, profile_id: &str, day: NaiveDate) -> Result<()> {
        let (start, end) = day_bounds(day);
        let conn = self.conn.lock().await;

        let totals = range_totals_sync(&conn, profile_id, &start, &end)?;

        let (sessions, avg_duration, bounced): (i64, Option<f64>, i64) = conn
            .prepare(
                "SELECT COUNT(*),
                        AVG(duration_seconds),
                        COALESCE(SUM(CASE WHEN page_views <= 1 THEN 1 ELSE 0 END), 0)
                 FROM sessions
                 WHERE profile_id = ?1 AND started_at >= ?2 AND started_at < ?3",
            )?
            .query_row(duckdb::params![profile_id, start, end], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;

        let bounce_rate = if sessions == 0 {
            0.0
        } else {
            100.0 * bounced as f64 / sessions as f64
        };

        conn.execute(
            "INSERT INTO daily_stats
                (profile_id, date, views, unique_views, clicks, unique_clicks,
                 sessions, avg_duration, bounce_rate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (profile_id, date) DO UPDATE SET
                views = EXCLUDED.views,
                unique_views = EXCLUDED.unique_views,
                clicks = EXCLUDED.clicks,
                unique_clicks = EXCLUDED.unique_clicks,
                sessions = EXCLUDED.sessions,
                avg_duration = EXCLUDED.avg_duration,
                bounce_rate = EXCLUDED.bounce_rate",
            duckdb::params![
                profile_id,
                date_str(day),
                totals.views,
                totals.unique_views,
                totals.clicks,
                totals.unique_clicks,
                sessions,
                avg_duration,
                bounce_rate,
            ],
        )?;
        Ok(())
    }

    pub async fn rollup_link_stats(&self, profile_id: &str, day: NaiveDate) -> Result<()> {
        let (start, end) = day_bounds(day);
        let conn = self.conn.lock().await;

        let total_views = range_totals_sync(&conn, profile_id, &start, &end)?.views;
        let groups = link_index_groups(&conn, profile_id, &start, &end)?;

        let mut stmt = conn.prepare(
            "INSERT INTO link_stats
                (profile_id, link_index, date, link_title, link_url, clicks, unique_clicks, ctr)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (profile_id, link_index, date) DO UPDATE SET
                link_title = EXCLUDED.link_title,
                link_url = EXCLUDED.link_url,
                clicks = EXCLUDED.clicks,
                unique_clicks = EXCLUDED.unique_clicks,
                ctr = EXCLUDED.ctr",
        )?;
        for group in groups {
            let ctr = if total_views == 0 {
                0.0
            } else {
                100.0 * group.clicks as f64 / total_views as f64
            };
            stmt.execute(duckdb::params![
                profile_id,
                group.link_index,
                date_str(day),
                group.link_title,
                group.link_url,
                group.clicks,
                group.unique_clicks,
                ctr,
            ])?;
        }
        Ok(())
    }

    pub async fn rollup_geo_stats(&self, profile_id: &str, day: NaiveDate) -> Result<()> {
        let (start, end) = day_bounds(day);
        let conn = self.conn.lock().await;
        let rows = geo_rows_sync(&conn, profile_id, &start, &end, None)?;

        let mut stmt = conn.prepare(
            "INSERT INTO geo_stats (profile_id, country, city, date, region, views, clicks)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (profile_id, country, city, date) DO UPDATE SET
                region = EXCLUDED.region,
                views = EXCLUDED.views,
                clicks = EXCLUDED.clicks",
        )?;
        for row in rows {
            stmt.execute(duckdb::params![
                profile_id,
                row.keys[0],
                row.keys[1],
                date_str(day),
                row.extra,
                row.views,
                row.clicks,
            ])?;
        }
        Ok(())
    }

    pub async fn rollup_device_stats(&self, profile_id: &str, day: NaiveDate) -> Result<()> {
        let (start, end) = day_bounds(day);
        let conn = self.conn.lock().await;
        let rows = device_rows_sync(&conn, profile_id, &start, &end, None)?;

        let mut stmt = conn.prepare(
            "INSERT INTO device_stats
                (profile_id, device_type, browser, os, date, views, clicks)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (profile_id, device_type, browser, os, date) DO UPDATE SET
                views = EXCLUDED.views,
                clicks = EXCLUDED.clicks",
        )?;
        for row in rows {
            stmt.execute(duckdb::params![
                profile_id,
                row.keys[0],
                row.keys[1],
                row.keys[2],
                date_str(day),
                row.views,
                row.clicks,
            ])?;
        }
        Ok(())
    }

    pub async fn rollup_referrer_stats(&self, profile_id: &str, day: NaiveDate) -> Result<()> {
        let (start, end) = day_bounds(day);
        let conn = self.conn.lock().await;
        let rows = referrer_rows_sync(&conn, profile_id, &start, &end, None)?;

        let mut stmt = conn.prepare(
            "INSERT INTO referrer_stats
                (profile_id, referrer, date, referrer_type, views, clicks)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (profile_id, referrer, date) DO UPDATE SET
                referrer_type = EXCLUDED.referrer_type,
                views = EXCLUDED.views,
                clicks = EXCLUDED.clicks",
        )?;
        for row in rows {
            let referrer = &row.keys[0];
            stmt.execute(duckdb::params![
                profile_id,
                referrer,
                date_str(day),
                classify_referrer(referrer).as_str(),
                row.views,
                row.clicks,
            ])?;
        }
        Ok(())
    }
}

/// Link clicks aggregated strictly by `link_index`, matching the
/// `(profile_id, link_index, date)` key of the link_stats table. Title and
/// url take any observed value; varying strings within a day collapse into
/// the one row the key allows, with their clicks summed.
fn link_index_groups(
    conn: &duckdb::Connection,
    profile_id: &str,
    start: &str,
    end: &str,
) -> Result<Vec<LinkGroupRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT link_index,
               COALESCE(MAX(link_title), 'Untitled') AS link_title,
               COALESCE(MAX(link_url), '') AS link_url,
               COUNT(*) AS clicks,
               COUNT(DISTINCT session_id) AS unique_clicks
        FROM link_clicks
        WHERE profile_id = ?1 AND created_at >= ?2 AND created_at < ?3
        GROUP BY link_index
        ORDER BY link_index
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
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Half-open timestamp bounds `[D 00:00, D+1 00:00)` for a closed day.
fn day_bounds(day: NaiveDate) -> (String, String) {
    let start = day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let end = start + chrono::Duration::days(1);
    (ts(start), ts(end))
}
