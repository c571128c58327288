use anyhow::Result;
use chrono::{DateTime, Utc};
use duckdb::Transaction;

use linkpulse_core::event::{LinkClick, ProfileView, RealtimeEventRow, Session};
use linkpulse_core::timerange::utc_date;

use crate::backend::{date_str, parse_ts, ts};
use crate::DuckDbBackend;

/// One logical ingest operation per event: the raw row, the session upsert,
/// the daily counter upsert (and for clicks the link counter upsert), plus
/// the durable realtime bus row, all inside a single transaction.
impl DuckDbBackend {
    pub async fn insert_view(
        &self,
        view: &ProfileView,
        bus: Option<&RealtimeEventRow>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        insert_view_tx(&tx, view)?;
        if let Some(bus) = bus {
            insert_bus_row(&tx, bus)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub async fn insert_click(
        &self,
        click: &LinkClick,
        bus: Option<&RealtimeEventRow>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        insert_click_tx(&tx, click)?;
        if let Some(bus) = bus {
            insert_bus_row(&tx, bus)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Batch ingest: raw inserts coalesce into one transaction (one fsync
    /// instead of N) while the per-event session and daily upserts still run
    /// individually. `views` must be ordered by timestamp.
    pub async fn insert_views_batch(
        &self,
        views: &[ProfileView],
        bus: &[RealtimeEventRow],
    ) -> Result<usize> {
        if views.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for view in views {
            insert_view_tx(&tx, view)?;
        }
        for row in bus {
            insert_bus_row(&tx, row)?;
        }
        tx.commit()?;
        Ok(views.len())
    }

    /// Close a session if it is still open. Idempotent: a second call (or a
    /// call after the session already carries an end time) changes nothing.
    /// Returns `false` when the session id is unknown.
    pub async fn end_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().await;
        let exists: i64 = conn
            .prepare("SELECT COUNT(*) FROM sessions WHERE session_id = ?1")?
            .query_row(duckdb::params![session_id], |row| row.get(0))?;
        if exists == 0 {
            return Ok(false);
        }
        conn.execute(
            "UPDATE sessions
             SET ended_at = CAST(?2 AS TIMESTAMP),
                 duration_seconds = date_diff('second', started_at, CAST(?2 AS TIMESTAMP))
             WHERE session_id = ?1 AND ended_at IS NULL",
            duckdb::params![session_id, ts(now)],
        )?;
        Ok(true)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT session_id, profile_id, visitor_ip, user_agent, country, region, city,
                    device_type, browser, os,
                    CAST(started_at AS VARCHAR), CAST(ended_at AS VARCHAR),
                    duration_seconds, page_views, link_clicks
             FROM sessions WHERE session_id = ?1",
        )?;
        let session = stmt
            .query_row(duckdb::params![session_id], |row| {
                Ok(Session {
                    session_id: row.get(0)?,
                    profile_id: row.get(1)?,
                    visitor_ip: row.get(2)?,
                    user_agent: row.get(3)?,
                    country: row.get(4)?,
                    region: row.get(5)?,
                    city: row.get(6)?,
                    device_type: row.get(7)?,
                    browser: row.get(8)?,
                    os: row.get(9)?,
                    started_at: row
                        .get::<_, String>(10)
                        .map(|s| parse_ts(&s).unwrap_or_default())?,
                    ended_at: row
                        .get::<_, Option<String>>(11)?
                        .and_then(|s| parse_ts(&s)),
                    duration_seconds: row.get(12)?,
                    page_views: row.get(13)?,
                    link_clicks: row.get(14)?,
                })
            })
            .map(Some)
            .or_else(|e| match e {
                duckdb::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(session)
    }

    /// Flag delivered bus rows so retention can sweep them.
    pub async fn mark_realtime_processed(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("UPDATE realtime_events SET processed = true WHERE id = ?1")?;
        for id in ids {
            stmt.execute(duckdb::params![id])?;
        }
        Ok(())
    }
}

fn insert_view_tx(tx: &Transaction<'_>, view: &ProfileView) -> Result<()> {
    tx.execute(
        "INSERT INTO profile_views (
            id, profile_id, session_id, visitor_ip, user_agent, referrer,
            country, region, city, device_type, browser, os, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        duckdb::params![
            view.id,
            view.profile_id,
            view.session_id,
            view.visitor_ip,
            view.user_agent,
            view.referrer,
            view.country,
            view.region,
            view.city,
            view.device_type,
            view.browser,
            view.os,
            ts(view.created_at),
        ],
    )?;
    if let Some(session_id) = &view.session_id {
        upsert_session(tx, view, session_id, EventKind::View)?;
    }
    tx.execute(
        "INSERT INTO daily_stats (profile_id, date, views)
         VALUES (?1, ?2, 1)
         ON CONFLICT (profile_id, date) DO UPDATE SET views = daily_stats.views + 1",
        duckdb::params![view.profile_id, date_str(utc_date(view.created_at))],
    )?;
    Ok(())
}

fn insert_click_tx(tx: &Transaction<'_>, click: &LinkClick) -> Result<()> {
    tx.execute(
        "INSERT INTO link_clicks (
            id, profile_id, link_index, link_title, link_url, session_id,
            visitor_ip, user_agent, referrer, country, region, city,
            device_type, browser, os, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        duckdb::params![
            click.id,
            click.profile_id,
            click.link_index,
            click.link_title,
            click.link_url,
            click.session_id,
            click.visitor_ip,
            click.user_agent,
            click.referrer,
            click.country,
            click.region,
            click.city,
            click.device_type,
            click.browser,
            click.os,
            ts(click.created_at),
        ],
    )?;
    if let Some(session_id) = &click.session_id {
        let view = ProfileView {
            id: click.id.clone(),
            profile_id: click.profile_id.clone(),
            session_id: click.session_id.clone(),
            visitor_ip: click.visitor_ip.clone(),
            user_agent: click.user_agent.clone(),
            referrer: click.referrer.clone(),
            country: click.country.clone(),
            region: click.region.clone(),
            city: click.city.clone(),
            device_type: click.device_type.clone(),
            browser: click.browser.clone(),
            os: click.os.clone(),
            created_at: click.created_at,
        };
        upsert_session(tx, &view, session_id, EventKind::Click)?;
    }
    let date = date_str(utc_date(click.created_at));
    tx.execute(
        "INSERT INTO daily_stats (profile_id, date, clicks)
         VALUES (?1, ?2, 1)
         ON CONFLICT (profile_id, date) DO UPDATE SET clicks = daily_stats.clicks + 1",
        duckdb::params![click.profile_id, date],
    )?;
    // Title and url stick from the first click of the day; the aggregator is
    // the source of truth for those strings.
    tx.execute(
        "INSERT INTO link_stats (profile_id, link_index, date, link_title, link_url, clicks)
         VALUES (?1, ?2, ?3, ?4, ?5, 1)
         ON CONFLICT (profile_id, link_index, date)
         DO UPDATE SET clicks = link_stats.clicks + 1",
        duckdb::params![
            click.profile_id,
            click.link_index,
            date,
            click.link_title.as_deref().unwrap_or("Untitled"),
            click.link_url.as_deref().unwrap_or(""),
        ],
    )?;
    Ok(())
}

enum EventKind {
    View,
    Click,
}

/// Create the session on its first event, or stamp the end time and bump the
/// matching counter on every later one. The counters always equal the number
/// of committed events of each kind, whatever the interleaving.
fn upsert_session(
    tx: &Transaction<'_>,
    event: &ProfileView,
    session_id: &str,
    kind: EventKind,
) -> Result<()> {
    let (initial_views, initial_clicks, bump) = match kind {
        EventKind::View => (1, 0, "page_views = sessions.page_views + 1"),
        EventKind::Click => (0, 1, "link_clicks = sessions.link_clicks + 1"),
    };
    let sql = format!(
        "INSERT INTO sessions (
            session_id, profile_id, visitor_ip, user_agent, country, region,
            city, device_type, browser, os, started_at, page_views, link_clicks
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, {initial_views}, {initial_clicks})
         ON CONFLICT (session_id) DO UPDATE SET
            ended_at = EXCLUDED.started_at,
            duration_seconds = date_diff('second', sessions.started_at, EXCLUDED.started_at),
            {bump}"
    );
    tx.execute(
        &sql,
        duckdb::params![
            session_id,
            event.profile_id,
            event.visitor_ip,
            event.user_agent,
            event.country,
            event.region,
            event.city,
            event.device_type,
            event.browser,
            event.os,
            ts(event.created_at),
        ],
    )?;
    Ok(())
}

fn insert_bus_row(tx: &Transaction<'_>, row: &RealtimeEventRow) -> Result<()> {
    tx.execute(
        "INSERT INTO realtime_events (id, profile_id, kind, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        duckdb::params![row.id, row.profile_id, row.kind, row.payload, ts(row.created_at)],
    )?;
    Ok(())
}
