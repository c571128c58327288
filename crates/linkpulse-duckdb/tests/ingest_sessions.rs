mod common;

use chrono::{Duration, Utc};

use common::{sample_click, sample_view, t0};
use linkpulse_duckdb::DuckDbBackend;

#[tokio::test]
async fn fresh_view_creates_session_and_daily_counter() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let at = t0();
    let view = sample_view("P1", "s-fresh", at);
    db.insert_view(&view, None).await.expect("insert");

    let conn = db.conn_for_test().await;
    let views: i64 = conn
        .prepare("SELECT COUNT(*) FROM profile_views WHERE profile_id = 'P1'")
        .unwrap()
        .query_row([], |row| row.get(0))
        .unwrap();
    assert_eq!(views, 1);

    let (page_views, link_clicks, ended): (i64, i64, Option<String>) = conn
        .prepare(
            "SELECT page_views, link_clicks, CAST(ended_at AS VARCHAR)
             FROM sessions WHERE session_id = 's-fresh'",
        )
        .unwrap()
        .query_row([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap();
    assert_eq!(page_views, 1);
    assert_eq!(link_clicks, 0);
    assert!(ended.is_none(), "first event must leave the session open");

    let daily_views: i64 = conn
        .prepare(
            "SELECT views FROM daily_stats
             WHERE profile_id = 'P1' AND date = CAST(?1 AS DATE)",
        )
        .unwrap()
        .query_row(
            linkpulse_duckdb::duckdb::params![at.date_naive().format("%Y-%m-%d").to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(daily_views, 1);
}

#[tokio::test]
async fn session_stitching_accumulates_counters_and_duration() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let at = t0();

    db.insert_view(&sample_view("P1", "S", at), None)
        .await
        .expect("view 1");
    db.insert_view(&sample_view("P1", "S", at + Duration::seconds(20)), None)
        .await
        .expect("view 2");
    db.insert_click(&sample_click("P1", "S", 0, at + Duration::seconds(30)), None)
        .await
        .expect("click");

    let conn = db.conn_for_test().await;
    let (page_views, link_clicks, duration): (i64, i64, Option<i64>) = conn
        .prepare(
            "SELECT page_views, link_clicks, duration_seconds
             FROM sessions WHERE session_id = 'S'",
        )
        .unwrap()
        .query_row([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap();
    assert_eq!(page_views, 2);
    assert_eq!(link_clicks, 1);
    assert_eq!(duration, Some(30));
}

#[tokio::test]
async fn session_counters_equal_event_counts_regardless_of_interleaving() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let at = t0();

    // click, view, click, view, view, click, view, view
    let mut offset = 0;
    for kind in ["c", "v", "c", "v", "v", "c", "v", "v"] {
        offset += 1;
        let ts = at + Duration::seconds(offset);
        if kind == "v" {
            db.insert_view(&sample_view("P1", "mix", ts), None)
                .await
                .expect("view");
        } else {
            db.insert_click(&sample_click("P1", "mix", 0, ts), None)
                .await
                .expect("click");
        }
    }

    let conn = db.conn_for_test().await;
    let (page_views, link_clicks): (i64, i64) = conn
        .prepare("SELECT page_views, link_clicks FROM sessions WHERE session_id = 'mix'")
        .unwrap()
        .query_row([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap();
    assert_eq!(page_views, 5);
    assert_eq!(link_clicks, 3);
}

#[tokio::test]
async fn batch_insert_matches_per_event_semantics() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let at = t0();
    let views: Vec<_> = (0..4)
        .map(|i| sample_view("P1", "batch", at + Duration::seconds(i)))
        .collect();
    let tracked = db.insert_views_batch(&views, &[]).await.expect("batch");
    assert_eq!(tracked, 4);

    let conn = db.conn_for_test().await;
    let raw: i64 = conn
        .prepare("SELECT COUNT(*) FROM profile_views WHERE profile_id = 'P1'")
        .unwrap()
        .query_row([], |row| row.get(0))
        .unwrap();
    assert_eq!(raw, 4);

    let (page_views, daily): (i64, i64) = conn
        .prepare(
            "SELECT s.page_views, d.views
             FROM sessions s, daily_stats d
             WHERE s.session_id = 'batch' AND d.profile_id = 'P1'",
        )
        .unwrap()
        .query_row([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap();
    assert_eq!(page_views, 4);
    assert_eq!(daily, 4);
}

#[tokio::test]
async fn end_session_is_idempotent_and_reports_unknown_ids() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let at = t0();
    db.insert_view(&sample_view("P1", "to-end", at), None)
        .await
        .expect("view");

    let close_at = at + Duration::seconds(45);
    assert!(db.end_session("to-end", close_at).await.expect("end"));

    let first: Option<i64> = {
        let conn = db.conn_for_test().await;
        conn.prepare("SELECT duration_seconds FROM sessions WHERE session_id = 'to-end'")
            .unwrap()
            .query_row([], |row| row.get(0))
            .unwrap()
    };
    assert_eq!(first, Some(45));

    // Second close much later must not move the end time.
    assert!(db
        .end_session("to-end", close_at + Duration::seconds(600))
        .await
        .expect("end again"));
    let second: Option<i64> = {
        let conn = db.conn_for_test().await;
        conn.prepare("SELECT duration_seconds FROM sessions WHERE session_id = 'to-end'")
            .unwrap()
            .query_row([], |row| row.get(0))
            .unwrap()
    };
    assert_eq!(second, Some(45));

    assert!(!db.end_session("never-seen", close_at).await.expect("unknown"));
}

#[tokio::test]
async fn get_session_round_trips_fields() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let at = t0();
    db.insert_view(&sample_view("P9", "readback", at), None)
        .await
        .expect("view");

    let session = db
        .get_session("readback")
        .await
        .expect("query")
        .expect("present");
    assert_eq!(session.profile_id, "P9");
    assert_eq!(session.page_views, 1);
    assert_eq!(session.country.as_deref(), Some("PL"));
    assert!(session.ended_at.is_none());

    assert!(db.get_session("missing").await.expect("query").is_none());
}

#[tokio::test]
async fn realtime_snapshot_counts_open_recent_sessions() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let now = Utc::now();

    // Open session from 2 minutes ago: active. Open session from an hour
    // ago: outside the 5-minute window. Click 10 seconds ago: opens a third
    // session, active and within the 60-second click window.
    db.insert_view(
        &sample_view("P1", "active", now - Duration::minutes(2)),
        None,
    )
    .await
    .expect("active view");
    db.insert_view(&sample_view("P1", "stale", now - Duration::hours(1)), None)
        .await
        .expect("stale view");
    db.insert_click(
        &sample_click("P1", "clicker", 0, now - Duration::seconds(10)),
        None,
    )
    .await
    .expect("recent click");

    let snapshot = db.realtime_snapshot("P1", now).await.expect("snapshot");
    assert_eq!(snapshot.active_users, 2);
    assert_eq!(snapshot.recent_views, 0);
    assert_eq!(snapshot.recent_clicks, 1);
}
