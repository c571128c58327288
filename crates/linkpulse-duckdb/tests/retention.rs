mod common;

use chrono::{Duration, Utc};

use common::{sample_click, sample_view};
use linkpulse_duckdb::DuckDbBackend;

#[tokio::test]
async fn old_raw_rows_are_deleted_and_recent_ones_kept() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let now = Utc::now();

    db.insert_view(&sample_view("P1", "old", now - Duration::days(400)), None)
        .await
        .expect("old view");
    db.insert_view(&sample_view("P1", "new", now - Duration::days(2)), None)
        .await
        .expect("new view");
    db.insert_click(
        &sample_click("P1", "old", 0, now - Duration::days(400)),
        None,
    )
    .await
    .expect("old click");

    let cutoff = now - Duration::days(365);
    assert_eq!(db.delete_views_before(cutoff).await.expect("views"), 1);
    assert_eq!(db.delete_clicks_before(cutoff).await.expect("clicks"), 1);

    let conn = db.conn_for_test().await;
    let remaining: i64 = conn
        .prepare("SELECT COUNT(*) FROM profile_views")
        .unwrap()
        .query_row([], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn orphan_sessions_are_closed_with_backdated_end() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let now = Utc::now();

    db.insert_view(&sample_view("P1", "orphan", now - Duration::hours(30)), None)
        .await
        .expect("orphan view");
    db.insert_view(&sample_view("P1", "live", now - Duration::minutes(10)), None)
        .await
        .expect("live view");

    let closed = db.close_orphan_sessions(now).await.expect("close");
    assert_eq!(closed, 1);

    let conn = db.conn_for_test().await;
    let duration: Option<i64> = conn
        .prepare("SELECT duration_seconds FROM sessions WHERE session_id = 'orphan'")
        .unwrap()
        .query_row([], |row| row.get(0))
        .unwrap();
    // ended_at = now - 24h, started_at = now - 30h: six hours of credit.
    assert_eq!(duration, Some(6 * 3600));

    let live_end: Option<String> = conn
        .prepare("SELECT CAST(ended_at AS VARCHAR) FROM sessions WHERE session_id = 'live'")
        .unwrap()
        .query_row([], |row| row.get(0))
        .unwrap();
    assert!(live_end.is_none(), "recent open sessions stay open");
}

#[tokio::test]
async fn rollup_rows_older_than_two_years_are_swept() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let old_day = Utc::now().date_naive() - Duration::days(800);
    let fresh_day = Utc::now().date_naive() - Duration::days(3);

    for day in [old_day, fresh_day] {
        let base = day.and_hms_opt(12, 0, 0).unwrap().and_utc();
        db.insert_view(&sample_view("P1", &format!("s-{day}"), base), None)
            .await
            .expect("view");
        db.rollup_profile_day("P1", day).await.expect("rollup");
    }

    let cutoff = Utc::now().date_naive() - Duration::days(730);
    let removed = db.delete_rollups_before(cutoff).await.expect("sweep");
    assert!(removed >= 1);

    let conn = db.conn_for_test().await;
    let days: Vec<String> = conn
        .prepare("SELECT CAST(date AS VARCHAR) FROM daily_stats ORDER BY date")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(days, vec![fresh_day.format("%Y-%m-%d").to_string()]);
}

#[tokio::test]
async fn cache_honors_ttl_and_sweep() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let now = Utc::now();

    db.cache_put("analytics:P1:0:1", "{\"a\":1}", now + Duration::seconds(60))
        .await
        .expect("put");
    db.cache_put("analytics:P1:0:2", "{\"b\":2}", now - Duration::seconds(1))
        .await
        .expect("put expired");

    assert_eq!(
        db.cache_get("analytics:P1:0:1", now).await.expect("get"),
        Some("{\"a\":1}".to_string())
    );
    assert_eq!(
        db.cache_get("analytics:P1:0:2", now).await.expect("get"),
        None,
        "expired entries read as misses"
    );

    // Replacing an entry keeps the key unique.
    db.cache_put("analytics:P1:0:1", "{\"a\":9}", now + Duration::seconds(60))
        .await
        .expect("replace");
    assert_eq!(
        db.cache_get("analytics:P1:0:1", now).await.expect("get"),
        Some("{\"a\":9}".to_string())
    );

    assert_eq!(db.cache_sweep(now).await.expect("sweep"), 1);
}

#[tokio::test]
async fn processed_bus_rows_are_swept_unprocessed_kept() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let now = Utc::now();
    let old = now - Duration::days(2);

    let view = sample_view("P1", "bus", old);
    let bus = linkpulse_core::event::RealtimeEventRow {
        id: "bus-1".to_string(),
        profile_id: "P1".to_string(),
        kind: "view".to_string(),
        payload: "{}".to_string(),
        created_at: old,
    };
    db.insert_view(&view, Some(&bus)).await.expect("insert");

    // Unprocessed rows survive the sweep.
    assert_eq!(
        db.delete_processed_realtime_before(now - Duration::hours(24))
            .await
            .expect("sweep"),
        0
    );

    db.mark_realtime_processed(&["bus-1".to_string()])
        .await
        .expect("mark");
    assert_eq!(
        db.delete_processed_realtime_before(now - Duration::hours(24))
            .await
            .expect("sweep"),
        1
    );
}
