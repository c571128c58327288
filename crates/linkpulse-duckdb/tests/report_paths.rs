mod common;

use chrono::{Duration, Utc};

use common::{sample_click, sample_view, t0};
use linkpulse_core::timerange::Period;
use linkpulse_duckdb::DuckDbBackend;

#[tokio::test]
async fn empty_range_yields_zero_totals_and_empty_breakdowns() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let start = t0();
    let end = start + Duration::hours(1);

    let totals = db.range_totals("P1", start, end).await.expect("totals");
    assert_eq!(totals.views, 0);
    assert_eq!(totals.clicks, 0);
    assert_eq!(totals.unique_views, 0);

    assert!(db
        .timeseries_rows("P1", start, end, Period::Hour)
        .await
        .expect("timeseries")
        .is_empty());
    assert!(db
        .geo_rows("P1", start, end, Some(10))
        .await
        .expect("geo")
        .is_empty());
    assert!(db
        .link_group_rows("P1", start, end)
        .await
        .expect("links")
        .is_empty());
}

#[tokio::test]
async fn totals_count_distinct_sessions_only_when_present() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let at = t0();

    db.insert_view(&sample_view("P1", "s1", at), None)
        .await
        .expect("view");
    db.insert_view(&sample_view("P1", "s1", at + Duration::seconds(1)), None)
        .await
        .expect("view");
    let mut anon = sample_view("P1", "ignored", at + Duration::seconds(2));
    anon.session_id = None;
    db.insert_view(&anon, None).await.expect("view");

    let totals = db
        .range_totals("P1", at - Duration::seconds(1), at + Duration::minutes(1))
        .await
        .expect("totals");
    assert_eq!(totals.views, 3);
    assert_eq!(totals.unique_views, 1, "null session ids are not distinct values");
}

#[tokio::test]
async fn timeseries_merges_views_and_clicks_per_bucket() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let base = (Utc::now() - Duration::days(1))
        .date_naive()
        .and_hms_opt(10, 0, 0)
        .unwrap()
        .and_utc();

    db.insert_view(&sample_view("P1", "a", base), None)
        .await
        .expect("view");
    db.insert_view(
        &sample_view("P1", "a", base + Duration::minutes(10)),
        None,
    )
    .await
    .expect("view");
    db.insert_click(
        &sample_click("P1", "a", 0, base + Duration::minutes(20)),
        None,
    )
    .await
    .expect("click");
    // Next hour: click only, so the bucket exists with zero views.
    db.insert_click(
        &sample_click("P1", "a", 0, base + Duration::minutes(70)),
        None,
    )
    .await
    .expect("click");

    let rows = db
        .timeseries_rows(
            "P1",
            base - Duration::minutes(1),
            base + Duration::hours(2),
            Period::Hour,
        )
        .await
        .expect("timeseries");
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].1, rows[0].2), (2, 1));
    assert_eq!((rows[1].1, rows[1].2), (0, 1), "click-only bucket defaults views to 0");
    assert!(rows[0].0 < rows[1].0, "buckets are chronological");
}

#[tokio::test]
async fn link_groups_order_by_clicks_desc() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let at = t0();

    for i in 0..5 {
        let mut click = sample_click("P1", "s", 0, at + Duration::seconds(i));
        click.link_title = Some("A".to_string());
        db.insert_click(&click, None).await.expect("click");
    }
    for i in 0..2 {
        let mut click = sample_click("P1", "s", 1, at + Duration::seconds(10 + i));
        click.link_title = Some("B".to_string());
        db.insert_click(&click, None).await.expect("click");
    }

    let groups = db
        .link_group_rows("P1", at - Duration::seconds(1), at + Duration::minutes(5))
        .await
        .expect("groups");
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].link_title, "A");
    assert_eq!(groups[0].clicks, 5);
    assert_eq!(groups[1].link_title, "B");
    assert_eq!(groups[1].clicks, 2);
}

#[tokio::test]
async fn dimension_views_never_exceed_total_views() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let at = t0();

    for (i, country) in ["PL", "PL", "DE"].iter().enumerate() {
        let mut view = sample_view("P1", &format!("s{i}"), at + Duration::seconds(i as i64));
        view.country = Some(country.to_string());
        db.insert_view(&view, None).await.expect("view");
    }

    let start = at - Duration::seconds(1);
    let end = at + Duration::minutes(1);
    let totals = db.range_totals("P1", start, end).await.expect("totals");
    let geo = db.geo_rows("P1", start, end, Some(10)).await.expect("geo");
    let device = db.device_rows("P1", start, end, None).await.expect("device");
    let referrer = db
        .referrer_rows("P1", start, end, Some(10))
        .await
        .expect("referrer");

    for row in geo.iter().chain(device.iter()).chain(referrer.iter()) {
        assert!(row.views <= totals.views);
    }
    assert_eq!(geo.iter().map(|r| r.views).sum::<i64>(), totals.views);
}

#[tokio::test]
async fn raw_and_rollup_reads_agree_for_a_closed_day() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let day = Utc::now().date_naive() - Duration::days(2);
    let base = day.and_hms_opt(11, 0, 0).unwrap().and_utc();

    for i in 0..6 {
        let mut view = sample_view("P1", "sx", base + Duration::seconds(i));
        view.referrer = Some("https://twitter.com/x".to_string());
        db.insert_view(&view, None).await.expect("view");
    }
    for i in 0..3 {
        db.insert_click(
            &sample_click("P1", "sy", 2, base + Duration::seconds(60 + i)),
            None,
        )
        .await
        .expect("click");
    }
    db.rollup_profile_day("P1", day).await.expect("rollup");

    let start = base - Duration::hours(11);
    let end = start + Duration::days(1);
    let raw_totals = db.range_totals("P1", start, end).await.expect("raw totals");
    let rolled_totals = db.rollup_totals("P1", day, day).await.expect("rollup totals");
    assert_eq!(raw_totals, rolled_totals);

    let raw_geo = db.geo_rows("P1", start, end, Some(10)).await.expect("raw geo");
    let rolled_geo = db.rollup_geo_rows("P1", day, day, 10).await.expect("rollup geo");
    assert_eq!(raw_geo, rolled_geo);

    let raw_device = db.device_rows("P1", start, end, None).await.expect("raw device");
    let rolled_device = db.rollup_device_rows("P1", day, day).await.expect("rollup device");
    assert_eq!(raw_device, rolled_device);

    let raw_referrer = db
        .referrer_rows("P1", start, end, Some(10))
        .await
        .expect("raw referrer");
    let rolled_referrer = db
        .rollup_referrer_rows("P1", day, day, 10)
        .await
        .expect("rollup referrer");
    assert_eq!(raw_referrer, rolled_referrer);

    let raw_links = db.link_group_rows("P1", start, end).await.expect("raw links");
    let rolled_links = db.rollup_link_rows("P1", day, day).await.expect("rollup links");
    assert_eq!(raw_links, rolled_links);
}
