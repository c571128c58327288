use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::debug;

use linkpulse_core::referrer::{classify_referrer, display_referrer};
use linkpulse_core::report::{
    AnalyticsReport, DeviceEntry, GeoEntry, LinkPerformance, ReferrerEntry, TimeSeriesPoint,
    TopLink,
};
use linkpulse_core::timerange::{today_midnight_utc, utc_date, Period, TimeRange};
use linkpulse_duckdb::queries::report::{DimensionRow, LinkGroupRow, RangeTotals};

use crate::state::AppState;

/// How many geographic and referrer rows a report carries.
const TOP_N: i64 = 10;

/// Compose (or fetch from cache) the analytics report for a profile/range.
///
/// Closed, day-aligned ranges are served from the rollup tables; everything
/// else reads the raw tables. The two paths are value-identical for the same
/// range, which the integration tests assert.
pub async fn get_analytics(
    state: &AppState,
    profile_id: &str,
    range: TimeRange,
) -> Result<AnalyticsReport> {
    let now = Utc::now();
    let key = format!(
        "analytics:{}:{}:{}",
        profile_id,
        range.start_millis(),
        range.end_millis()
    );

    // Cache errors degrade to a miss; they never fail the request.
    match state.db.cache_get(&key, now).await {
        Ok(Some(payload)) => {
            if let Ok(report) = serde_json::from_str::<AnalyticsReport>(&payload) {
                return Ok(report);
            }
        }
        Ok(None) => {}
        Err(e) => debug!(error = %e, "Analytics cache read failed; treating as miss"),
    }

    let report = if can_use_rollups(&range, now) && rollups_cover(state, profile_id, &range).await {
        compose_from_rollups(state, profile_id, range).await?
    } else {
        compose_from_raw(state, profile_id, range).await?
    };

    if let Ok(payload) = serde_json::to_string(&report) {
        let expires_at = now + Duration::seconds(state.config.cache_ttl_secs as i64);
        if let Err(e) = state.db.cache_put(&key, &payload, expires_at).await {
            debug!(error = %e, "Analytics cache write failed");
        }
    }

    Ok(report)
}

/// The rollup substitution is only safe when every day in the range is
/// closed and the range maps exactly onto whole days: both bounds at
/// midnight UTC, the range ending before today, and a bucket granularity
/// that daily rows can compose (hourly cannot).
fn can_use_rollups(range: &TimeRange, now: DateTime<Utc>) -> bool {
    let midnight = today_midnight_utc(now);
    range.period != Period::Hour
        && range.end <= midnight
        && is_midnight(range.start)
        && is_midnight(range.end)
}

fn is_midnight(ts: DateTime<Utc>) -> bool {
    ts == today_midnight_utc(ts)
}

/// A closed range can still contain days the aggregator has not processed
/// (it runs at 02:00 UTC, and the service may have been down). Those days
/// only carry ingest counter hints, so the raw path must serve them. On a
/// check failure the raw path is the safe answer.
async fn rollups_cover(state: &AppState, profile_id: &str, range: &TimeRange) -> bool {
    let first_day = utc_date(range.start);
    let last_day = utc_date(range.end - Duration::days(1));
    match state
        .db
        .has_unaggregated_days(profile_id, first_day, last_day)
        .await
    {
        Ok(unaggregated) => !unaggregated,
        Err(e) => {
            debug!(error = %e, "Rollup coverage check failed; using raw path");
            false
        }
    }
}

/// Raw path: concurrent sub-queries over the event tables.
pub async fn compose_from_raw(
    state: &AppState,
    profile_id: &str,
    range: TimeRange,
) -> Result<AnalyticsReport> {
    let db = &state.db;
    let (start, end) = (range.start, range.end);
    let (totals, ts_rows, geo, device, referrer, links) = tokio::join!(
        db.range_totals(profile_id, start, end),
        db.timeseries_rows(profile_id, start, end, range.period),
        db.geo_rows(profile_id, start, end, Some(TOP_N)),
        db.device_rows(profile_id, start, end, None),
        db.referrer_rows(profile_id, start, end, Some(TOP_N)),
        db.link_group_rows(profile_id, start, end),
    );
    let totals = totals?;

    let mut series = BTreeMap::new();
    for (bucket, views, clicks) in ts_rows? {
        if let Some(ts) = parse_bucket(&bucket) {
            let label = range.period.bucket_label(ts);
            let entry = series.entry(label).or_insert((0, 0));
            entry.0 += views;
            entry.1 += clicks;
        }
    }

    Ok(build_report(
        totals,
        series,
        geo?,
        device?,
        referrer?,
        links?,
    ))
}

/// Shortcut path: the same report composed from the rollup tables.
pub async fn compose_from_rollups(
    state: &AppState,
    profile_id: &str,
    range: TimeRange,
) -> Result<AnalyticsReport> {
    let db = &state.db;
    let first_day = utc_date(range.start);
    // `end` is exclusive and midnight-aligned, so the last covered day is
    // the one before it.
    let last_day = utc_date(range.end - Duration::days(1));

    let (totals, daily, geo, device, referrer, links) = tokio::join!(
        db.rollup_totals(profile_id, first_day, last_day),
        db.rollup_daily_rows(profile_id, first_day, last_day),
        db.rollup_geo_rows(profile_id, first_day, last_day, TOP_N),
        db.rollup_device_rows(profile_id, first_day, last_day),
        db.rollup_referrer_rows(profile_id, first_day, last_day, TOP_N),
        db.rollup_link_rows(profile_id, first_day, last_day),
    );
    let totals = totals?;

    let mut series = BTreeMap::new();
    for (day, views, clicks) in daily? {
        let label = range.period.day_label(day);
        let entry = series.entry(label).or_insert((0, 0));
        entry.0 += views;
        entry.1 += clicks;
    }

    Ok(build_report(
        totals,
        series,
        geo?,
        device?,
        referrer?,
        links?,
    ))
}

fn build_report(
    totals: RangeTotals,
    series: BTreeMap<String, (i64, i64)>,
    geo: Vec<DimensionRow>,
    device: Vec<DimensionRow>,
    referrer: Vec<DimensionRow>,
    links: Vec<LinkGroupRow>,
) -> AnalyticsReport {
    let time_series_data = series
        .into_iter()
        .map(|(date, (views, clicks))| TimeSeriesPoint {
            date,
            views,
            clicks,
        })
        .collect();

    let geographic_data = geo
        .into_iter()
        .map(|row| {
            let mut keys = row.keys.into_iter();
            GeoEntry {
                country: keys.next().unwrap_or_default(),
                city: keys.next().unwrap_or_default(),
                region: row.extra,
                views: row.views,
                clicks: row.clicks,
            }
        })
        .collect();

    let device_data = device
        .into_iter()
        .map(|row| {
            let mut keys = row.keys.into_iter();
            DeviceEntry {
                device_type: keys.next().unwrap_or_default(),
                browser: keys.next().unwrap_or_default(),
                os: keys.next().unwrap_or_default(),
                views: row.views,
                clicks: row.clicks,
            }
        })
        .collect();

    let referrer_data = referrer
        .into_iter()
        .map(|row| {
            let raw = row.keys.into_iter().next().unwrap_or_default();
            ReferrerEntry {
                referrer_type: classify_referrer(&raw).as_str().to_string(),
                referrer: display_referrer(&raw),
                views: row.views,
                clicks: row.clicks,
            }
        })
        .collect();

    let link_performance: Vec<LinkPerformance> = links
        .into_iter()
        .map(|group| {
            let ctr = if totals.views == 0 {
                0.0
            } else {
                100.0 * group.clicks as f64 / totals.views as f64
            };
            LinkPerformance {
                link_index: group.link_index,
                link_title: group.link_title,
                link_url: group.link_url,
                clicks: group.clicks,
                unique_clicks: group.unique_clicks,
                ctr,
            }
        })
        .collect();

    // Link groups arrive ordered by clicks descending, so the top link is
    // the head of the list.
    let top_link = link_performance.first().map(|l| TopLink {
        link_index: l.link_index,
        title: l.link_title.clone(),
        url: l.link_url.clone(),
        clicks: l.clicks,
    });

    let total_links = link_performance.len() as i64;
    let average_clicks_per_link = if total_links == 0 {
        0.0
    } else {
        totals.clicks as f64 / total_links as f64
    };

    AnalyticsReport {
        profile_views: totals.views,
        unique_views: totals.unique_views,
        total_clicks: totals.clicks,
        unique_clicks: totals.unique_clicks,
        total_links,
        average_clicks_per_link,
        top_link,
        time_series_data,
        geographic_data,
        device_data,
        referrer_data,
        link_performance,
    }
}

/// Parse a `date_trunc` bucket read back as VARCHAR.
fn parse_bucket(bucket: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(bucket, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(bucket, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(bucket, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
