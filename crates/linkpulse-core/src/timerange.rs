use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Bucket granularity for the report time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Hour,
    Day,
    Week,
    Month,
}

impl Period {
    /// The `date_trunc` unit this period maps to.
    pub fn trunc_unit(&self) -> &'static str {
        match self {
            Period::Hour => "hour",
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
        }
    }

    /// Format a bucket timestamp into its wire label.
    ///
    /// `hour -> YYYY-MM-DD HH:00`, `day -> YYYY-MM-DD`, `week -> YYYY-Wnn`
    /// (ISO week), `month -> YYYY-MM`.
    pub fn bucket_label(&self, bucket: NaiveDateTime) -> String {
        match self {
            Period::Hour => bucket.format("%Y-%m-%d %H:00").to_string(),
            Period::Day => bucket.format("%Y-%m-%d").to_string(),
            Period::Week => {
                let iso = bucket.date().iso_week();
                format!("{:04}-W{:02}", iso.year(), iso.week())
            }
            Period::Month => bucket.format("%Y-%m").to_string(),
        }
    }

    /// Label for a whole-day bucket, used when composing from daily rollups.
    pub fn day_label(&self, day: NaiveDate) -> String {
        self.bucket_label(day.and_hms_opt(0, 0, 0).unwrap_or_default())
    }
}

/// A half-open query range `[start, end)` with a bucket granularity.
#[derive(Debug, Clone, Copy)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period: Period,
}

impl TimeRange {
    /// Build a range from one of the preset period strings
    /// (`7d | 30d | 90d | 1y`), ending now.
    pub fn from_preset(preset: &str, now: DateTime<Utc>) -> Option<Self> {
        let days = match preset {
            "7d" => 7,
            "30d" => 30,
            "90d" => 90,
            "1y" => 365,
            _ => return None,
        };
        let start = now - Duration::days(days);
        Some(Self {
            start,
            end: now,
            period: auto_period(start, now),
        })
    }

    /// Build a range from explicit epoch-millisecond bounds.
    pub fn from_millis(start_ms: i64, end_ms: i64) -> Option<Self> {
        let start = Utc.timestamp_millis_opt(start_ms).single()?;
        let end = Utc.timestamp_millis_opt(end_ms).single()?;
        if end < start {
            return None;
        }
        Some(Self {
            start,
            end,
            period: auto_period(start, end),
        })
    }

    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

/// Pick a bucket granularity from the span of the range: up to two days
/// hourly, up to 60 days daily, up to ~half a year weekly, monthly beyond.
pub fn auto_period(start: DateTime<Utc>, end: DateTime<Utc>) -> Period {
    let days = (end - start).num_days();
    if days <= 2 {
        Period::Hour
    } else if days <= 60 {
        Period::Day
    } else if days <= 182 {
        Period::Week
    } else {
        Period::Month
    }
}

/// Midnight-UTC truncation of a timestamp. All `date` columns hold this.
pub fn utc_date(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

/// Today's midnight UTC; ranges ending strictly before this are closed and
/// eligible for the rollup-substituted query path.
pub fn today_midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}
