/// DuckDB initialization SQL.
///
/// Executed once at open time via `Connection::execute_batch`. Every
/// statement uses `IF NOT EXISTS` so the batch is idempotent across restarts.
///
/// `memory_limit` comes from `Config.duckdb_memory_limit`
/// (env `LINKPULSE_DUCKDB_MEMORY`, default `"1GB"`). An explicit limit is
/// always set; the DuckDB default of 80% of system RAM is not acceptable for
/// a server process. `threads = 2` keeps the background pool small for
/// single-writer embedded use.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- RAW EVENTS
-- ===========================================
CREATE TABLE IF NOT EXISTS profile_views (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    profile_id      VARCHAR NOT NULL,
    session_id      VARCHAR,
    visitor_ip      VARCHAR,
    user_agent      VARCHAR,
    referrer        VARCHAR,
    country         VARCHAR,
    region          VARCHAR,
    city            VARCHAR,
    device_type     VARCHAR,                       -- 'desktop' | 'mobile' | 'tablet'
    browser         VARCHAR,
    os              VARCHAR,
    created_at      TIMESTAMP NOT NULL
);
-- Primary query pattern: profile + time range
CREATE INDEX IF NOT EXISTS idx_views_profile_time
    ON profile_views(profile_id, created_at);

CREATE TABLE IF NOT EXISTS link_clicks (
    id              VARCHAR PRIMARY KEY,
    profile_id      VARCHAR NOT NULL,
    link_index      INTEGER NOT NULL,
    link_title      VARCHAR,
    link_url        VARCHAR,
    session_id      VARCHAR,
    visitor_ip      VARCHAR,
    user_agent      VARCHAR,
    referrer        VARCHAR,
    country         VARCHAR,
    region          VARCHAR,
    city            VARCHAR,
    device_type     VARCHAR,
    browser         VARCHAR,
    os              VARCHAR,
    created_at      TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_clicks_profile_time
    ON link_clicks(profile_id, created_at);

-- ===========================================
-- SESSIONS (derived, updated on each event)
-- ===========================================
-- Upserts key on session_id; the connection mutex serialises competing
-- writers, so final page_views/link_clicks equal the number of committed
-- events regardless of arrival order.
CREATE TABLE IF NOT EXISTS sessions (
    session_id       VARCHAR PRIMARY KEY,
    profile_id       VARCHAR NOT NULL,
    visitor_ip       VARCHAR,
    user_agent       VARCHAR,
    country          VARCHAR,
    region           VARCHAR,
    city             VARCHAR,
    device_type      VARCHAR,
    browser          VARCHAR,
    os               VARCHAR,
    started_at       TIMESTAMP NOT NULL,
    ended_at         TIMESTAMP,                    -- NULL until a second event or explicit end
    duration_seconds BIGINT,                       -- ended_at - started_at, whole seconds
    page_views       INTEGER NOT NULL DEFAULT 1,
    link_clicks      INTEGER NOT NULL DEFAULT 0
);
-- Active-users query: open sessions started recently
CREATE INDEX IF NOT EXISTS idx_sessions_profile_started
    ON sessions(profile_id, started_at);
-- Orphan closure scans ended_at IS NULL
CREATE INDEX IF NOT EXISTS idx_sessions_ended
    ON sessions(ended_at);

-- ===========================================
-- ROLLUPS (written by the aggregator; ingest increments the
-- view/click counters of daily_stats and link_stats as hints)
-- ===========================================
CREATE TABLE IF NOT EXISTS daily_stats (
    profile_id      VARCHAR NOT NULL,
    date            DATE NOT NULL,                 -- midnight-UTC truncation
    views           BIGINT NOT NULL DEFAULT 0,
    unique_views    BIGINT NOT NULL DEFAULT 0,
    clicks          BIGINT NOT NULL DEFAULT 0,
    unique_clicks   BIGINT NOT NULL DEFAULT 0,
    sessions        BIGINT NOT NULL DEFAULT 0,
    avg_duration    DOUBLE,                        -- NULL until sessions carry durations
    bounce_rate     DOUBLE NOT NULL DEFAULT 0,
    PRIMARY KEY (profile_id, date)
);
CREATE INDEX IF NOT EXISTS idx_daily_stats_profile_date
    ON daily_stats(profile_id, date);

CREATE TABLE IF NOT EXISTS link_stats (
    profile_id      VARCHAR NOT NULL,
    link_index      INTEGER NOT NULL,
    date            DATE NOT NULL,
    link_title      VARCHAR NOT NULL DEFAULT 'Untitled',
    link_url        VARCHAR NOT NULL DEFAULT '',
    clicks          BIGINT NOT NULL DEFAULT 0,
    unique_clicks   BIGINT NOT NULL DEFAULT 0,
    ctr             DOUBLE NOT NULL DEFAULT 0,
    PRIMARY KEY (profile_id, link_index, date)
);
CREATE INDEX IF NOT EXISTS idx_link_stats_profile_date
    ON link_stats(profile_id, date);

CREATE TABLE IF NOT EXISTS geo_stats (
    profile_id      VARCHAR NOT NULL,
    country         VARCHAR NOT NULL,
    city            VARCHAR NOT NULL DEFAULT '',
    date            DATE NOT NULL,
    region          VARCHAR,
    views           BIGINT NOT NULL DEFAULT 0,
    clicks          BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (profile_id, country, city, date)
);
CREATE INDEX IF NOT EXISTS idx_geo_stats_profile_date
    ON geo_stats(profile_id, date);

CREATE TABLE IF NOT EXISTS device_stats (
    profile_id      VARCHAR NOT NULL,
    device_type     VARCHAR NOT NULL DEFAULT '',
    browser         VARCHAR NOT NULL DEFAULT '',
    os              VARCHAR NOT NULL DEFAULT '',
    date            DATE NOT NULL,
    views           BIGINT NOT NULL DEFAULT 0,
    clicks          BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (profile_id, device_type, browser, os, date)
);
CREATE INDEX IF NOT EXISTS idx_device_stats_profile_date
    ON device_stats(profile_id, date);

CREATE TABLE IF NOT EXISTS referrer_stats (
    profile_id      VARCHAR NOT NULL,
    referrer        VARCHAR NOT NULL,              -- full raw string; '' for direct
    date            DATE NOT NULL,
    referrer_type   VARCHAR NOT NULL,              -- 'search' | 'social' | 'direct' | 'other'
    views           BIGINT NOT NULL DEFAULT 0,
    clicks          BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (profile_id, referrer, date)
);
CREATE INDEX IF NOT EXISTS idx_referrer_stats_profile_date
    ON referrer_stats(profile_id, date);

-- ===========================================
-- ANALYTICS CACHE (memoized rendered reports)
-- ===========================================
CREATE TABLE IF NOT EXISTS analytics_cache (
    cache_key       VARCHAR PRIMARY KEY,
    payload         VARCHAR NOT NULL,              -- JSON-serialized report
    expires_at      TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_expires
    ON analytics_cache(expires_at);

-- ===========================================
-- REALTIME EVENT BUS (durable notification rows)
-- ===========================================
-- Written inside the ingest transaction; marked processed after the
-- in-process fan-out. Swept by retention once processed.
CREATE TABLE IF NOT EXISTS realtime_events (
    id              VARCHAR PRIMARY KEY,
    profile_id      VARCHAR NOT NULL,
    kind            VARCHAR NOT NULL,              -- 'view' | 'click'
    payload         VARCHAR NOT NULL,              -- JSON
    created_at      TIMESTAMP NOT NULL,
    processed       BOOLEAN NOT NULL DEFAULT false
);
CREATE INDEX IF NOT EXISTS idx_realtime_events_processed
    ON realtime_events(processed, created_at);
"#
    )
}
