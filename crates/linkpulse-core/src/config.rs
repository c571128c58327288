use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    pub geoip_path: String,
    pub cors_origins: Vec<String>,
    /// TTL for cached analytics reports, in seconds.
    pub cache_ttl_secs: u64,
    pub retention_views_days: u32,
    pub retention_clicks_days: u32,
    pub retention_sessions_days: u32,
    pub heartbeat_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max: usize,
    /// Base URL of the on-chain profile store adapter.
    pub chain_url: String,
    /// When true, ingest probes the chain for profile existence before
    /// accepting an event. Probe failures are treated as unknown and the
    /// event is accepted anyway.
    pub profile_check: bool,
    /// DuckDB memory limit passed to `SET memory_limit = '...'` at open.
    /// Accepts any DuckDB size string: `"512MB"`, `"1GB"`, `"4GB"`, etc.
    pub duckdb_memory_limit: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            host: std::env::var("LINKPULSE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("LINKPULSE_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("LINKPULSE_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            geoip_path: std::env::var("LINKPULSE_GEOIP_PATH")
                .unwrap_or_else(|_| "./GeoLite2-City.mmdb".to_string()),
            cors_origins: std::env::var("LINKPULSE_CORS_ORIGINS")
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            cache_ttl_secs: std::env::var("LINKPULSE_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .unwrap_or(3600),
            retention_views_days: std::env::var("LINKPULSE_RETENTION_VIEWS_DAYS")
                .unwrap_or_else(|_| "365".to_string())
                .parse()
                .unwrap_or(365),
            retention_clicks_days: std::env::var("LINKPULSE_RETENTION_CLICKS_DAYS")
                .unwrap_or_else(|_| "365".to_string())
                .parse()
                .unwrap_or(365),
            retention_sessions_days: std::env::var("LINKPULSE_RETENTION_SESSIONS_DAYS")
                .unwrap_or_else(|_| "90".to_string())
                .parse()
                .unwrap_or(90),
            heartbeat_secs: std::env::var("LINKPULSE_HEARTBEAT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            rate_limit_window_secs: std::env::var("LINKPULSE_RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            rate_limit_max: std::env::var("LINKPULSE_RATE_LIMIT_MAX")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
            chain_url: std::env::var("LINKPULSE_CHAIN_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string()),
            profile_check: std::env::var("LINKPULSE_PROFILE_CHECK")
                .map(|v| v == "true")
                .unwrap_or(false),
            duckdb_memory_limit: std::env::var("LINKPULSE_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

impl Default for Config {
    /// Defaults used by tests; identical to `from_env` with no variables set,
    /// except the profile check is off and the chain URL points at localhost.
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            data_dir: "./data".to_string(),
            geoip_path: "./GeoLite2-City.mmdb".to_string(),
            cors_origins: Vec::new(),
            cache_ttl_secs: 3600,
            retention_views_days: 365,
            retention_clicks_days: 365,
            retention_sessions_days: 90,
            heartbeat_secs: 30,
            rate_limit_window_secs: 60,
            rate_limit_max: 120,
            chain_url: "http://127.0.0.1:9000".to_string(),
            profile_check: false,
            duckdb_memory_limit: "1GB".to_string(),
        }
    }
}
