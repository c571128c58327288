use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use linkpulse_core::config::Config;
use linkpulse_duckdb::DuckDbBackend;

use crate::chain::ChainAdapter;
use crate::enrich::Enricher;
use crate::realtime::RealtimeHub;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
///
/// Everything is constructed once at startup and passed in explicitly; the
/// only process-wide mutable state is the realtime subscriber map (inside
/// [`RealtimeHub`]) and the rate-limiter window map, both mutex-guarded.
pub struct AppState {
    pub db: Arc<DuckDbBackend>,
    pub config: Arc<Config>,
    pub enricher: Arc<Enricher>,
    pub chain: Arc<dyn ChainAdapter>,
    pub hub: Arc<RealtimeHub>,

    /// Per-IP sliding-window rate limiter for the track endpoints.
    rate_limiter: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl AppState {
    pub fn new(
        db: DuckDbBackend,
        config: Config,
        enricher: Enricher,
        chain: Arc<dyn ChainAdapter>,
    ) -> Self {
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
            enricher: Arc::new(enricher),
            chain,
            hub: Arc::new(RealtimeHub::new()),
            rate_limiter: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `ip` is within the configured ingest rate limit.
    ///
    /// Stale timestamps are evicted on every check and empty windows removed
    /// entirely, so the map does not grow unboundedly for long-tail IPs.
    pub async fn check_rate_limit(&self, ip: &str) -> bool {
        let window = self.config.rate_limit_window();
        let max = self.config.rate_limit_max;
        let mut map = self.rate_limiter.lock().await;
        let cutoff = Instant::now() - window;
        if let Some(entries) = map.get_mut(ip) {
            while entries.front().is_some_and(|t| *t < cutoff) {
                entries.pop_front();
            }
            if entries.is_empty() {
                map.remove(ip);
            }
        }
        let entries = map.entry(ip.to_string()).or_default();
        if entries.len() >= max {
            return false;
        }
        entries.push_back(Instant::now());
        true
    }
}

pub type SharedState = Arc<AppState>;
