use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

/// Confirmed profile ids are remembered for this long so repeated ingests and
/// subscribes do not re-probe the chain.
const KNOWN_PROFILE_TTL: Duration = Duration::from_secs(60);

/// The authoritative profile object owned by the on-chain store. Only the
/// fields this service consumes are modeled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainProfile {
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub links: Vec<ChainLink>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub walrus_site_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLink {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// Adapter over the external on-chain profile store.
///
/// A transport failure is an error, never a "does not exist": callers that
/// gate on existence must treat `Err` as unknown and accept the event.
#[async_trait]
pub trait ChainAdapter: Send + Sync + 'static {
    async fn get_profile(&self, profile_id: &str) -> Result<Option<ChainProfile>>;

    async fn profile_exists(&self, profile_id: &str) -> Result<bool> {
        Ok(self.get_profile(profile_id).await?.is_some())
    }
}

/// HTTP adapter against the chain indexer, with a short positive cache of
/// known profile ids.
pub struct HttpChainAdapter {
    client: reqwest::Client,
    base_url: String,
    known: Mutex<HashMap<String, Instant>>,
}

impl HttpChainAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            known: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ChainAdapter for HttpChainAdapter {
    async fn get_profile(&self, profile_id: &str) -> Result<Option<ChainProfile>> {
        let url = format!("{}/profiles/{}", self.base_url, profile_id);
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let profile: ChainProfile = response.error_for_status()?.json().await?;
        Ok(Some(profile))
    }

    async fn profile_exists(&self, profile_id: &str) -> Result<bool> {
        {
            let mut known = self.known.lock().await;
            if let Some(confirmed_at) = known.get(profile_id) {
                if confirmed_at.elapsed() < KNOWN_PROFILE_TTL {
                    return Ok(true);
                }
                known.remove(profile_id);
            }
        }
        let exists = self.get_profile(profile_id).await?.is_some();
        if exists {
            let mut known = self.known.lock().await;
            known.insert(profile_id.to_string(), Instant::now());
        } else {
            debug!(profile_id, "Chain reports profile does not exist");
        }
        Ok(exists)
    }
}

/// Adapter that treats every profile as existing. Used when the chain probe
/// is disabled and by tests.
pub struct NullChainAdapter;

#[async_trait]
impl ChainAdapter for NullChainAdapter {
    async fn get_profile(&self, _profile_id: &str) -> Result<Option<ChainProfile>> {
        Ok(Some(ChainProfile::default()))
    }

    async fn profile_exists(&self, _profile_id: &str) -> Result<bool> {
        Ok(true)
    }
}
