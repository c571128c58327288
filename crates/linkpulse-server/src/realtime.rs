use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

use linkpulse_core::report::RealtimeSnapshot;

use crate::state::AppState;

/// Outbound queue depth per connection. A full queue drops the newest
/// message and flags the connection for disconnect; fan-out never blocks
/// ingest on a slow subscriber.
const SUBSCRIBER_QUEUE: usize = 64;

/// Cadence of the periodic `analytics:realtime` push to subscribed rooms.
const PUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Messages the server sends over a realtime connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "analytics:realtime", rename_all = "camelCase")]
    Realtime {
        profile_id: String,
        data: RealtimeSnapshot,
        timestamp: String,
    },
    #[serde(rename = "analytics:new_view", rename_all = "camelCase")]
    NewView {
        profile_id: String,
        data: serde_json::Value,
        timestamp: String,
    },
    #[serde(rename = "analytics:new_click", rename_all = "camelCase")]
    NewClick {
        profile_id: String,
        data: serde_json::Value,
        timestamp: String,
    },
    #[serde(rename = "pong")]
    Pong { timestamp: String },
    #[serde(rename = "heartbeat")]
    Heartbeat { timestamp: String, connections: usize },
    #[serde(rename = "error")]
    Error { message: String, code: String },
}

/// Messages a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "subscribe:profile", rename_all = "camelCase")]
    Subscribe { profile_id: String },
    #[serde(rename = "unsubscribe:profile", rename_all = "camelCase")]
    Unsubscribe { profile_id: String },
    #[serde(rename = "ping")]
    Ping,
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

struct HubInner {
    /// Every open realtime connection, keyed by connection id.
    connections: HashMap<u64, mpsc::Sender<ServerMessage>>,
    /// profileId -> subscribed connection ids.
    rooms: HashMap<String, HashMap<u64, mpsc::Sender<ServerMessage>>>,
}

/// The subscriber map behind the realtime fan-out.
///
/// The mutex guards structural changes and sender snapshots only; actual
/// sends run after the lock is released so a slow client can never stall
/// another task holding the map.
pub struct RealtimeHub {
    inner: Mutex<HubInner>,
    next_id: AtomicU64,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner {
                connections: HashMap::new(),
                rooms: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new connection and hand back its id plus the receiving end
    /// of its bounded outbound queue.
    pub async fn register_connection(&self) -> (u64, mpsc::Receiver<ServerMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        let mut inner = self.inner.lock().await;
        inner.connections.insert(id, tx);
        (id, rx)
    }

    /// Remove a connection from the map and from every room it joined.
    /// Dropping the last sender ends the connection's writer task.
    pub async fn drop_connection(&self, id: u64) {
        let mut inner = self.inner.lock().await;
        inner.connections.remove(&id);
        inner.rooms.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
    }

    /// Subscribe a connection to a profile room. Returns `false` if the
    /// connection is no longer registered.
    pub async fn subscribe(&self, profile_id: &str, id: u64) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(tx) = inner.connections.get(&id).cloned() else {
            return false;
        };
        inner
            .rooms
            .entry(profile_id.to_string())
            .or_default()
            .insert(id, tx);
        true
    }

    pub async fn unsubscribe(&self, profile_id: &str, id: u64) {
        let mut inner = self.inner.lock().await;
        if let Some(members) = inner.rooms.get_mut(profile_id) {
            members.remove(&id);
            if members.is_empty() {
                inner.rooms.remove(profile_id);
            }
        }
    }

    /// Send to a single connection; a full or closed queue disconnects it.
    pub async fn send_to(&self, id: u64, msg: ServerMessage) {
        let tx = {
            let inner = self.inner.lock().await;
            inner.connections.get(&id).cloned()
        };
        if let Some(tx) = tx {
            if tx.try_send(msg).is_err() {
                warn!(connection = id, "Realtime queue full or closed; disconnecting");
                self.drop_connection(id).await;
            }
        }
    }

    /// Fan a message out to every subscriber of a profile. Snapshot under the
    /// lock, send after release; lagging connections are dropped.
    pub async fn publish(&self, profile_id: &str, msg: ServerMessage) {
        let members: Vec<(u64, mpsc::Sender<ServerMessage>)> = {
            let inner = self.inner.lock().await;
            match inner.rooms.get(profile_id) {
                Some(members) => members.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => return,
            }
        };
        let mut lagging = Vec::new();
        for (id, tx) in members {
            if tx.try_send(msg.clone()).is_err() {
                lagging.push(id);
            }
        }
        for id in lagging {
            warn!(connection = id, profile_id, "Subscriber lagging; disconnecting");
            self.drop_connection(id).await;
        }
    }

    /// Send to every open connection (heartbeats).
    pub async fn broadcast(&self, msg: ServerMessage) {
        let members: Vec<(u64, mpsc::Sender<ServerMessage>)> = {
            let inner = self.inner.lock().await;
            inner
                .connections
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };
        let mut lagging = Vec::new();
        for (id, tx) in members {
            if tx.try_send(msg.clone()).is_err() {
                lagging.push(id);
            }
        }
        for id in lagging {
            self.drop_connection(id).await;
        }
    }

    pub async fn subscribed_profiles(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.rooms.keys().cloned().collect()
    }

    pub async fn connection_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.connections.len()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Publish a per-event notification after the store write committed, then
/// flag the durable bus row as delivered. Both halves are best-effort.
pub async fn publish_ingest_event(
    state: &AppState,
    kind: &str,
    profile_id: &str,
    data: serde_json::Value,
    bus_id: &str,
) {
    let timestamp = now_rfc3339();
    let msg = match kind {
        "click" => ServerMessage::NewClick {
            profile_id: profile_id.to_string(),
            data,
            timestamp,
        },
        _ => ServerMessage::NewView {
            profile_id: profile_id.to_string(),
            data,
            timestamp,
        },
    };
    state.hub.publish(profile_id, msg).await;
    if let Err(e) = state
        .db
        .mark_realtime_processed(&[bus_id.to_string()])
        .await
    {
        debug!(error = %e, "Failed to flag realtime bus row as processed");
    }
}

/// Background loop: push a fresh snapshot to every subscribed room every 10 s.
pub async fn run_push_loop(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(PUSH_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        for profile_id in state.hub.subscribed_profiles().await {
            match state.db.realtime_snapshot(&profile_id, Utc::now()).await {
                Ok(data) => {
                    state
                        .hub
                        .publish(
                            &profile_id,
                            ServerMessage::Realtime {
                                profile_id: profile_id.clone(),
                                data,
                                timestamp: now_rfc3339(),
                            },
                        )
                        .await;
                }
                Err(e) => error!(profile_id, error = %e, "Realtime snapshot failed"),
            }
        }
    }
}

/// Background loop: heartbeat every connection at the configured interval.
pub async fn run_heartbeat_loop(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(state.config.heartbeat_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let connections = state.hub.connection_count().await;
        if connections == 0 {
            continue;
        }
        state
            .hub
            .broadcast(ServerMessage::Heartbeat {
                timestamp: now_rfc3339(),
                connections,
            })
            .await;
    }
}
