use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use linkpulse_core::config::Config;
use linkpulse_core::event::ProfileView;
use linkpulse_duckdb::DuckDbBackend;
use linkpulse_server::{
    chain::{ChainAdapter, ChainProfile, NullChainAdapter},
    enrich::Enricher,
    realtime::{publish_ingest_event, ClientMessage, ServerMessage},
    routes::ws::handle_client_message,
    state::AppState,
};

fn test_state(chain: Arc<dyn ChainAdapter>) -> Arc<AppState> {
    let db = DuckDbBackend::open_in_memory().expect("db");
    Arc::new(AppState::new(
        db,
        Config::default(),
        Enricher::disabled(),
        chain,
    ))
}

struct EmptyChainAdapter;

#[async_trait]
impl ChainAdapter for EmptyChainAdapter {
    async fn get_profile(&self, _profile_id: &str) -> Result<Option<ChainProfile>> {
        Ok(None)
    }
}

struct BrokenChainAdapter;

#[async_trait]
impl ChainAdapter for BrokenChainAdapter {
    async fn get_profile(&self, _profile_id: &str) -> Result<Option<ChainProfile>> {
        Err(anyhow::anyhow!("chain unreachable"))
    }
}

#[tokio::test]
async fn subscribe_sends_initial_snapshot_then_event_notifications() {
    let state = test_state(Arc::new(NullChainAdapter));
    let (conn_id, mut rx) = state.hub.register_connection().await;

    handle_client_message(
        &state,
        conn_id,
        ClientMessage::Subscribe {
            profile_id: "P1".to_string(),
        },
    )
    .await;

    match rx.recv().await.expect("initial message") {
        ServerMessage::Realtime { profile_id, .. } => assert_eq!(profile_id, "P1"),
        other => panic!("expected analytics:realtime first, got {other:?}"),
    }

    // An ingest for the subscribed profile must arrive as a new_view
    // notification after the store write.
    let view = ProfileView {
        id: "v1".to_string(),
        profile_id: "P1".to_string(),
        session_id: Some("s1".to_string()),
        visitor_ip: None,
        user_agent: None,
        referrer: None,
        country: None,
        region: None,
        city: None,
        device_type: None,
        browser: None,
        os: None,
        created_at: Utc::now(),
    };
    state.db.insert_view(&view, None).await.expect("insert");
    publish_ingest_event(
        &state,
        "view",
        "P1",
        serde_json::json!({ "viewId": "v1" }),
        "bus-missing-ok",
    )
    .await;

    match tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("within a second")
        .expect("message")
    {
        ServerMessage::NewView { profile_id, data, .. } => {
            assert_eq!(profile_id, "P1");
            assert_eq!(data["viewId"], serde_json::json!("v1"));
        }
        other => panic!("expected analytics:new_view, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribe_to_unknown_profile_emits_error_and_no_subscription() {
    let state = test_state(Arc::new(EmptyChainAdapter));
    let (conn_id, mut rx) = state.hub.register_connection().await;

    handle_client_message(
        &state,
        conn_id,
        ClientMessage::Subscribe {
            profile_id: "ghost".to_string(),
        },
    )
    .await;

    match rx.recv().await.expect("error message") {
        ServerMessage::Error { code, message } => {
            assert_eq!(code, "PROFILE_NOT_FOUND");
            assert!(message.contains("ghost"));
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert!(state.hub.subscribed_profiles().await.is_empty());
}

#[tokio::test]
async fn chain_failure_on_subscribe_is_a_subscription_error() {
    let state = test_state(Arc::new(BrokenChainAdapter));
    let (conn_id, mut rx) = state.hub.register_connection().await;

    handle_client_message(
        &state,
        conn_id,
        ClientMessage::Subscribe {
            profile_id: "P1".to_string(),
        },
    )
    .await;

    match rx.recv().await.expect("error message") {
        ServerMessage::Error { code, .. } => assert_eq!(code, "SUBSCRIPTION_ERROR"),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(state.hub.subscribed_profiles().await.is_empty());
}

#[tokio::test]
async fn ping_answers_pong() {
    let state = test_state(Arc::new(NullChainAdapter));
    let (conn_id, mut rx) = state.hub.register_connection().await;

    handle_client_message(&state, conn_id, ClientMessage::Ping).await;
    assert!(matches!(
        rx.recv().await.expect("message"),
        ServerMessage::Pong { .. }
    ));
}

#[tokio::test]
async fn unsubscribe_stops_room_delivery() {
    let state = test_state(Arc::new(NullChainAdapter));
    let (conn_id, mut rx) = state.hub.register_connection().await;

    state.hub.subscribe("P1", conn_id).await;
    handle_client_message(
        &state,
        conn_id,
        ClientMessage::Unsubscribe {
            profile_id: "P1".to_string(),
        },
    )
    .await;

    state
        .hub
        .publish(
            "P1",
            ServerMessage::Heartbeat {
                timestamp: "now".to_string(),
                connections: 1,
            },
        )
        .await;
    assert!(
        tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .is_err(),
        "no message may arrive after unsubscribe"
    );
}

#[tokio::test]
async fn lagging_subscriber_is_dropped_not_blocked() {
    let state = test_state(Arc::new(NullChainAdapter));
    let (conn_id, _rx) = state.hub.register_connection().await;
    state.hub.subscribe("P1", conn_id).await;
    assert_eq!(state.hub.connection_count().await, 1);

    // Never drain the receiver: the bounded queue fills, then the publisher
    // drops the connection instead of waiting.
    for _ in 0..200 {
        state
            .hub
            .publish(
                "P1",
                ServerMessage::Heartbeat {
                    timestamp: "now".to_string(),
                    connections: 1,
                },
            )
            .await;
    }
    assert_eq!(state.hub.connection_count().await, 0);
    assert!(state.hub.subscribed_profiles().await.is_empty());
}

#[tokio::test]
async fn heartbeat_broadcast_reaches_every_connection() {
    let state = test_state(Arc::new(NullChainAdapter));
    let (_id_a, mut rx_a) = state.hub.register_connection().await;
    let (_id_b, mut rx_b) = state.hub.register_connection().await;

    state
        .hub
        .broadcast(ServerMessage::Heartbeat {
            timestamp: "now".to_string(),
            connections: 2,
        })
        .await;

    for rx in [&mut rx_a, &mut rx_b] {
        match rx.recv().await.expect("heartbeat") {
            ServerMessage::Heartbeat { connections, .. } => assert_eq!(connections, 2),
            other => panic!("expected heartbeat, got {other:?}"),
        }
    }
}
