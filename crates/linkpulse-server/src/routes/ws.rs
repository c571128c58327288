use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::realtime::{now_rfc3339, ClientMessage, ServerMessage};
use crate::state::{AppState, SharedState};

/// `GET /api/realtime/ws` — the dashboard WebSocket endpoint.
///
/// Protocol: the client sends `subscribe:profile` / `unsubscribe:profile` /
/// `ping`; the server answers with `analytics:realtime` snapshots (initial
/// and periodic), per-event `analytics:new_view` / `analytics:new_click`
/// notifications, `pong`, `heartbeat`, and `error`.
pub async fn ws_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sink, mut stream) = socket.split();
    let (conn_id, mut rx) = state.hub.register_connection().await;
    debug!(connection = conn_id, "Realtime connection opened");

    // Writer half: drain the connection's bounded queue into the socket.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Reader half: drive the protocol until the client goes away.
    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_client_message(&state, conn_id, client_msg).await,
                Err(e) => {
                    debug!(connection = conn_id, error = %e, "Unparseable client message");
                    state
                        .hub
                        .send_to(
                            conn_id,
                            ServerMessage::Error {
                                message: "unrecognized message".to_string(),
                                code: "SUBSCRIPTION_ERROR".to_string(),
                            },
                        )
                        .await;
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.hub.drop_connection(conn_id).await;
    writer.abort();
    debug!(connection = conn_id, "Realtime connection closed");
}

/// One protocol message from a connection. Factored out of the socket loop
/// so the subscribe flow can be exercised without a live socket.
pub async fn handle_client_message(state: &AppState, conn_id: u64, msg: ClientMessage) {
    match msg {
        ClientMessage::Subscribe { profile_id } => {
            match state.chain.profile_exists(&profile_id).await {
                Ok(true) => {
                    state.hub.subscribe(&profile_id, conn_id).await;
                    // Fresh snapshot immediately on subscribe.
                    match state.db.realtime_snapshot(&profile_id, Utc::now()).await {
                        Ok(data) => {
                            state
                                .hub
                                .send_to(
                                    conn_id,
                                    ServerMessage::Realtime {
                                        profile_id,
                                        data,
                                        timestamp: now_rfc3339(),
                                    },
                                )
                                .await;
                        }
                        Err(e) => {
                            warn!(profile_id, error = %e, "Initial snapshot failed");
                        }
                    }
                }
                Ok(false) => {
                    state
                        .hub
                        .send_to(
                            conn_id,
                            ServerMessage::Error {
                                message: format!("unknown profile: {profile_id}"),
                                code: "PROFILE_NOT_FOUND".to_string(),
                            },
                        )
                        .await;
                }
                Err(e) => {
                    warn!(profile_id, error = %e, "Chain probe failed on subscribe");
                    state
                        .hub
                        .send_to(
                            conn_id,
                            ServerMessage::Error {
                                message: "subscription failed".to_string(),
                                code: "SUBSCRIPTION_ERROR".to_string(),
                            },
                        )
                        .await;
                }
            }
        }
        ClientMessage::Unsubscribe { profile_id } => {
            state.hub.unsubscribe(&profile_id, conn_id).await;
        }
        ClientMessage::Ping => {
            state
                .hub
                .send_to(
                    conn_id,
                    ServerMessage::Pong {
                        timestamp: now_rfc3339(),
                    },
                )
                .await;
        }
    }
}
