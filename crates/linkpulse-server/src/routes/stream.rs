use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures::stream::Stream;
use tracing::debug;

use crate::realtime::{now_rfc3339, ServerMessage};
use crate::state::SharedState;

const SSE_INTERVAL: Duration = Duration::from_secs(5);

/// `GET /api/realtime/stream/{profile_id}` — Server-Sent-Events variant of
/// the realtime push: one `analytics:realtime` payload immediately, then
/// every five seconds until the client disconnects.
#[tracing::instrument(skip(state))]
pub async fn stream_profile(
    State(state): State<SharedState>,
    Path(profile_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(SSE_INTERVAL);
    let stream = futures::stream::unfold(
        (state, profile_id, interval),
        |(state, profile_id, mut interval)| async move {
            interval.tick().await;
            let data = match state.db.realtime_snapshot(&profile_id, Utc::now()).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!(profile_id, error = %e, "SSE snapshot failed; sending zeros");
                    Default::default()
                }
            };
            let msg = ServerMessage::Realtime {
                profile_id: profile_id.clone(),
                data,
                timestamp: now_rfc3339(),
            };
            let event = Event::default()
                .event("analytics:realtime")
                .json_data(&msg)
                .unwrap_or_default();
            Some((Ok(event), (state, profile_id, interval)))
        },
    );
    Sse::new(stream).keep_alive(KeepAlive::default())
}
