use std::time::Duration;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Per-request deadline. Store and cache calls run under it; the realtime
/// stream endpoints are long-lived and mounted outside this layer.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

use linkpulse_core::config::Config;

use crate::{error, routes, state::SharedState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware order (outermost first on request): CORS, request tracing,
/// then the error-context mapping closest to the routes so it sees every
/// handler-produced error body.
pub fn build_app(state: SharedState) -> Router {
    let cors = cors_layer(&state.config);
    let api = Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/track/view", post(routes::track::track_view))
        .route("/api/track/click", post(routes::track::track_click))
        .route(
            "/api/track/batch/views",
            post(routes::track::track_batch_views),
        )
        .route("/api/track/session/end", post(routes::track::end_session))
        .route(
            "/api/track/session/{session_id}",
            get(routes::track::get_session),
        )
        .route(
            "/api/analytics/profile/{profile_id}",
            get(routes::analytics::profile_analytics),
        )
        .route(
            "/api/analytics/profile/{profile_id}/summary",
            get(routes::analytics::profile_summary),
        )
        .route(
            "/api/analytics/profile/{profile_id}/realtime",
            get(routes::analytics::profile_realtime),
        )
        .route(
            "/api/analytics/links/{profile_id}",
            get(routes::analytics::profile_links),
        )
        .route(
            "/api/analytics/geo/{profile_id}",
            get(routes::analytics::profile_geo),
        )
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    let streaming = Router::new()
        .route(
            "/api/realtime/stream/{profile_id}",
            get(routes::stream::stream_profile),
        )
        .route("/api/realtime/ws", get(routes::ws::ws_handler));

    api.merge(streaming)
        .layer(middleware::from_fn(error::request_context))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS from configuration: an empty origin list means permissive (the track
/// snippet is embedded on arbitrary microsites), otherwise only the listed
/// origins are allowed.
fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
