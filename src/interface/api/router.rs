//! API Router configuration

use super::callback_handler::{status_callback, twiml, STATUS_CALLBACK_PATH};
use super::calls_handler::{
    end_call, force_terminate_call, get_call, health_check, initiate_call, list_calls,
};
use super::media_stream::media_stream_handler;
use super::metrics_handler::metrics_handler;
use super::state::AppState;
use super::ws_handler::{ws_handler, EventBroadcaster};
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn build_router(
    state: AppState,
    prometheus_handle: PrometheusHandle,
    event_broadcaster: Arc<EventBroadcaster>,
) -> Router {
    let health_routes = Router::new().route("/health", get(health_check));

    // Call management routes
    let call_routes = Router::new()
        .route("/calls", post(initiate_call).get(list_calls))
        .route("/calls/:call_id", get(get_call))
        .route("/calls/:call_id/end", post(end_call))
        .route("/calls/:call_id/force-terminate", post(force_terminate_call));

    // Carrier-facing routes
    let carrier_routes = Router::new()
        .route(STATUS_CALLBACK_PATH, post(status_callback))
        .route("/twiml", get(twiml).post(twiml))
        .route("/media-stream", get(media_stream_handler));

    // Metrics route (separate state)
    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    // WebSocket route (separate state)
    let ws_routes = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(event_broadcaster);

    Router::new()
        .merge(health_routes)
        .merge(call_routes)
        .merge(carrier_routes)
        .with_state(state)
        .merge(metrics_routes)
        .merge(ws_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
