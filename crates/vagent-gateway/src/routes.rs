//! HTTP/WS routes.

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::ingress::ws_stream;
use crate::state::AppState;
use crate::ws::ws_namespace;

/// Build the gateway router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/ws/:namespace", get(ws_namespace))
        .route("/stream", get(ws_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.stats.snapshot(&state.registry);
    Json(serde_json::to_value(snapshot).unwrap_or_default())
}
