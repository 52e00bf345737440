//! HTTP route definitions

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    waiting_players: usize,
    matched_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, stats) = match state.matchmaking.stats().await {
        Some(stats) => ("ok", stats),
        None => ("degraded", Default::default()),
    };

    Json(HealthResponse {
        status,
        uptime_secs: uptime_secs(),
        active_matches: state.match_registry.active_matches(),
        waiting_players: stats.waiting,
        matched_players: stats.in_match,
    })
}
