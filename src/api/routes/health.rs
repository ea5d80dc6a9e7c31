use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_matches: usize,
    pub queued_players: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let active_matches = state.registry.active_count().await;
    let queued_players = state.matchmaking.lock().await.len();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_matches,
        queued_players,
    })
}
