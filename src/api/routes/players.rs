use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::ApiError;
use crate::models::{PlayerId, Stats};
use crate::trust::PlayerStanding;

/// Stats for one player. Unknown players get a fresh standing.
pub async fn player_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlayerStanding>, ApiError> {
    let player_id = PlayerId::new(id);
    let standing = match state.store.load_stats(&player_id)? {
        Some(entry) => state
            .trust
            .standing(entry.player_id, entry.display_name, entry.stats),
        None => {
            let name = player_id.as_str().to_string();
            state.trust.standing(player_id, name, Stats::default())
        }
    };
    Ok(Json(standing))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    #[serde(flatten)]
    pub standing: PlayerStanding,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
    pub total_players: usize,
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let mut standings: Vec<PlayerStanding> = state
        .store
        .all_stats()?
        .into_iter()
        .map(|e| state.trust.standing(e.player_id, e.display_name, e.stats))
        .collect();

    standings.sort_by(|a, b| {
        b.derived
            .leaderboard_score
            .total_cmp(&a.derived.leaderboard_score)
            .then_with(|| a.player_id.cmp(&b.player_id))
    });

    let total_players = standings.len();
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let entries = standings
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, standing)| LeaderboardEntry {
            rank: i + 1,
            standing,
        })
        .collect();

    Ok(Json(LeaderboardResponse {
        entries,
        total_players,
    }))
}
