use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::state::AppState;
use crate::api::ApiError;
use crate::matchmaking::{Candidate, QueueOutcome};
use crate::models::{MatchId, Player, PlayerId};
use crate::trust::MatchmakingRange;

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub player_id: PlayerId,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JoinResponse {
    Waiting {
        position: usize,
        trust_score: u8,
        range: MatchmakingRange,
    },
    Paired {
        match_id: MatchId,
        opponent: PlayerId,
        trust_score: u8,
    },
}

#[derive(Debug, Deserialize)]
pub struct LeaveRequest {
    pub player_id: PlayerId,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub removed: bool,
}

pub async fn join(
    State(state): State<AppState>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, ApiError> {
    let stored = state.store.load_stats(&req.player_id)?;
    let trust_score = stored
        .as_ref()
        .map(|e| state.trust.trust_score(&e.stats))
        .unwrap_or_else(|| state.trust.baseline());
    let display_name = req
        .display_name
        .or_else(|| stored.map(|e| e.display_name))
        .unwrap_or_else(|| req.player_id.as_str().to_string());

    let candidate = Candidate::new(Player::human(req.player_id, display_name), trust_score);

    let outcome = state
        .matchmaking
        .lock()
        .await
        .enqueue(candidate, &state.trust);

    match outcome {
        QueueOutcome::AlreadyQueued => Err(ApiError::Conflict(
            "Player is already waiting for a match".to_string(),
        )),
        QueueOutcome::Waiting { position } => Ok(Json(JoinResponse::Waiting {
            position,
            trust_score,
            range: state.trust.matchmaking_range(trust_score),
        })),
        QueueOutcome::Paired { waiting, newcomer } => {
            let opponent = waiting.player.id.clone();
            let players = [waiting.player.clone(), newcomer.player.clone()];
            match state.registry.create_match(players, None).await {
                Ok(match_id) => Ok(Json(JoinResponse::Paired {
                    match_id,
                    opponent,
                    trust_score,
                })),
                Err(e) => {
                    warn!(error = %e, "Could not start paired match, requeueing waiting player");
                    state.matchmaking.lock().await.requeue_front(waiting);
                    Err(e.into())
                }
            }
        }
    }
}

pub async fn leave(
    State(state): State<AppState>,
    Json(req): Json<LeaveRequest>,
) -> Json<LeaveResponse> {
    let removed = state.matchmaking.lock().await.remove(&req.player_id).is_some();
    Json(LeaveResponse { removed })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::api::build_router;
    use crate::api::routes::test_support::post_json;
    use crate::api::state::test_state;
    use crate::config::AppConfig;
    use crate::models::{MatchId, PlayerId, Stats};
    use crate::storage::PlayerStatsEntry;

    #[tokio::test]
    async fn test_two_players_get_paired() {
        let state = test_state(AppConfig::default());

        let (status, json) = post_json(
            build_router(state.clone()),
            "/api/matchmaking/join",
            r#"{"player_id":"alice"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["position"], 1);
        assert_eq!(json["trust_score"], 50);

        let (_, json) = post_json(
            build_router(state.clone()),
            "/api/matchmaking/join",
            r#"{"player_id":"bob","display_name":"Bob"}"#,
        )
        .await;
        assert_eq!(json["status"], "paired");
        assert_eq!(json["opponent"], "alice");

        let match_id = MatchId::parse(json["match_id"].as_str().unwrap()).unwrap();
        let snapshot = state.registry.snapshot(match_id).await.unwrap();
        assert_eq!(snapshot.player_a.id.as_str(), "alice");
        assert_eq!(snapshot.player_b.display_name, "Bob");
        assert!(state.matchmaking.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_distant_trust_keeps_waiting() {
        let state = test_state(AppConfig::default());
        state
            .store
            .save_stats(&PlayerStatsEntry::new(
                PlayerId::from("saint"),
                "Saint".to_string(),
                Stats {
                    total_games: 100,
                    cooperations: 1000,
                    ..Stats::default()
                },
            ))
            .unwrap();
        state
            .store
            .save_stats(&PlayerStatsEntry::new(
                PlayerId::from("traitor"),
                "Traitor".to_string(),
                Stats {
                    total_games: 100,
                    betrayals: 1000,
                    ..Stats::default()
                },
            ))
            .unwrap();

        let (_, json) = post_json(
            build_router(state.clone()),
            "/api/matchmaking/join",
            r#"{"player_id":"saint"}"#,
        )
        .await;
        assert_eq!(json["trust_score"], 100);

        let (_, json) = post_json(
            build_router(state.clone()),
            "/api/matchmaking/join",
            r#"{"player_id":"traitor"}"#,
        )
        .await;
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["position"], 2);
        assert_eq!(json["trust_score"], 0);
        assert_eq!(state.registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_join_and_leave() {
        let state = test_state(AppConfig::default());
        let join = r#"{"player_id":"alice"}"#;

        post_json(build_router(state.clone()), "/api/matchmaking/join", join).await;
        let (status, json) =
            post_json(build_router(state.clone()), "/api/matchmaking/join", join).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "CONFLICT");

        let (_, json) = post_json(build_router(state.clone()), "/api/matchmaking/leave", join).await;
        assert_eq!(json["removed"], true);
        let (_, json) = post_json(build_router(state), "/api/matchmaking/leave", join).await;
        assert_eq!(json["removed"], false);
    }
}
