use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::{parse_match_id, ApiError};
use crate::config::MatchConfig;
use crate::engine::{AiStrategy, InboundEvent, MatchSnapshot};
use crate::models::{Choice, MatchId, Player, PlayerId};
use crate::transport::Delivery;

/// A participant in a match creation request.
#[derive(Debug, Deserialize)]
pub struct PlayerSpec {
    pub id: PlayerId,
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_ai: bool,
    /// Implies `is_ai`
    pub strategy: Option<AiStrategy>,
}

impl PlayerSpec {
    fn into_player(self) -> Player {
        let name = self
            .display_name
            .unwrap_or_else(|| self.id.as_str().to_string());
        if let Some(strategy) = self.strategy {
            Player::ai_with(self.id, name, strategy)
        } else if self.is_ai {
            Player::ai(self.id, name)
        } else {
            Player::human(self.id, name)
        }
    }
}

/// Per-match settings layered over the server defaults.
#[derive(Debug, Default, Deserialize)]
pub struct MatchOverrides {
    pub max_rounds: Option<u32>,
    pub decision_deadline_seconds: Option<u64>,
    pub reversal_window_seconds: Option<u64>,
    pub inter_round_delay_seconds: Option<u64>,
    pub disconnect_grace_seconds: Option<u64>,
    pub ai_strategy: Option<AiStrategy>,
}

impl MatchOverrides {
    pub fn apply(&self, base: &MatchConfig) -> MatchConfig {
        let mut config = base.clone();
        if let Some(v) = self.max_rounds {
            config.max_rounds = v;
        }
        if let Some(v) = self.decision_deadline_seconds {
            config.decision_deadline_seconds = v;
        }
        if let Some(v) = self.reversal_window_seconds {
            config.reversal_window_seconds = v;
        }
        if let Some(v) = self.inter_round_delay_seconds {
            config.inter_round_delay_seconds = v;
        }
        if let Some(v) = self.disconnect_grace_seconds {
            config.disconnect_grace_seconds = v;
        }
        if let Some(v) = self.ai_strategy {
            config.ai_strategy = v;
        }
        config
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMatchRequest {
    pub player_a: PlayerSpec,
    pub player_b: PlayerSpec,
    pub config: Option<MatchOverrides>,
}

#[derive(Debug, Serialize)]
pub struct CreateMatchResponse {
    pub match_id: MatchId,
}

#[derive(Debug, Serialize)]
pub struct MatchesResponse {
    pub matches: Vec<MatchSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct PlayerAction {
    pub player_id: PlayerId,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub player_id: PlayerId,
    pub decision: Choice,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub match_id: MatchId,
    pub accepted: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub since: u64,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub match_id: MatchId,
    pub events: Vec<Delivery>,
    /// Pass back as `since` to fetch only newer events
    pub last_seq: u64,
}

pub async fn create_match(
    State(state): State<AppState>,
    Json(req): Json<CreateMatchRequest>,
) -> Result<(StatusCode, Json<CreateMatchResponse>), ApiError> {
    let config = req
        .config
        .map(|overrides| overrides.apply(state.registry.defaults()));
    let players = [req.player_a.into_player(), req.player_b.into_player()];

    let match_id = state.registry.create_match(players, config).await?;
    Ok((StatusCode::CREATED, Json(CreateMatchResponse { match_id })))
}

pub async fn list_matches(State(state): State<AppState>) -> Json<MatchesResponse> {
    Json(MatchesResponse {
        matches: state.registry.live_matches().await,
    })
}

pub async fn get_match(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MatchSnapshot>, ApiError> {
    let match_id = parse_match_id(&id)?;
    state
        .registry
        .snapshot(match_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No live match {}", match_id)))
}

async fn dispatch(state: &AppState, event: InboundEvent) -> Result<Json<AckResponse>, ApiError> {
    let match_id = event.match_id();
    state.registry.dispatch(event).await?;
    Ok(Json(AckResponse {
        match_id,
        accepted: true,
    }))
}

pub async fn submit_decision(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let event = InboundEvent::SubmitDecision {
        match_id: parse_match_id(&id)?,
        player_id: req.player_id,
        decision: req.decision,
    };
    dispatch(&state, event).await
}

pub async fn leave_match(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PlayerAction>,
) -> Result<Json<AckResponse>, ApiError> {
    let event = InboundEvent::LeaveMatch {
        match_id: parse_match_id(&id)?,
        player_id: req.player_id,
    };
    dispatch(&state, event).await
}

pub async fn disconnect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PlayerAction>,
) -> Result<Json<AckResponse>, ApiError> {
    let event = InboundEvent::PlayerDisconnected {
        match_id: parse_match_id(&id)?,
        player_id: req.player_id,
    };
    dispatch(&state, event).await
}

pub async fn reconnect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PlayerAction>,
) -> Result<Json<AckResponse>, ApiError> {
    let event = InboundEvent::PlayerReconnected {
        match_id: parse_match_id(&id)?,
        player_id: req.player_id,
    };
    dispatch(&state, event).await
}

/// Poll the deliveries of a match, live or finished.
pub async fn events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let match_id = parse_match_id(&id)?;
    if !state.mailbox.has_match(match_id) && state.registry.snapshot(match_id).await.is_none() {
        return Err(ApiError::NotFound(format!("No events for match {}", match_id)));
    }

    let events = state
        .mailbox
        .events_for(match_id, query.player_id.as_ref(), query.since);
    let last_seq = events.last().map(|d| d.seq).unwrap_or(query.since);

    Ok(Json(EventsResponse {
        match_id,
        events,
        last_seq,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::Value;

    use crate::api::build_router;
    use crate::api::routes::test_support::{get_json, post_json};
    use crate::api::state::{test_state, AppState};
    use crate::config::AppConfig;

    fn state() -> AppState {
        let mut config = AppConfig::default();
        config.match_defaults.max_rounds = 1;
        test_state(config)
    }

    async fn create(state: &AppState) -> String {
        let app = build_router(state.clone());
        let (status, json) = post_json(
            app,
            "/api/matches",
            r#"{"player_a":{"id":"alice","display_name":"Alice"},"player_b":{"id":"bob"}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        json["match_id"].as_str().unwrap().to_string()
    }

    fn kinds(json: &Value) -> Vec<String> {
        json["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["message"]["type"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_create_and_get_match() {
        let state = state();
        let id = create(&state).await;

        let (status, json) = get_json(build_router(state.clone()), &format!("/api/matches/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["player_a"]["display_name"], "Alice");
        assert_eq!(json["player_b"]["display_name"], "bob");
        assert_eq!(json["current_round"], 1);

        let (_, json) = get_json(build_router(state), "/api/matches").await;
        assert_eq!(json["matches"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_self_match() {
        let app = build_router(state());
        let (status, json) = post_json(
            app,
            "/api/matches",
            r#"{"player_a":{"id":"alice"},"player_b":{"id":"alice"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_overrides() {
        let app = build_router(state());
        let (status, _) = post_json(
            app,
            "/api/matches",
            r#"{"player_a":{"id":"a"},"player_b":{"id":"b"},"config":{"max_rounds":0}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_match_ids() {
        let state = state();
        let unknown = crate::models::MatchId::new().to_string();

        let (status, _) = get_json(build_router(state.clone()), &format!("/api/matches/{}", unknown)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = post_json(
            build_router(state.clone()),
            &format!("/api/matches/{}/decision", unknown),
            r#"{"player_id":"alice","decision":"cooperate"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_json(build_router(state), "/api/matches/nope").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_outsider_decision_is_forbidden() {
        let state = state();
        let id = create(&state).await;

        let (status, json) = post_json(
            build_router(state),
            &format!("/api/matches/{}/decision", id),
            r#"{"player_id":"mallory","decision":"betray"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_full_match_over_http() {
        let state = state();
        let id = create(&state).await;
        let mut completions = state.registry.subscribe_completions();

        let (status, json) = post_json(
            build_router(state.clone()),
            &format!("/api/matches/{}/decision", id),
            r#"{"player_id":"alice","decision":"cooperate"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["accepted"], true);

        let (status, _) = post_json(
            build_router(state.clone()),
            &format!("/api/matches/{}/decision", id),
            r#"{"player_id":"bob","decision":"betray"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let finalized = completions.recv().await.unwrap();
        assert_eq!(finalized.record.final_scores.a, 0);
        assert_eq!(finalized.record.final_scores.b, 5);

        let (status, _) = get_json(build_router(state.clone()), &format!("/api/matches/{}", id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = get_json(
            build_router(state.clone()),
            &format!("/api/matches/{}/events?player_id=alice", id),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let alice = kinds(&json);
        assert_eq!(alice.first().map(String::as_str), Some("timer_sync"));
        assert!(alice.contains(&"decision_accepted".to_string()));
        assert!(alice.contains(&"round_resolved".to_string()));
        assert!(alice.contains(&"match_ended".to_string()));
        assert!(alice.contains(&"match_summary".to_string()));

        // Bob's acceptance goes to Bob only
        let accepted = json["events"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|e| e["message"]["type"] == "decision_accepted")
            .count();
        assert_eq!(accepted, 1);

        let last_seq = json["last_seq"].as_u64().unwrap();
        let (_, json) = get_json(
            build_router(state),
            &format!("/api/matches/{}/events?player_id=alice&since={}", id, last_seq),
        )
        .await;
        assert!(json["events"].as_array().unwrap().is_empty());
        assert_eq!(json["last_seq"].as_u64().unwrap(), last_seq);
    }

    #[tokio::test]
    async fn test_leave_forfeits() {
        let state = state();
        let id = create(&state).await;
        let mut completions = state.registry.subscribe_completions();

        let (status, _) = post_json(
            build_router(state.clone()),
            &format!("/api/matches/{}/leave", id),
            r#"{"player_id":"bob"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let finalized = completions.recv().await.unwrap();
        assert_eq!(finalized.record.winner.unwrap().as_str(), "alice");
    }

    #[tokio::test]
    async fn test_anonymous_events_exclude_private_deliveries() {
        let state = state();
        let id = create(&state).await;

        let (status, _) = post_json(
            build_router(state.clone()),
            &format!("/api/matches/{}/decision", id),
            r#"{"player_id":"alice","decision":"betray"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = get_json(build_router(state.clone()), &format!("/api/matches/{}/events", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(kinds(&json), vec!["timer_sync".to_string()]);

        let (_, json) = get_json(
            build_router(state),
            &format!("/api/matches/{}/events?player_id=alice", id),
        )
        .await;
        assert!(kinds(&json).contains(&"decision_accepted".to_string()));
    }

    #[tokio::test]
    async fn test_ai_slot_cannot_be_driven_over_http() {
        let state = state();
        let app = build_router(state.clone());
        let (status, json) = post_json(
            app,
            "/api/matches",
            r#"{"player_a":{"id":"alice"},"player_b":{"id":"bot","is_ai":true}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = json["match_id"].as_str().unwrap().to_string();

        for (path, body) in [
            ("decision", r#"{"player_id":"bot","decision":"betray"}"#),
            ("disconnect", r#"{"player_id":"bot"}"#),
        ] {
            let (status, _) = post_json(
                build_router(state.clone()),
                &format!("/api/matches/{}/{}", id, path),
                body,
            )
            .await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{}", path);
        }
    }

    #[tokio::test]
    async fn test_events_for_unknown_match() {
        let unknown = crate::models::MatchId::new().to_string();
        let (status, _) = get_json(build_router(state()), &format!("/api/matches/{}/events", unknown)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
