use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::{parse_match_id, ApiError, Pagination, PaginationMeta};
use crate::calculate::{summarize_record, PlayerMatchSummary};
use crate::models::{MatchId, MatchRecord, PlayerId, ScorePair, TerminationReason};

#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Only matches this player took part in
    pub player_id: Option<PlayerId>,
}

#[derive(Debug, Serialize)]
pub struct ArchivedMatch {
    pub match_id: MatchId,
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub rounds_played: u32,
    pub final_scores: ScorePair,
    pub winner: Option<PlayerId>,
    pub reason: TerminationReason,
    pub ended_at: DateTime<Utc>,
}

impl From<&MatchRecord> for ArchivedMatch {
    fn from(record: &MatchRecord) -> Self {
        Self {
            match_id: record.id,
            player_a: record.player_a.id.clone(),
            player_b: record.player_b.id.clone(),
            rounds_played: record.resolved_rounds().count() as u32,
            final_scores: record.final_scores,
            winner: record.winner.clone(),
            reason: record.reason,
            ended_at: record.ended_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
    pub matches: Vec<ArchivedMatch>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize)]
pub struct ArchivedMatchDetail {
    pub record: MatchRecord,
    pub summaries: [PlayerMatchSummary; 2],
}

/// Finished matches, newest first.
pub async fn list_archive(
    State(state): State<AppState>,
    Query(query): Query<ArchiveQuery>,
) -> Result<Json<ArchiveResponse>, ApiError> {
    let mut records = state.store.list_matches()?;
    if let Some(player_id) = &query.player_id {
        records.retain(|r| r.slot_of(player_id).is_some());
    }
    records.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));

    let pagination = Pagination::new(query.page, query.page_size);
    let total = records.len() as u32;
    let matches = records
        .iter()
        .skip(pagination.offset())
        .take(pagination.page_size as usize)
        .map(ArchivedMatch::from)
        .collect();

    Ok(Json(ArchiveResponse {
        matches,
        pagination: PaginationMeta::new(&pagination, total),
    }))
}

pub async fn get_archived(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ArchivedMatchDetail>, ApiError> {
    let match_id = parse_match_id(&id)?;
    let record = state
        .store
        .get_match(match_id)?
        .ok_or_else(|| ApiError::NotFound(format!("No archived match {}", match_id)))?;

    let summaries = summarize_record(&record);
    Ok(Json(ArchivedMatchDetail { record, summaries }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};

    use crate::api::build_router;
    use crate::api::routes::test_support::get_json;
    use crate::api::state::test_state;
    use crate::config::AppConfig;
    use crate::models::{
        Choice, Decision, MatchId, MatchRecord, Player, PlayerId, Round, ScorePair,
        TerminationReason,
    };

    fn record(a: &str, b: &str, minutes_ago: i64) -> MatchRecord {
        let ended = Utc::now() - Duration::minutes(minutes_ago);
        let mut round = Round::new(1, ended, ended);
        round.decision_a = Some(Decision::new(PlayerId::from(a), Choice::Betray, ended));
        round.decision_b = Some(Decision::new(PlayerId::from(b), Choice::Cooperate, ended));
        round.result = Some(ScorePair::new(5, 0));
        round.resolved_at = Some(ended);

        MatchRecord {
            id: MatchId::new(),
            player_a: Player::human(a, a),
            player_b: Player::human(b, b),
            max_rounds: 1,
            rounds: vec![round],
            final_scores: ScorePair::new(5, 0),
            winner: Some(PlayerId::from(a)),
            reason: TerminationReason::Completed,
            started_at: ended,
            ended_at: ended,
        }
    }

    #[tokio::test]
    async fn test_archive_newest_first_and_filtered() {
        let state = test_state(AppConfig::default());
        let old = record("alice", "bob", 30);
        let new = record("carol", "bob", 5);
        state.store.archive_match(&old).unwrap();
        state.store.archive_match(&new).unwrap();

        let (status, json) = get_json(build_router(state.clone()), "/api/archive").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["pagination"]["total_items"], 2);
        assert_eq!(json["matches"][0]["match_id"], new.id.to_string());
        assert_eq!(json["matches"][1]["match_id"], old.id.to_string());

        let (_, json) = get_json(build_router(state.clone()), "/api/archive?player_id=alice").await;
        assert_eq!(json["matches"].as_array().unwrap().len(), 1);
        assert_eq!(json["matches"][0]["rounds_played"], 1);

        let (_, json) = get_json(build_router(state), "/api/archive?page=2&page_size=1").await;
        assert_eq!(json["matches"][0]["match_id"], old.id.to_string());
        assert_eq!(json["pagination"]["has_next"], false);
    }

    #[tokio::test]
    async fn test_archived_match_detail() {
        let state = test_state(AppConfig::default());
        let rec = record("alice", "bob", 1);
        state.store.archive_match(&rec).unwrap();

        let (status, json) =
            get_json(build_router(state.clone()), &format!("/api/archive/{}", rec.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["record"]["winner"], "alice");
        assert_eq!(json["summaries"][0]["betrayals"], 1);
        assert_eq!(json["summaries"][1]["total_points"], 0);

        let (status, _) = get_json(
            build_router(state),
            &format!("/api/archive/{}", MatchId::new()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
