//! Inbound events consumed from the transport layer and outbound messages
//! handed back to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calculate::PlayerMatchSummary;
use crate::models::{
    Choice, DecisionSource, MatchId, PlayerId, ScorePair, TerminationReason,
};
use crate::trust::PlayerStanding;

/// Events the transport layer feeds into the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    SubmitDecision {
        match_id: MatchId,
        player_id: PlayerId,
        decision: Choice,
    },
    LeaveMatch {
        match_id: MatchId,
        player_id: PlayerId,
    },
    PlayerDisconnected {
        match_id: MatchId,
        player_id: PlayerId,
    },
    PlayerReconnected {
        match_id: MatchId,
        player_id: PlayerId,
    },
}

impl InboundEvent {
    pub fn match_id(&self) -> MatchId {
        match self {
            InboundEvent::SubmitDecision { match_id, .. }
            | InboundEvent::LeaveMatch { match_id, .. }
            | InboundEvent::PlayerDisconnected { match_id, .. }
            | InboundEvent::PlayerReconnected { match_id, .. } => *match_id,
        }
    }

    pub fn player_id(&self) -> &PlayerId {
        match self {
            InboundEvent::SubmitDecision { player_id, .. }
            | InboundEvent::LeaveMatch { player_id, .. }
            | InboundEvent::PlayerDisconnected { player_id, .. }
            | InboundEvent::PlayerReconnected { player_id, .. } => player_id,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::SubmitDecision { .. } => "decision",
            InboundEvent::LeaveMatch { .. } => "leave",
            InboundEvent::PlayerDisconnected { .. } => "disconnect",
            InboundEvent::PlayerReconnected { .. } => "reconnect",
        }
    }
}

/// A decision as revealed once its round resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealedDecision {
    pub player_id: PlayerId,
    pub choice: Choice,
    pub source: DecisionSource,
}

/// Messages the engine asks the transport layer to deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Countdown parameters for the round that just opened
    TimerSync {
        match_id: MatchId,
        round_number: u32,
        decision_deadline_seconds: u64,
        reversal_window_seconds: u64,
        deadline: DateTime<Utc>,
    },
    DecisionAccepted {
        match_id: MatchId,
        round_number: u32,
        choice: Choice,
        replaced: bool,
        reversal_deadline: Option<DateTime<Utc>>,
    },
    /// The "decision final" signal, or any other refusal of an inbound event
    DecisionRejected {
        match_id: MatchId,
        round_number: Option<u32>,
        reason: String,
    },
    OpponentDecided {
        match_id: MatchId,
        round_number: u32,
    },
    RoundResolved {
        match_id: MatchId,
        round_number: u32,
        decisions: Vec<RevealedDecision>,
        result: ScorePair,
        totals: ScorePair,
    },
    OpponentConnection {
        match_id: MatchId,
        connected: bool,
    },
    MatchEnded {
        match_id: MatchId,
        winner_player_id: Option<PlayerId>,
        reason: TerminationReason,
        final_scores: ScorePair,
    },
    MatchSummary {
        match_id: MatchId,
        summary: PlayerMatchSummary,
        standing: PlayerStanding,
    },
}

impl Outbound {
    pub fn match_id(&self) -> MatchId {
        match self {
            Outbound::TimerSync { match_id, .. }
            | Outbound::DecisionAccepted { match_id, .. }
            | Outbound::DecisionRejected { match_id, .. }
            | Outbound::OpponentDecided { match_id, .. }
            | Outbound::RoundResolved { match_id, .. }
            | Outbound::OpponentConnection { match_id, .. }
            | Outbound::MatchEnded { match_id, .. }
            | Outbound::MatchSummary { match_id, .. } => *match_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_deserialize() {
        let id = MatchId::new();
        let json = format!(
            r#"{{"type":"submit_decision","match_id":"{}","player_id":"p1","decision":"betray"}}"#,
            id
        );
        let event: InboundEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(event.match_id(), id);
        assert_eq!(event.player_id().as_str(), "p1");
        assert_eq!(event.kind(), "decision");
    }

    #[test]
    fn test_outbound_tagged_serialization() {
        let id = MatchId::new();
        let msg = Outbound::MatchEnded {
            match_id: id,
            winner_player_id: None,
            reason: TerminationReason::Completed,
            final_scores: ScorePair::new(9, 9),
        };
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "match_ended");
        assert_eq!(value["reason"], "completed");
        assert!(value["winner_player_id"].is_null());
        assert_eq!(msg.match_id(), id);
    }
}
