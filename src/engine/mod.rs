//! Match synchronization and scoring engine.
//!
//! Each live match is owned by one worker task that applies inbound events and
//! timer fires strictly one at a time. The `MatchRegistry` routes transport
//! events to those workers and finalizes matches once they end.

mod ai;
mod clock;
mod messages;
mod payoff;
mod registry;
mod state_machine;
mod worker;

pub use ai::AiStrategy;
pub use clock::{RoundClock, TimerKind, TimerRequest, TimerToken};
pub use messages::{InboundEvent, Outbound, RevealedDecision};
pub use payoff::PayoffMatrix;
pub use registry::{FinalizedMatch, MatchRegistry};
pub use state_machine::{Effect, MatchSnapshot, MatchStateMachine};
pub use worker::{MatchHandle, MatchWorker};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{MatchId, PlayerId};

/// Why a replacement decision was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalReason {
    /// The opponent has already decided this round
    OpponentDecided,
    /// The reversal window for the first decision has closed
    ReversalWindowExpired,
}

impl std::fmt::Display for FinalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalReason::OpponentDecided => write!(f, "opponent already decided"),
            FinalReason::ReversalWindowExpired => write!(f, "reversal window expired"),
        }
    }
}

/// Errors surfaced by the match engine.
///
/// None of these are fatal: each one rejects a single inbound event and leaves
/// match state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Unknown match: {0}")]
    UnknownMatch(MatchId),

    #[error("Player {player_id} is not part of match {match_id}")]
    NotAParticipant {
        match_id: MatchId,
        player_id: PlayerId,
    },

    #[error("No round is open in match {0}")]
    RoundNotOpen(MatchId),

    #[error("Decision for round {round} is final: {reason}")]
    DecisionFinal { round: u32, reason: FinalReason },

    #[error("Match {0} has already ended")]
    MatchClosed(MatchId),

    #[error("Invalid match setup: {0}")]
    InvalidSetup(String),
}

impl EngineError {
    /// Events that do not fit the protocol at all, as opposed to late ones.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownMatch(_)
                | EngineError::NotAParticipant { .. }
                | EngineError::RoundNotOpen(_)
        )
    }
}
