//! Per-round player decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PlayerId;

/// A player's choice for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    /// Stay silent
    Cooperate,
    /// Confess
    Betray,
}

impl Choice {
    pub fn is_cooperate(self) -> bool {
        matches!(self, Choice::Cooperate)
    }
}

impl std::fmt::Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Choice::Cooperate => write!(f, "cooperate"),
            Choice::Betray => write!(f, "betray"),
        }
    }
}

/// Where a recorded decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    #[default]
    Player,
    /// Filled in with the safe default when the decision deadline expired
    Timeout,
}

/// A recorded decision, owned by exactly one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub player_id: PlayerId,
    pub choice: Choice,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub source: DecisionSource,
}

impl Decision {
    pub fn new(player_id: PlayerId, choice: Choice, received_at: DateTime<Utc>) -> Self {
        Self {
            player_id,
            choice,
            received_at,
            source: DecisionSource::Player,
        }
    }

    /// The default decision applied at the deadline.
    pub fn timeout(player_id: PlayerId, received_at: DateTime<Utc>) -> Self {
        Self {
            player_id,
            choice: Choice::Cooperate,
            received_at,
            source: DecisionSource::Timeout,
        }
    }

    pub fn is_auto(&self) -> bool {
        self.source == DecisionSource::Timeout
    }
}
