//! Match participants.

use serde::{Deserialize, Serialize};

use super::PlayerId;
use crate::engine::AiStrategy;

/// Fixed seat of a player within a match.
///
/// Slots are assigned once at match creation and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }

    pub const BOTH: [Slot; 2] = [Slot::A, Slot::B];
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::A => write!(f, "A"),
            Slot::B => write!(f, "B"),
        }
    }
}

/// A participant as seen by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,

    /// Driven by the engine's AI strategy rather than a remote client
    #[serde(default)]
    pub is_ai: bool,

    /// Trust score at the time the match was created
    #[serde(default = "default_trust")]
    pub trust_score: u8,

    /// Cumulative games played before this match
    #[serde(default)]
    pub games_played: u32,

    /// Overrides the match's AI strategy for this player
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<AiStrategy>,
}

fn default_trust() -> u8 {
    50
}

impl Player {
    pub fn human(id: impl Into<PlayerId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            is_ai: false,
            trust_score: default_trust(),
            games_played: 0,
            strategy: None,
        }
    }

    pub fn ai(id: impl Into<PlayerId>, display_name: impl Into<String>) -> Self {
        Self {
            is_ai: true,
            ..Self::human(id, display_name)
        }
    }

    /// An AI player with its own strategy.
    pub fn ai_with(
        id: impl Into<PlayerId>,
        display_name: impl Into<String>,
        strategy: AiStrategy,
    ) -> Self {
        Self {
            strategy: Some(strategy),
            ..Self::ai(id, display_name)
        }
    }

    pub fn with_history(mut self, trust_score: u8, games_played: u32) -> Self {
        self.trust_score = trust_score.min(100);
        self.games_played = games_played;
        self
    }
}
