//! Cumulative player statistics.
//!
//! Only raw counters are stored. Every rate is recomputed from them on demand.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{MatchRecord, PlayerId, Slot};

/// Malformed counters that make a derived value undefined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("cooperation rate undefined: no recorded decisions across {total_games} games")]
    DivisionUndefined { total_games: u32 },
}

/// Result of a single match from one player's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
}

/// Per-player cumulative counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_games: u32,
    pub cooperations: u32,
    pub betrayals: u32,
    pub wins: u32,
    pub losses: u32,
    #[serde(default)]
    pub draws: u32,
    pub total_score: u64,
}

impl Stats {
    /// Fraction of recorded decisions that were cooperative.
    pub fn cooperation_rate(&self) -> Result<f64, StatsError> {
        let decisions = self.cooperations + self.betrayals;
        if decisions == 0 {
            return Err(StatsError::DivisionUndefined {
                total_games: self.total_games,
            });
        }
        Ok(self.cooperations as f64 / decisions as f64)
    }

    pub fn betrayal_rate(&self) -> Result<f64, StatsError> {
        self.cooperation_rate().map(|c| 1.0 - c)
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_games == 0 {
            0.0
        } else {
            self.wins as f64 / self.total_games as f64
        }
    }

    pub fn average_score(&self) -> f64 {
        if self.total_games == 0 {
            0.0
        } else {
            self.total_score as f64 / self.total_games as f64
        }
    }
}

/// What one finished match contributes to a player's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub cooperations: u32,
    pub betrayals: u32,
    pub score: u32,
    pub result: GameResult,
}

impl MatchOutcome {
    /// Derive a player's outcome from an archived match.
    ///
    /// Returns `None` when the player did not take part in the match.
    pub fn from_record(record: &MatchRecord, player_id: &PlayerId) -> Option<Self> {
        let slot = record.slot_of(player_id)?;
        let mut cooperations = 0;
        let mut betrayals = 0;

        for round in record.resolved_rounds() {
            if let Some(decision) = round.decision(slot) {
                if decision.choice.is_cooperate() {
                    cooperations += 1;
                } else {
                    betrayals += 1;
                }
            }
        }

        let result = match &record.winner {
            Some(winner) if winner == player_id => GameResult::Win,
            Some(_) => GameResult::Loss,
            None => GameResult::Draw,
        };

        Some(Self {
            cooperations,
            betrayals,
            score: record.final_scores.for_slot(slot),
            result,
        })
    }

    /// Convenience for callers that already know the slot.
    pub fn for_slot(record: &MatchRecord, slot: Slot) -> Self {
        let player_id = record.player(slot).id.clone();
        // The slot's own player id always resolves back to that slot.
        Self::from_record(record, &player_id).unwrap_or(Self {
            cooperations: 0,
            betrayals: 0,
            score: 0,
            result: GameResult::Draw,
        })
    }
}
