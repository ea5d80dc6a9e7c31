//! Match lifecycle phases and archived match records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MatchId, Player, PlayerId, Round, ScorePair, Slot};

/// Phase of a match's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// No round open (before the first round, or between rounds)
    AwaitingRound,
    /// Round open with no decision, or with a first decision that is now final
    DecisionOpen,
    /// One decision received and its owner may still replace it
    ReversalWindow,
    /// Both decisions in and the result computed
    RoundResolved,
    MatchComplete,
    MatchForfeited,
}

impl MatchPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchPhase::MatchComplete | MatchPhase::MatchForfeited)
    }
}

impl std::fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchPhase::AwaitingRound => "awaiting_round",
            MatchPhase::DecisionOpen => "decision_open",
            MatchPhase::ReversalWindow => "reversal_window",
            MatchPhase::RoundResolved => "round_resolved",
            MatchPhase::MatchComplete => "match_complete",
            MatchPhase::MatchForfeited => "match_forfeited",
        };
        write!(f, "{}", s)
    }
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Completed,
    Forfeit,
    DisconnectTimeout,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Completed => write!(f, "completed"),
            TerminationReason::Forfeit => write!(f, "forfeit"),
            TerminationReason::DisconnectTimeout => write!(f, "disconnect_timeout"),
        }
    }
}

/// Archived form of a finished match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub player_a: Player,
    pub player_b: Player,
    pub max_rounds: u32,
    pub rounds: Vec<Round>,
    pub final_scores: ScorePair,
    pub winner: Option<PlayerId>,
    pub reason: TerminationReason,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn player(&self, slot: Slot) -> &Player {
        match slot {
            Slot::A => &self.player_a,
            Slot::B => &self.player_b,
        }
    }

    /// Resolve a player id to its slot.
    pub fn slot_of(&self, player_id: &PlayerId) -> Option<Slot> {
        if &self.player_a.id == player_id {
            Some(Slot::A)
        } else if &self.player_b.id == player_id {
            Some(Slot::B)
        } else {
            None
        }
    }

    pub fn resolved_rounds(&self) -> impl Iterator<Item = &Round> {
        self.rounds.iter().filter(|r| r.is_resolved())
    }

    /// Recompute totals by replaying the round ledger.
    pub fn replay_totals(&self) -> ScorePair {
        replay_totals(&self.rounds)
    }
}

/// Sum per-round results in order. Unresolved rounds contribute nothing.
pub fn replay_totals(rounds: &[Round]) -> ScorePair {
    rounds
        .iter()
        .filter_map(|r| r.result)
        .fold(ScorePair::default(), |acc, r| ScorePair {
            a: acc.a + r.a,
            b: acc.b + r.b,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(number: u32, a: u32, b: u32) -> Round {
        let now = Utc::now();
        let mut round = Round::new(number, now, now);
        round.result = Some(ScorePair::new(a, b));
        round
    }

    #[test]
    fn test_terminal_phases() {
        assert!(MatchPhase::MatchComplete.is_terminal());
        assert!(MatchPhase::MatchForfeited.is_terminal());
        assert!(!MatchPhase::ReversalWindow.is_terminal());
        assert!(!MatchPhase::AwaitingRound.is_terminal());
    }

    #[test]
    fn test_replay_totals_skips_open_rounds() {
        let now = Utc::now();
        let rounds = vec![
            resolved(1, 3, 3),
            resolved(2, 5, 0),
            Round::new(3, now, now),
        ];
        assert_eq!(replay_totals(&rounds), ScorePair::new(8, 3));
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&TerminationReason::DisconnectTimeout).unwrap();
        assert_eq!(json, "\"disconnect_timeout\"");
        assert_eq!(TerminationReason::Forfeit.to_string(), "forfeit");
    }

    #[test]
    fn test_slot_of() {
        let now = Utc::now();
        let record = MatchRecord {
            id: MatchId::new(),
            player_a: Player::human("a", "Alice"),
            player_b: Player::human("b", "Bob"),
            max_rounds: 3,
            rounds: vec![],
            final_scores: ScorePair::default(),
            winner: None,
            reason: TerminationReason::Completed,
            started_at: now,
            ended_at: now,
        };
        assert_eq!(record.slot_of(&PlayerId::from("a")), Some(Slot::A));
        assert_eq!(record.slot_of(&PlayerId::from("b")), Some(Slot::B));
        assert_eq!(record.slot_of(&PlayerId::from("c")), None);
    }
}
