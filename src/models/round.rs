//! Rounds and their results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Decision, Slot};

/// Points awarded for one round, ordered by slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScorePair {
    pub a: u32,
    pub b: u32,
}

impl ScorePair {
    pub fn new(a: u32, b: u32) -> Self {
        Self { a, b }
    }

    pub fn for_slot(&self, slot: Slot) -> u32 {
        match slot {
            Slot::A => self.a,
            Slot::B => self.b,
        }
    }
}

/// One decision cycle of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    /// 1-based round number
    pub number: u32,

    pub decision_a: Option<Decision>,
    pub decision_b: Option<Decision>,

    /// Present iff both decisions are present
    pub result: Option<ScorePair>,

    pub started_at: DateTime<Utc>,

    /// Wall-clock end of the decision phase
    pub deadline: DateTime<Utc>,

    pub resolved_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn new(number: u32, started_at: DateTime<Utc>, deadline: DateTime<Utc>) -> Self {
        Self {
            number,
            decision_a: None,
            decision_b: None,
            result: None,
            started_at,
            deadline,
            resolved_at: None,
        }
    }

    pub fn decision(&self, slot: Slot) -> Option<&Decision> {
        match slot {
            Slot::A => self.decision_a.as_ref(),
            Slot::B => self.decision_b.as_ref(),
        }
    }

    pub(crate) fn decision_mut(&mut self, slot: Slot) -> &mut Option<Decision> {
        match slot {
            Slot::A => &mut self.decision_a,
            Slot::B => &mut self.decision_b,
        }
    }

    pub fn decided_count(&self) -> usize {
        Slot::BOTH
            .iter()
            .filter(|s| self.decision(**s).is_some())
            .count()
    }

    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }

    /// Points for a slot, zero while unresolved.
    pub fn points(&self, slot: Slot) -> u32 {
        self.result.map(|r| r.for_slot(slot)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Choice, PlayerId};

    fn open_round() -> Round {
        let now = Utc::now();
        Round::new(1, now, now + chrono::Duration::seconds(30))
    }

    #[test]
    fn test_score_pair_for_slot() {
        let pair = ScorePair::new(5, 0);
        assert_eq!(pair.for_slot(Slot::A), 5);
        assert_eq!(pair.for_slot(Slot::B), 0);
    }

    #[test]
    fn test_new_round_is_empty() {
        let round = open_round();
        assert_eq!(round.decided_count(), 0);
        assert!(!round.is_resolved());
        assert_eq!(round.points(Slot::A), 0);
    }

    #[test]
    fn test_decision_lookup_by_slot() {
        let mut round = open_round();
        *round.decision_mut(Slot::B) =
            Some(Decision::new(PlayerId::from("p2"), Choice::Betray, Utc::now()));

        assert!(round.decision(Slot::A).is_none());
        assert_eq!(round.decision(Slot::B).unwrap().choice, Choice::Betray);
        assert_eq!(round.decided_count(), 1);
    }
}
