//! Payoff matrix for one round.

use serde::{Deserialize, Serialize};

use crate::models::{Choice, ScorePair};

/// Operator-tunable payoff constants.
///
/// Standard prisoner's dilemma naming: `reward` for mutual cooperation,
/// `punishment` for mutual betrayal, `temptation` for the lone betrayer and
/// `sucker` for the lone cooperator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoffMatrix {
    #[serde(default = "default_reward")]
    pub reward: u32,

    #[serde(default = "default_temptation")]
    pub temptation: u32,

    #[serde(default = "default_punishment")]
    pub punishment: u32,

    #[serde(default = "default_sucker")]
    pub sucker: u32,
}

fn default_reward() -> u32 {
    3
}

fn default_temptation() -> u32 {
    5
}

fn default_punishment() -> u32 {
    1
}

fn default_sucker() -> u32 {
    0
}

impl Default for PayoffMatrix {
    fn default() -> Self {
        Self {
            reward: default_reward(),
            temptation: default_temptation(),
            punishment: default_punishment(),
            sucker: default_sucker(),
        }
    }
}

impl PayoffMatrix {
    /// Score pair for slot A's and slot B's choices.
    pub fn payoff(&self, a: Choice, b: Choice) -> ScorePair {
        match (a, b) {
            (Choice::Cooperate, Choice::Cooperate) => ScorePair::new(self.reward, self.reward),
            (Choice::Cooperate, Choice::Betray) => ScorePair::new(self.sucker, self.temptation),
            (Choice::Betray, Choice::Cooperate) => ScorePair::new(self.temptation, self.sucker),
            (Choice::Betray, Choice::Betray) => {
                ScorePair::new(self.punishment, self.punishment)
            }
        }
    }

    /// Whether the constants keep the dilemma ordering T > R > P > S.
    pub fn is_dilemma(&self) -> bool {
        self.temptation > self.reward && self.reward > self.punishment && self.punishment > self.sucker
    }

    /// Best single-round score a player can get.
    pub fn max_points(&self) -> u32 {
        self.temptation
            .max(self.reward)
            .max(self.punishment)
            .max(self.sucker)
    }
}
