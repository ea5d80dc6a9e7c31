//! Built-in strategies for AI participants.

use serde::{Deserialize, Serialize};

use crate::models::Choice;

/// Strategy an AI participant plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiStrategy {
    AlwaysCooperate,
    AlwaysBetray,
    /// Copy the opponent's last choice. Start with cooperate.
    #[default]
    TitForTat,
    /// Cooperate until the opponent betrays once, then always betray.
    GrimTrigger,
    /// Win-stay, lose-switch.
    Pavlov,
}

impl AiStrategy {
    /// Pick a choice given both histories, oldest first.
    pub fn choose(self, own_history: &[Choice], opponent_history: &[Choice]) -> Choice {
        match self {
            AiStrategy::AlwaysCooperate => Choice::Cooperate,
            AiStrategy::AlwaysBetray => Choice::Betray,
            AiStrategy::TitForTat => opponent_history
                .last()
                .copied()
                .unwrap_or(Choice::Cooperate),
            AiStrategy::GrimTrigger => {
                if opponent_history.contains(&Choice::Betray) {
                    Choice::Betray
                } else {
                    Choice::Cooperate
                }
            }
            AiStrategy::Pavlov => match (own_history.last(), opponent_history.last()) {
                // Cooperate iff both chose the same thing last round
                (Some(own), Some(opp)) if own == opp => Choice::Cooperate,
                (Some(_), Some(_)) => Choice::Betray,
                _ => Choice::Cooperate,
            },
        }
    }
}

impl std::fmt::Display for AiStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AiStrategy::AlwaysCooperate => "always_cooperate",
            AiStrategy::AlwaysBetray => "always_betray",
            AiStrategy::TitForTat => "tit_for_tat",
            AiStrategy::GrimTrigger => "grim_trigger",
            AiStrategy::Pavlov => "pavlov",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AiStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "always_cooperate" => Ok(AiStrategy::AlwaysCooperate),
            "always_betray" => Ok(AiStrategy::AlwaysBetray),
            "tit_for_tat" => Ok(AiStrategy::TitForTat),
            "grim_trigger" => Ok(AiStrategy::GrimTrigger),
            "pavlov" => Ok(AiStrategy::Pavlov),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}
