//! Post-match statistics.
//!
//! Derives per-player summaries from a round ledger:
//! - Cooperation and betrayal percentages
//! - Points for and against
//! - Average trust signal and the most fearful round
//! - Behavioural tags
//!
//! All functions are pure and only read the ledger.

use serde::{Deserialize, Serialize};

use crate::models::{Choice, DecisionSource, MatchRecord, PlayerId, Round, Slot};

/// Behavioural label attached to a player's match summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsychTag {
    /// Cooperated in at least 90% of rounds
    Saint,
    /// Betrayed in at least 70% of rounds
    Traitor,
    /// Usually answered a betrayal with a betrayal
    Retaliator,
    /// Usually answered a betrayal with cooperation
    Forgiver,
    /// Broke a mutual cooperation streak
    Opportunist,
    /// Let the deadline decide at least once
    Hesitant,
    /// Took the sucker's payoff in at least a third of rounds
    Exploited,
}

impl std::fmt::Display for PsychTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PsychTag::Saint => "saint",
            PsychTag::Traitor => "traitor",
            PsychTag::Retaliator => "retaliator",
            PsychTag::Forgiver => "forgiver",
            PsychTag::Opportunist => "opportunist",
            PsychTag::Hesitant => "hesitant",
            PsychTag::Exploited => "exploited",
        };
        write!(f, "{}", name)
    }
}

/// One player's view of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMatchSummary {
    pub player_id: PlayerId,
    pub rounds_played: u32,
    pub cooperations: u32,
    pub betrayals: u32,
    pub cooperation_pct: f64,
    pub betrayal_pct: f64,
    pub total_points: u32,
    pub opponent_points: u32,
    /// Mean of 100 (cooperate) / 0 (betray) over decisions the player made
    /// themselves. `None` if every decision was a timeout default.
    pub average_trust_signal: Option<f64>,
    /// Round with the largest point swing in the opponent's favour
    pub most_fearful_round: Option<u32>,
    pub tags: Vec<PsychTag>,
}

/// A resolved round seen from one side.
struct Turn {
    number: u32,
    own: Choice,
    opponent: Choice,
    own_source: DecisionSource,
    own_points: u32,
    opponent_points: u32,
}

/// Locate the player's slot from the decisions themselves.
fn slot_in(round: &Round, player_id: &PlayerId) -> Option<Slot> {
    Slot::BOTH
        .into_iter()
        .find(|s| round.decision(*s).map(|d| &d.player_id) == Some(player_id))
}

fn turns(rounds: &[Round], player_id: &PlayerId) -> Vec<Turn> {
    rounds
        .iter()
        .filter(|r| r.is_resolved())
        .filter_map(|round| {
            let slot = slot_in(round, player_id)?;
            let own = round.decision(slot)?;
            let opponent = round.decision(slot.other())?;
            Some(Turn {
                number: round.number,
                own: own.choice,
                opponent: opponent.choice,
                own_source: own.source,
                own_points: round.points(slot),
                opponent_points: round.points(slot.other()),
            })
        })
        .collect()
}

fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Summarize one player's behaviour over a round ledger.
///
/// Unresolved rounds are skipped, so this works on a live match as well as
/// an archived one.
pub fn summarize(rounds: &[Round], player_id: &PlayerId) -> PlayerMatchSummary {
    let turns = turns(rounds, player_id);
    let played = turns.len() as u32;

    let cooperations = turns.iter().filter(|t| t.own.is_cooperate()).count() as u32;
    let betrayals = played - cooperations;

    let signals: Vec<f64> = turns
        .iter()
        .filter(|t| t.own_source == DecisionSource::Player)
        .map(|t| if t.own.is_cooperate() { 100.0 } else { 0.0 })
        .collect();
    let average_trust_signal = if signals.is_empty() {
        None
    } else {
        Some(signals.iter().sum::<f64>() / signals.len() as f64)
    };

    // Strictly greater keeps the earliest round on ties.
    let mut most_fearful_round = None;
    let mut worst_delta = 0i64;
    for turn in &turns {
        let delta = turn.opponent_points as i64 - turn.own_points as i64;
        if delta > worst_delta {
            worst_delta = delta;
            most_fearful_round = Some(turn.number);
        }
    }

    let summary = PlayerMatchSummary {
        player_id: player_id.clone(),
        rounds_played: played,
        cooperations,
        betrayals,
        cooperation_pct: percent(cooperations, played),
        betrayal_pct: percent(betrayals, played),
        total_points: turns.iter().map(|t| t.own_points).sum(),
        opponent_points: turns.iter().map(|t| t.opponent_points).sum(),
        average_trust_signal,
        most_fearful_round,
        tags: Vec::new(),
    };

    PlayerMatchSummary {
        tags: tags(&turns, &summary),
        ..summary
    }
}

fn tags(turns: &[Turn], summary: &PlayerMatchSummary) -> Vec<PsychTag> {
    let mut tags = Vec::new();
    if turns.is_empty() {
        return tags;
    }

    if summary.cooperation_pct >= 90.0 {
        tags.push(PsychTag::Saint);
    }
    if summary.betrayal_pct >= 70.0 {
        tags.push(PsychTag::Traitor);
    }

    let responses: Vec<Choice> = turns
        .windows(2)
        .filter(|w| w[0].opponent == Choice::Betray)
        .map(|w| w[1].own)
        .collect();
    if !responses.is_empty() {
        let retaliations = responses.iter().filter(|c| **c == Choice::Betray).count();
        let forgiven = responses.len() - retaliations;
        if retaliations * 2 >= responses.len() {
            tags.push(PsychTag::Retaliator);
        }
        if forgiven * 2 >= responses.len() {
            tags.push(PsychTag::Forgiver);
        }
    }

    let broke_streak = turns.windows(2).any(|w| {
        w[0].own.is_cooperate() && w[0].opponent.is_cooperate() && w[1].own == Choice::Betray
    });
    if broke_streak {
        tags.push(PsychTag::Opportunist);
    }

    if turns.iter().any(|t| t.own_source == DecisionSource::Timeout) {
        tags.push(PsychTag::Hesitant);
    }

    let suckered = turns
        .iter()
        .filter(|t| t.own.is_cooperate() && t.opponent == Choice::Betray)
        .count();
    if suckered > 0 && suckered * 3 >= turns.len() {
        tags.push(PsychTag::Exploited);
    }

    tags
}

/// Summaries for both participants, in slot order.
pub fn summarize_record(record: &MatchRecord) -> [PlayerMatchSummary; 2] {
    [
        summarize(&record.rounds, &record.player_a.id),
        summarize(&record.rounds, &record.player_b.id),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PayoffMatrix;
    use crate::models::Decision;
    use chrono::Utc;
    use Choice::{Betray as B, Cooperate as C};

    fn ledger(choices: &[(Choice, Choice)]) -> Vec<Round> {
        let payoff = PayoffMatrix::default();
        let now = Utc::now();
        choices
            .iter()
            .enumerate()
            .map(|(i, (a, b))| {
                let mut round = Round::new(i as u32 + 1, now, now);
                round.decision_a = Some(Decision::new("a".into(), *a, now));
                round.decision_b = Some(Decision::new("b".into(), *b, now));
                round.result = Some(payoff.payoff(*a, *b));
                round.resolved_at = Some(now);
                round
            })
            .collect()
    }

    fn a() -> PlayerId {
        PlayerId::from("a")
    }

    fn b() -> PlayerId {
        PlayerId::from("b")
    }

    #[test]
    fn test_percentages_and_points() {
        let rounds = ledger(&[(C, C), (B, C), (C, B), (C, C)]);
        let summary = summarize(&rounds, &a());

        assert_eq!(summary.rounds_played, 4);
        assert_eq!(summary.cooperations, 3);
        assert_eq!(summary.betrayals, 1);
        assert_eq!(summary.cooperation_pct, 75.0);
        assert_eq!(summary.betrayal_pct, 25.0);
        assert_eq!(summary.total_points, 3 + 5 + 0 + 3);
        assert_eq!(summary.opponent_points, 3 + 0 + 5 + 3);
    }

    #[test]
    fn test_empty_ledger() {
        let summary = summarize(&[], &a());

        assert_eq!(summary.rounds_played, 0);
        assert_eq!(summary.cooperation_pct, 0.0);
        assert_eq!(summary.average_trust_signal, None);
        assert_eq!(summary.most_fearful_round, None);
        assert!(summary.tags.is_empty());
    }

    #[test]
    fn test_unresolved_rounds_are_ignored() {
        let mut rounds = ledger(&[(C, C)]);
        let now = Utc::now();
        let mut open = Round::new(2, now, now);
        open.decision_a = Some(Decision::new("a".into(), B, now));
        rounds.push(open);

        let summary = summarize(&rounds, &a());
        assert_eq!(summary.rounds_played, 1);
        assert_eq!(summary.betrayals, 0);
    }

    #[test]
    fn test_most_fearful_round_prefers_earliest() {
        let rounds = ledger(&[(C, C), (C, B), (C, B), (B, C)]);

        assert_eq!(summarize(&rounds, &a()).most_fearful_round, Some(2));
        assert_eq!(summarize(&rounds, &b()).most_fearful_round, Some(4));
    }

    #[test]
    fn test_no_fearful_round_when_never_behind() {
        let rounds = ledger(&[(C, C), (B, B)]);
        assert_eq!(summarize(&rounds, &a()).most_fearful_round, None);
    }

    #[test]
    fn test_trust_signal_skips_timeouts() {
        let mut rounds = ledger(&[(C, C), (B, C), (C, C)]);
        let now = Utc::now();
        rounds[2].decision_a = Some(Decision::timeout("a".into(), now));

        let summary = summarize(&rounds, &a());
        assert_eq!(summary.average_trust_signal, Some(50.0));
        assert!(summary.tags.contains(&PsychTag::Hesitant));
    }

    #[test]
    fn test_saint_and_exploited() {
        let rounds = ledger(&[(C, B), (C, B), (C, C)]);
        let summary = summarize(&rounds, &a());

        assert!(summary.tags.contains(&PsychTag::Saint));
        assert!(summary.tags.contains(&PsychTag::Exploited));
        assert!(summary.tags.contains(&PsychTag::Forgiver));
        assert!(!summary.tags.contains(&PsychTag::Traitor));
    }

    #[test]
    fn test_traitor_and_opportunist() {
        let rounds = ledger(&[(C, C), (B, C), (B, C), (B, B)]);
        let summary = summarize(&rounds, &a());

        assert!(summary.tags.contains(&PsychTag::Traitor));
        assert!(summary.tags.contains(&PsychTag::Opportunist));
        assert!(!summary.tags.contains(&PsychTag::Saint));
    }

    #[test]
    fn test_retaliator() {
        // B betrays in rounds 1 and 3; A answers both with a betrayal
        let rounds = ledger(&[(C, B), (B, C), (C, B), (B, C)]);
        let summary = summarize(&rounds, &a());

        assert!(summary.tags.contains(&PsychTag::Retaliator));
        assert!(!summary.tags.contains(&PsychTag::Forgiver));
    }

    #[test]
    fn test_summarize_record_resolves_by_id() {
        let now = Utc::now();
        let rounds = ledger(&[(B, C), (B, C)]);
        let record = MatchRecord {
            id: crate::models::MatchId::new(),
            player_a: crate::models::Player::human("a", "Alice"),
            player_b: crate::models::Player::human("b", "Bob"),
            max_rounds: 2,
            final_scores: crate::models::replay_totals(&rounds),
            rounds,
            winner: Some(a()),
            reason: crate::models::TerminationReason::Completed,
            started_at: now,
            ended_at: now,
        };

        let [sa, sb] = summarize_record(&record);
        assert_eq!(sa.player_id, a());
        assert_eq!(sa.total_points, 10);
        assert_eq!(sb.total_points, 0);
        assert_eq!(sb.cooperation_pct, 100.0);
    }
}
