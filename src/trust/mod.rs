//! Trust score model.
//!
//! Turns cumulative counters into a 0-100 trust score, a matchmaking range and
//! a leaderboard composite. Everything here is pure arithmetic over `Stats`;
//! the only failure mode (no recorded decisions) degrades to the baseline.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{EligibilityPolicy, LeaderboardConfig, TrustConfig};
use crate::models::{GameResult, MatchOutcome, PlayerId, Stats};

/// Trust interval considered a fair pairing for a player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchmakingRange {
    pub center: u8,
    pub half_width: f64,
    pub min: u8,
    pub max: u8,
}

impl MatchmakingRange {
    pub fn contains(&self, trust_score: u8) -> bool {
        (self.min..=self.max).contains(&trust_score)
    }
}

/// Values recomputed from raw counters. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedStats {
    /// `None` when no decisions have been recorded yet
    pub cooperation_pct: Option<f64>,
    pub betrayal_pct: Option<f64>,
    pub win_rate: f64,
    pub average_score: f64,
    pub trust_score: u8,
    pub matchmaking_range: MatchmakingRange,
    pub leaderboard_score: f64,
}

/// Result of applying one match to a player's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsUpdate {
    pub stats: Stats,
    pub derived: DerivedStats,
}

/// A player's counters with everything derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStanding {
    pub player_id: PlayerId,
    pub display_name: String,
    pub stats: Stats,
    pub derived: DerivedStats,
}

pub struct TrustScoreEngine {
    trust: TrustConfig,
    leaderboard: LeaderboardConfig,
}

impl Default for TrustScoreEngine {
    fn default() -> Self {
        Self::new(TrustConfig::default(), LeaderboardConfig::default())
    }
}

impl TrustScoreEngine {
    pub fn new(trust: TrustConfig, leaderboard: LeaderboardConfig) -> Self {
        Self { trust, leaderboard }
    }

    pub fn baseline(&self) -> u8 {
        self.trust.baseline
    }

    /// Trust score in [0, 100], regressed toward the baseline for players
    /// with few games.
    pub fn trust_score(&self, stats: &Stats) -> u8 {
        let baseline = self.trust.baseline.min(100);
        if stats.total_games == 0 {
            return baseline;
        }

        let rate = match stats.cooperation_rate() {
            Ok(rate) => rate,
            Err(e) => {
                warn!(error = %e, "Malformed stats, using baseline trust");
                return baseline;
            }
        };

        let weight =
            (stats.total_games as f64 / self.trust.stabilization_games.max(1) as f64).min(1.0);
        let baseline = baseline as f64;
        let score = baseline + (rate * 100.0 - baseline) * weight;
        score.round().clamp(0.0, 100.0) as u8
    }

    /// Range centred on the score. It widens with distance from the baseline
    /// so players at the extremes can still find opponents.
    pub fn matchmaking_range(&self, trust_score: u8) -> MatchmakingRange {
        let center = trust_score.min(100);
        let distance = (center as f64 - self.trust.baseline as f64).abs();
        let half_width = (self.trust.base_half_width + self.trust.expansion_per_point * distance)
            .clamp(self.trust.min_half_width, self.trust.max_half_width);

        let min = (center as f64 - half_width).round().max(0.0) as u8;
        let max = (center as f64 + half_width).round().min(100.0) as u8;

        MatchmakingRange {
            center,
            half_width,
            min,
            max,
        }
    }

    /// Whether `candidate` is an acceptable opponent for `searching`.
    pub fn eligible(&self, searching: u8, candidate: u8) -> bool {
        let forward = self.matchmaking_range(searching).contains(candidate);
        match self.trust.eligibility {
            EligibilityPolicy::OneDirectional => forward,
            EligibilityPolicy::Mutual => {
                forward && self.matchmaking_range(candidate).contains(searching)
            }
        }
    }

    /// Fold one match into the counters and recompute everything derived.
    pub fn update_stats(&self, current: &Stats, outcome: &MatchOutcome) -> StatsUpdate {
        let mut stats = current.clone();
        stats.total_games += 1;
        stats.cooperations += outcome.cooperations;
        stats.betrayals += outcome.betrayals;
        stats.total_score += u64::from(outcome.score);
        match outcome.result {
            GameResult::Win => stats.wins += 1,
            GameResult::Loss => stats.losses += 1,
            GameResult::Draw => stats.draws += 1,
        }

        let derived = self.derive(&stats);
        StatsUpdate { stats, derived }
    }

    pub fn derive(&self, stats: &Stats) -> DerivedStats {
        let trust_score = self.trust_score(stats);
        DerivedStats {
            cooperation_pct: stats.cooperation_rate().ok().map(|r| r * 100.0),
            betrayal_pct: stats.betrayal_rate().ok().map(|r| r * 100.0),
            win_rate: stats.win_rate(),
            average_score: stats.average_score(),
            trust_score,
            matchmaking_range: self.matchmaking_range(trust_score),
            leaderboard_score: self.leaderboard_score(stats),
        }
    }

    /// Weighted composite in [0, 100]. Ranking only.
    pub fn leaderboard_score(&self, stats: &Stats) -> f64 {
        let cfg = &self.leaderboard;
        let total_weight = cfg.average_score + cfg.win_rate + cfg.trust + cfg.experience;
        if total_weight <= 0.0 {
            return 0.0;
        }

        let score = (stats.average_score() / cfg.reference_points_per_game).min(1.0);
        let win = stats.win_rate();
        let trust = self.trust_score(stats) as f64 / 100.0;
        let experience =
            (stats.total_games as f64 / cfg.experience_cap_games.max(1) as f64).min(1.0);

        let weighted = cfg.average_score * score
            + cfg.win_rate * win
            + cfg.trust * trust
            + cfg.experience * experience;
        100.0 * weighted / total_weight
    }

    pub fn standing(&self, player_id: PlayerId, display_name: String, stats: Stats) -> PlayerStanding {
        let derived = self.derive(&stats);
        PlayerStanding {
            player_id,
            display_name,
            stats,
            derived,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stats(games: u32, cooperations: u32, betrayals: u32) -> Stats {
        Stats {
            total_games: games,
            cooperations,
            betrayals,
            ..Stats::default()
        }
    }

    #[test]
    fn test_new_player_gets_baseline() {
        let engine = TrustScoreEngine::default();
        assert_eq!(engine.trust_score(&Stats::default()), 50);
    }

    #[test]
    fn test_malformed_counters_fall_back_to_baseline() {
        let engine = TrustScoreEngine::default();
        assert_eq!(engine.trust_score(&stats(4, 0, 0)), 50);
    }

    #[test]
    fn test_low_sample_regresses_toward_baseline() {
        let engine = TrustScoreEngine::default();

        // 5 games of pure cooperation: 50 + 50 * 0.1
        assert_eq!(engine.trust_score(&stats(5, 50, 0)), 55);
        // 25 games of pure betrayal: 50 - 50 * 0.5
        assert_eq!(engine.trust_score(&stats(25, 0, 250)), 25);
    }

    #[test]
    fn test_stabilized_player_uses_raw_rate() {
        let engine = TrustScoreEngine::default();
        assert_eq!(engine.trust_score(&stats(50, 80, 20)), 80);
        assert_eq!(engine.trust_score(&stats(500, 1000, 0)), 100);
        assert_eq!(engine.trust_score(&stats(200, 0, 1000)), 0);
    }

    #[test]
    fn test_trust_always_in_bounds() {
        let engine = TrustScoreEngine::default();
        for games in [0, 1, 10, 49, 50, 51, 1000] {
            for (c, b) in [(0, 0), (0, 7), (7, 0), (3, 4), (100, 1)] {
                let score = engine.trust_score(&stats(games, c, b));
                assert!(score <= 100, "{} for {:?}", score, (games, c, b));
            }
        }
    }

    #[test]
    fn test_range_at_baseline_has_base_width() {
        let engine = TrustScoreEngine::default();
        let range = engine.matchmaking_range(50);

        assert_eq!(range.half_width, 15.0);
        assert_eq!((range.min, range.max), (35, 65));
    }

    #[test]
    fn test_range_widens_at_extremes() {
        let engine = TrustScoreEngine::default();
        let center = engine.matchmaking_range(50);
        let low = engine.matchmaking_range(0);
        let high = engine.matchmaking_range(100);

        assert!(low.half_width > center.half_width);
        assert!(high.half_width > center.half_width);
        assert_eq!((low.min, low.max), (0, 30));
        assert_eq!((high.min, high.max), (70, 100));
    }

    #[test]
    fn test_range_respects_max_half_width() {
        let engine = TrustScoreEngine::new(
            TrustConfig {
                expansion_per_point: 2.0,
                ..TrustConfig::default()
            },
            LeaderboardConfig::default(),
        );
        assert_eq!(engine.matchmaking_range(0).half_width, 40.0);
    }

    #[test]
    fn test_mutual_eligibility() {
        let engine = TrustScoreEngine::default();

        assert!(engine.eligible(50, 60));
        // 20 is outside [35, 65]
        assert!(!engine.eligible(50, 20));
        // 0's range [0, 30] reaches 30, but 30's range [9, 51] misses 0
        assert!(engine.matchmaking_range(0).contains(30));
        assert!(!engine.eligible(0, 30));
        assert!(!engine.eligible(30, 0));
    }

    #[test]
    fn test_one_directional_eligibility() {
        let engine = TrustScoreEngine::new(
            TrustConfig {
                eligibility: EligibilityPolicy::OneDirectional,
                ..TrustConfig::default()
            },
            LeaderboardConfig::default(),
        );
        // The candidate's own range [9, 51] is never checked
        assert!(engine.eligible(0, 30));
        assert!(!engine.eligible(50, 20));
    }

    #[test]
    fn test_update_stats_recomputes_from_counters() {
        let engine = TrustScoreEngine::default();
        let outcome = MatchOutcome {
            cooperations: 8,
            betrayals: 2,
            score: 27,
            result: GameResult::Win,
        };
        let update = engine.update_stats(&Stats::default(), &outcome);

        assert_eq!(
            update.stats,
            Stats {
                total_games: 1,
                cooperations: 8,
                betrayals: 2,
                wins: 1,
                losses: 0,
                draws: 0,
                total_score: 27,
            }
        );
        assert_eq!(update.derived.cooperation_pct, Some(80.0));
        assert_eq!(update.derived.win_rate, 1.0);
        // 50 + (80 - 50) * 1/50 = 50.6
        assert_eq!(update.derived.trust_score, 51);
    }

    #[test]
    fn test_update_stats_does_not_mutate_input() {
        let engine = TrustScoreEngine::default();
        let current = stats(3, 10, 5);
        let outcome = MatchOutcome {
            cooperations: 0,
            betrayals: 10,
            score: 10,
            result: GameResult::Draw,
        };
        let update = engine.update_stats(&current, &outcome);

        assert_eq!(current.total_games, 3);
        assert_eq!(update.stats.total_games, 4);
        assert_eq!(update.stats.draws, 1);
        assert_eq!(update.stats.betrayals, 15);
    }

    #[test]
    fn test_leaderboard_score_bounds() {
        let engine = TrustScoreEngine::default();
        // Only the baseline trust contributes for a new player
        let fresh = engine.leaderboard_score(&Stats::default());
        assert!((fresh - 12.5).abs() < 1e-9);

        let veteran = Stats {
            total_games: 200,
            cooperations: 2000,
            betrayals: 0,
            wins: 200,
            losses: 0,
            draws: 0,
            total_score: 200 * 50,
        };
        let top = engine.leaderboard_score(&veteran);
        assert!((top - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_leaderboard_ranks_winners_higher() {
        let engine = TrustScoreEngine::default();
        let winner = Stats {
            total_games: 10,
            cooperations: 50,
            betrayals: 50,
            wins: 8,
            losses: 2,
            draws: 0,
            total_score: 250,
        };
        let loser = Stats {
            wins: 2,
            losses: 8,
            total_score: 150,
            ..winner.clone()
        };
        assert!(engine.leaderboard_score(&winner) > engine.leaderboard_score(&loser));
    }
}
