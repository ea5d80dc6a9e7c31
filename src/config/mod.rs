//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::engine::{AiStrategy, PayoffMatrix};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,

    /// Finished matches whose event mailboxes stay pollable
    #[serde(default = "default_mailbox_retention")]
    pub mailbox_retention: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "*".to_string()
}

fn default_mailbox_retention() -> usize {
    crate::transport::DEFAULT_MAILBOX_RETENTION
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            mailbox_retention: default_mailbox_retention(),
        }
    }
}

/// Per-match settings, fixed when the match is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Seconds from round start until undecided players are auto-cooperated
    #[serde(default = "default_decision_deadline")]
    pub decision_deadline_seconds: u64,

    /// Seconds after a first decision during which it may be replaced
    #[serde(default = "default_reversal_window")]
    pub reversal_window_seconds: u64,

    /// Pause between a resolved round and the next one
    #[serde(default = "default_inter_round_delay")]
    pub inter_round_delay_seconds: u64,

    /// How long a disconnected player has to come back before forfeiting
    #[serde(default = "default_disconnect_grace")]
    pub disconnect_grace_seconds: u64,

    /// Strategy used for AI participants
    #[serde(default)]
    pub ai_strategy: AiStrategy,

    #[serde(default)]
    pub payoff: PayoffMatrix,
}

/// Upper bound for every per-match duration, in seconds.
pub const MAX_MATCH_DURATION_SECONDS: u64 = 24 * 60 * 60;

fn default_max_rounds() -> u32 {
    10
}

fn default_decision_deadline() -> u64 {
    30
}

fn default_reversal_window() -> u64 {
    5
}

fn default_inter_round_delay() -> u64 {
    3
}

fn default_disconnect_grace() -> u64 {
    30
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            decision_deadline_seconds: default_decision_deadline(),
            reversal_window_seconds: default_reversal_window(),
            inter_round_delay_seconds: default_inter_round_delay(),
            disconnect_grace_seconds: default_disconnect_grace(),
            ai_strategy: AiStrategy::default(),
            payoff: PayoffMatrix::default(),
        }
    }
}

impl MatchConfig {
    pub fn decision_deadline(&self) -> Duration {
        Duration::from_secs(self.decision_deadline_seconds)
    }

    pub fn reversal_window(&self) -> Duration {
        Duration::from_secs(self.reversal_window_seconds)
    }

    pub fn inter_round_delay(&self) -> Duration {
        Duration::from_secs(self.inter_round_delay_seconds)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "max_rounds must be greater than 0".to_string(),
            ));
        }

        if self.decision_deadline_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "decision_deadline_seconds must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("decision_deadline_seconds", self.decision_deadline_seconds),
            ("reversal_window_seconds", self.reversal_window_seconds),
            ("inter_round_delay_seconds", self.inter_round_delay_seconds),
            ("disconnect_grace_seconds", self.disconnect_grace_seconds),
        ] {
            if value > MAX_MATCH_DURATION_SECONDS {
                return Err(ConfigError::ValidationError(format!(
                    "{} ({}) must be at most {}",
                    name, value, MAX_MATCH_DURATION_SECONDS
                )));
            }
        }

        if self.reversal_window_seconds >= self.decision_deadline_seconds {
            return Err(ConfigError::ValidationError(format!(
                "reversal_window_seconds ({}) must be shorter than decision_deadline_seconds ({})",
                self.reversal_window_seconds, self.decision_deadline_seconds
            )));
        }

        if !self.payoff.is_dilemma() {
            return Err(ConfigError::ValidationError(format!(
                "payoff must satisfy temptation > reward > punishment > sucker, got {:?}",
                self.payoff
            )));
        }

        Ok(())
    }
}

/// How matchmaking ranges are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityPolicy {
    /// Each player must fall inside the other's range
    #[default]
    Mutual,
    /// Only the searching player's range is checked
    OneDirectional,
}

/// Trust score model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustConfig {
    #[serde(default = "default_baseline")]
    pub baseline: u8,

    /// Games after which history carries its full weight
    #[serde(default = "default_stabilization_games")]
    pub stabilization_games: u32,

    #[serde(default = "default_base_half_width")]
    pub base_half_width: f64,

    #[serde(default = "default_min_half_width")]
    pub min_half_width: f64,

    #[serde(default = "default_max_half_width")]
    pub max_half_width: f64,

    /// Extra half-width per point of distance from the baseline
    #[serde(default = "default_expansion")]
    pub expansion_per_point: f64,

    #[serde(default)]
    pub eligibility: EligibilityPolicy,
}

fn default_baseline() -> u8 {
    50
}

fn default_stabilization_games() -> u32 {
    50
}

fn default_base_half_width() -> f64 {
    15.0
}

fn default_min_half_width() -> f64 {
    15.0
}

fn default_max_half_width() -> f64 {
    40.0
}

fn default_expansion() -> f64 {
    0.3
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            baseline: default_baseline(),
            stabilization_games: default_stabilization_games(),
            base_half_width: default_base_half_width(),
            min_half_width: default_min_half_width(),
            max_half_width: default_max_half_width(),
            expansion_per_point: default_expansion(),
            eligibility: EligibilityPolicy::default(),
        }
    }
}

impl TrustConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baseline > 100 {
            return Err(ConfigError::ValidationError(
                "trust baseline must be within 0..=100".to_string(),
            ));
        }

        if self.stabilization_games == 0 {
            return Err(ConfigError::ValidationError(
                "stabilization_games must be greater than 0".to_string(),
            ));
        }

        if !(self.min_half_width <= self.base_half_width
            && self.base_half_width <= self.max_half_width)
        {
            return Err(ConfigError::ValidationError(
                "half widths must satisfy min <= base <= max".to_string(),
            ));
        }

        if self.expansion_per_point < 0.0 {
            return Err(ConfigError::ValidationError(
                "expansion_per_point must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}

/// Weights of the leaderboard composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    #[serde(default = "default_weight_average_score")]
    pub average_score: f64,

    #[serde(default = "default_weight_win_rate")]
    pub win_rate: f64,

    #[serde(default = "default_weight_trust")]
    pub trust: f64,

    #[serde(default = "default_weight_experience")]
    pub experience: f64,

    /// Average points per game that counts as a full score component
    #[serde(default = "default_reference_points")]
    pub reference_points_per_game: f64,

    /// Games after which experience stops adding to the composite
    #[serde(default = "default_experience_cap")]
    pub experience_cap_games: u32,
}

fn default_weight_average_score() -> f64 {
    0.30
}

fn default_weight_win_rate() -> f64 {
    0.30
}

fn default_weight_trust() -> f64 {
    0.25
}

fn default_weight_experience() -> f64 {
    0.15
}

fn default_reference_points() -> f64 {
    30.0
}

fn default_experience_cap() -> u32 {
    100
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            average_score: default_weight_average_score(),
            win_rate: default_weight_win_rate(),
            trust: default_weight_trust(),
            experience: default_weight_experience(),
            reference_points_per_game: default_reference_points(),
            experience_cap_games: default_experience_cap(),
        }
    }
}

impl LeaderboardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [self.average_score, self.win_rate, self.trust, self.experience];
        if weights.iter().any(|w| *w < 0.0) {
            return Err(ConfigError::ValidationError(
                "leaderboard weights must not be negative".to_string(),
            ));
        }

        if self.reference_points_per_game <= 0.0 || self.experience_cap_games == 0 {
            return Err(ConfigError::ValidationError(
                "leaderboard reference values must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default, rename = "match")]
    pub match_defaults: MatchConfig,

    #[serde(default)]
    pub trust: TrustConfig,

    #[serde(default)]
    pub leaderboard: LeaderboardConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            server: ServerConfig::default(),
            match_defaults: MatchConfig::default(),
            trust: TrustConfig::default(),
            leaderboard: LeaderboardConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".to_string(),
            ));
        }

        self.match_defaults.validate()?;
        self.trust.validate()?;
        self.leaderboard.validate()?;

        Ok(())
    }
}
