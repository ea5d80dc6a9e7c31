//! Filesystem storage for finished matches and player statistics.
//!
//! Layout under `data_dir`:
//! - `matches/match_records.jsonl`: archived match ledgers, append-only
//! - `players/player_stats.jsonl`: stats snapshots, latest line per player wins

mod jsonl;
mod store;

pub use jsonl::{EntityType, JsonlIterator, JsonlReader, JsonlWriter};
pub use store::{JsonlMatchStore, MatchStore, MemoryMatchStore, PlayerStatsEntry};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Storage lock poisoned: {0}")]
    Poisoned(String),
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn matches_dir(&self) -> PathBuf {
        self.data_dir.join("matches")
    }

    pub fn players_dir(&self) -> PathBuf {
        self.data_dir.join("players")
    }

    /// Path of the file holding one entity type.
    pub fn entity_path(&self, entity: EntityType) -> PathBuf {
        let dir = match entity {
            EntityType::MatchRecord => self.matches_dir(),
            EntityType::PlayerStats => self.players_dir(),
        };
        dir.join(entity.filename())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}
