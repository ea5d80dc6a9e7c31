//! Persistence of finished matches and cumulative stats.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{EntityType, JsonlReader, JsonlWriter, StorageConfig, StorageError};
use crate::models::{MatchId, MatchRecord, PlayerId, Stats};

/// Stored counters for one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatsEntry {
    pub player_id: PlayerId,
    pub display_name: String,
    pub stats: Stats,
    pub updated_at: DateTime<Utc>,
}

impl PlayerStatsEntry {
    pub fn new(player_id: PlayerId, display_name: String, stats: Stats) -> Self {
        Self {
            player_id,
            display_name,
            stats,
            updated_at: Utc::now(),
        }
    }
}

/// Where finalized matches and player stats end up.
pub trait MatchStore: Send + Sync {
    fn load_stats(&self, player_id: &PlayerId) -> Result<Option<PlayerStatsEntry>, StorageError>;

    fn save_stats(&self, entry: &PlayerStatsEntry) -> Result<(), StorageError>;

    /// Latest entry for every known player, ordered by player id.
    fn all_stats(&self) -> Result<Vec<PlayerStatsEntry>, StorageError>;

    fn archive_match(&self, record: &MatchRecord) -> Result<(), StorageError>;

    /// Archived matches, oldest first.
    fn list_matches(&self) -> Result<Vec<MatchRecord>, StorageError>;

    fn get_match(&self, id: MatchId) -> Result<Option<MatchRecord>, StorageError>;
}

/// JSONL-backed store.
pub struct JsonlMatchStore {
    config: StorageConfig,
    // Serializes appends from concurrent finalizations.
    write_lock: Mutex<()>,
}

impl JsonlMatchStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
        }
    }

    /// Open the store and compact the stats file down to one line per player.
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        let store = Self::new(config);
        let kept = store.compact_stats()?;
        info!(players = kept, data_dir = ?store.config.data_dir, "Opened match store");
        Ok(store)
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Rewrite the stats file keeping only the latest line per player.
    pub fn compact_stats(&self) -> Result<usize, StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?;

        let reader: JsonlReader<PlayerStatsEntry> =
            JsonlReader::for_entity(&self.config, EntityType::PlayerStats);
        if !reader.exists() {
            return Ok(0);
        }

        let latest = latest_per_player(reader.read_all()?);
        JsonlWriter::for_entity(&self.config, EntityType::PlayerStats).write_all(&latest)
    }

    fn append<T: Serialize>(&self, entity: EntityType, value: &T) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?;
        JsonlWriter::for_entity(&self.config, entity).append(value)
    }
}

fn latest_per_player(entries: Vec<PlayerStatsEntry>) -> Vec<PlayerStatsEntry> {
    let mut latest: BTreeMap<PlayerId, PlayerStatsEntry> = BTreeMap::new();
    for entry in entries {
        latest.insert(entry.player_id.clone(), entry);
    }
    latest.into_values().collect()
}

impl MatchStore for JsonlMatchStore {
    fn load_stats(&self, player_id: &PlayerId) -> Result<Option<PlayerStatsEntry>, StorageError> {
        let reader: JsonlReader<PlayerStatsEntry> =
            JsonlReader::for_entity(&self.config, EntityType::PlayerStats);
        Ok(reader
            .read_all()?
            .into_iter()
            .filter(|e| &e.player_id == player_id)
            .last())
    }

    fn save_stats(&self, entry: &PlayerStatsEntry) -> Result<(), StorageError> {
        self.append(EntityType::PlayerStats, entry)
    }

    fn all_stats(&self) -> Result<Vec<PlayerStatsEntry>, StorageError> {
        let reader: JsonlReader<PlayerStatsEntry> =
            JsonlReader::for_entity(&self.config, EntityType::PlayerStats);
        Ok(latest_per_player(reader.read_all()?))
    }

    fn archive_match(&self, record: &MatchRecord) -> Result<(), StorageError> {
        self.append(EntityType::MatchRecord, record)
    }

    fn list_matches(&self) -> Result<Vec<MatchRecord>, StorageError> {
        JsonlReader::for_entity(&self.config, EntityType::MatchRecord).read_all()
    }

    fn get_match(&self, id: MatchId) -> Result<Option<MatchRecord>, StorageError> {
        let reader: JsonlReader<MatchRecord> =
            JsonlReader::for_entity(&self.config, EntityType::MatchRecord);
        if !reader.exists() {
            return Ok(None);
        }

        for item in reader.iter()? {
            match item {
                Ok(record) if record.id == id => return Ok(Some(record)),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Skipping unreadable match record"),
            }
        }
        Ok(None)
    }
}

/// In-memory store for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryMatchStore {
    stats: RwLock<HashMap<PlayerId, PlayerStatsEntry>>,
    matches: RwLock<Vec<MatchRecord>>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Poisoned(e.to_string())
}

impl MatchStore for MemoryMatchStore {
    fn load_stats(&self, player_id: &PlayerId) -> Result<Option<PlayerStatsEntry>, StorageError> {
        Ok(self.stats.read().map_err(poisoned)?.get(player_id).cloned())
    }

    fn save_stats(&self, entry: &PlayerStatsEntry) -> Result<(), StorageError> {
        self.stats
            .write()
            .map_err(poisoned)?
            .insert(entry.player_id.clone(), entry.clone());
        Ok(())
    }

    fn all_stats(&self) -> Result<Vec<PlayerStatsEntry>, StorageError> {
        let mut all: Vec<_> = self.stats.read().map_err(poisoned)?.values().cloned().collect();
        all.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        Ok(all)
    }

    fn archive_match(&self, record: &MatchRecord) -> Result<(), StorageError> {
        self.matches.write().map_err(poisoned)?.push(record.clone());
        Ok(())
    }

    fn list_matches(&self) -> Result<Vec<MatchRecord>, StorageError> {
        Ok(self.matches.read().map_err(poisoned)?.clone())
    }

    fn get_match(&self, id: MatchId) -> Result<Option<MatchRecord>, StorageError> {
        Ok(self
            .matches
            .read()
            .map_err(poisoned)?
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Player, ScorePair, TerminationReason};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn entry(player: &str, games: u32) -> PlayerStatsEntry {
        PlayerStatsEntry::new(
            PlayerId::from(player),
            player.to_uppercase(),
            Stats {
                total_games: games,
                ..Stats::default()
            },
        )
    }

    fn record() -> MatchRecord {
        let now = Utc::now();
        MatchRecord {
            id: MatchId::new(),
            player_a: Player::human("a", "Alice"),
            player_b: Player::human("b", "Bob"),
            max_rounds: 3,
            rounds: Vec::new(),
            final_scores: ScorePair::default(),
            winner: Some(PlayerId::from("a")),
            reason: TerminationReason::Forfeit,
            started_at: now,
            ended_at: now,
        }
    }

    fn exercise(store: &dyn MatchStore) {
        assert_eq!(store.load_stats(&PlayerId::from("a")).unwrap(), None);

        store.save_stats(&entry("b", 1)).unwrap();
        store.save_stats(&entry("a", 1)).unwrap();
        store.save_stats(&entry("a", 2)).unwrap();

        let a = store.load_stats(&PlayerId::from("a")).unwrap().unwrap();
        assert_eq!(a.stats.total_games, 2);

        let all = store.all_stats().unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.player_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(all[0].stats.total_games, 2);

        let first = record();
        let second = record();
        store.archive_match(&first).unwrap();
        store.archive_match(&second).unwrap();

        assert_eq!(store.list_matches().unwrap().len(), 2);
        assert_eq!(store.get_match(second.id).unwrap(), Some(second));
        assert_eq!(store.get_match(MatchId::new()).unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryMatchStore::new());
    }

    #[test]
    fn test_jsonl_store() {
        let tmp = TempDir::new().unwrap();
        exercise(&JsonlMatchStore::new(StorageConfig::new(tmp.path().to_path_buf())));
    }

    #[test]
    fn test_jsonl_store_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let store = JsonlMatchStore::open(StorageConfig::new(tmp.path().join("fresh"))).unwrap();

        assert!(store.all_stats().unwrap().is_empty());
        assert!(store.list_matches().unwrap().is_empty());
        assert_eq!(store.get_match(MatchId::new()).unwrap(), None);
    }

    #[test]
    fn test_open_compacts_stats() {
        let tmp = TempDir::new().unwrap();
        let config = StorageConfig::new(tmp.path().to_path_buf());
        {
            let store = JsonlMatchStore::new(config.clone());
            for games in 1..=5 {
                store.save_stats(&entry("a", games)).unwrap();
            }
        }

        let store = JsonlMatchStore::open(config.clone()).unwrap();
        let raw = std::fs::read_to_string(config.entity_path(EntityType::PlayerStats)).unwrap();
        assert_eq!(raw.lines().count(), 1);
        assert_eq!(
            store
                .load_stats(&PlayerId::from("a"))
                .unwrap()
                .unwrap()
                .stats
                .total_games,
            5
        );
    }
}
