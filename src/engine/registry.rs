//! Process-wide table of live matches.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use super::messages::{InboundEvent, Outbound};
use super::state_machine::{MatchSnapshot, MatchStateMachine};
use super::worker::{MatchHandle, MatchWorker};
use super::EngineError;
use crate::calculate::{summarize_record, PlayerMatchSummary};
use crate::config::MatchConfig;
use crate::models::{MatchId, MatchOutcome, MatchRecord, Player, Slot, Stats};
use crate::storage::{MatchStore, PlayerStatsEntry};
use crate::transport::OutboundSink;
use crate::trust::{PlayerStanding, TrustScoreEngine};

const COMPLETION_BUFFER: usize = 64;

/// Everything produced when a match is finalized.
#[derive(Debug, Clone)]
pub struct FinalizedMatch {
    pub record: MatchRecord,
    /// Slot order
    pub summaries: [PlayerMatchSummary; 2],
    /// Updated standings, slot order
    pub standings: [PlayerStanding; 2],
}

struct RegistryInner {
    matches: RwLock<HashMap<MatchId, MatchHandle>>,
    defaults: MatchConfig,
    trust: Arc<TrustScoreEngine>,
    store: Arc<dyn MatchStore>,
    sink: Arc<dyn OutboundSink>,
    completions: broadcast::Sender<FinalizedMatch>,
}

/// Routes inbound events to match workers and finalizes matches once they end.
#[derive(Clone)]
pub struct MatchRegistry {
    inner: Arc<RegistryInner>,
}

impl MatchRegistry {
    pub fn new(
        defaults: MatchConfig,
        trust: Arc<TrustScoreEngine>,
        store: Arc<dyn MatchStore>,
        sink: Arc<dyn OutboundSink>,
    ) -> Self {
        let (completions, _) = broadcast::channel(COMPLETION_BUFFER);
        Self {
            inner: Arc::new(RegistryInner {
                matches: RwLock::new(HashMap::new()),
                defaults,
                trust,
                store,
                sink,
                completions,
            }),
        }
    }

    pub fn defaults(&self) -> &MatchConfig {
        &self.inner.defaults
    }

    pub fn trust(&self) -> &Arc<TrustScoreEngine> {
        &self.inner.trust
    }

    pub fn store(&self) -> &Arc<dyn MatchStore> {
        &self.inner.store
    }

    /// Create a match between two players and start its worker.
    ///
    /// `config` overrides the registry defaults for this match only.
    pub async fn create_match(
        &self,
        players: [Player; 2],
        config: Option<MatchConfig>,
    ) -> Result<MatchId, EngineError> {
        let config = config.unwrap_or_else(|| self.inner.defaults.clone());
        config
            .validate()
            .map_err(|e| EngineError::InvalidSetup(e.to_string()))?;

        if players[0].id == players[1].id {
            return Err(EngineError::InvalidSetup(format!(
                "player {} cannot play against themselves",
                players[0].id
            )));
        }

        let players = players.map(|p| self.with_history(p));
        let id = MatchId::new();
        let machine = MatchStateMachine::new(id, players, config, Utc::now());
        let (worker, handle) = MatchWorker::new(machine, self.inner.sink.clone());

        self.inner.matches.write().await.insert(id, handle);
        info!(match_id = %id, "Match created");

        let registry = self.clone();
        tokio::spawn(async move {
            let record = match tokio::spawn(worker.run()).await {
                Ok(record) => record,
                Err(e) => {
                    error!(match_id = %id, error = %e, "Match worker crashed");
                    None
                }
            };
            registry.finalize(id, record).await;
        });

        Ok(id)
    }

    /// Route an inbound event to its match.
    ///
    /// Events for unknown matches are dropped and logged.
    pub async fn dispatch(&self, event: InboundEvent) -> Result<(), EngineError> {
        let match_id = event.match_id();
        let handle = self.inner.matches.read().await.get(&match_id).cloned();
        let Some(handle) = handle else {
            warn!(
                %match_id,
                player = %event.player_id(),
                event = event.kind(),
                "Dropping event for unknown match"
            );
            return Err(EngineError::UnknownMatch(match_id));
        };

        if !handle.has_player(event.player_id()) {
            warn!(
                %match_id,
                player = %event.player_id(),
                event = event.kind(),
                "Dropping event from a non-participant"
            );
            return Err(EngineError::NotAParticipant {
                match_id,
                player_id: event.player_id().clone(),
            });
        }

        debug!(%match_id, event = event.kind(), "Dispatching event");
        handle.send(event).await
    }

    pub async fn snapshot(&self, match_id: MatchId) -> Option<MatchSnapshot> {
        let handle = self.inner.matches.read().await.get(&match_id).cloned()?;
        handle.snapshot().await
    }

    /// Snapshots of every live match.
    pub async fn live_matches(&self) -> Vec<MatchSnapshot> {
        let handles: Vec<MatchHandle> = self.inner.matches.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(snapshot) = handle.snapshot().await {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by_key(|s| s.match_id.to_string());
        snapshots
    }

    pub async fn active_count(&self) -> usize {
        self.inner.matches.read().await.len()
    }

    /// Notified once per finalized match.
    pub fn subscribe_completions(&self) -> broadcast::Receiver<FinalizedMatch> {
        self.inner.completions.subscribe()
    }

    fn load_stats(&self, player: &Player) -> Stats {
        match self.inner.store.load_stats(&player.id) {
            Ok(entry) => entry.map(|e| e.stats).unwrap_or_default(),
            Err(e) => {
                warn!(player = %player.id, error = %e, "Failed to load stats, starting fresh");
                Stats::default()
            }
        }
    }

    /// Stamp the player's current trust score and game count.
    fn with_history(&self, player: Player) -> Player {
        let stats = self.load_stats(&player);
        let trust = self.inner.trust.trust_score(&stats);
        let games = stats.total_games;
        player.with_history(trust, games)
    }

    async fn finalize(&self, match_id: MatchId, record: Option<MatchRecord>) {
        self.inner.matches.write().await.remove(&match_id);

        let Some(record) = record else {
            warn!(%match_id, "Match ended without a record, nothing to finalize");
            self.inner.sink.release(match_id).await;
            return;
        };

        let summaries = summarize_record(&record);
        let standings = Slot::BOTH.map(|slot| self.apply_outcome(&record, slot));

        if let Err(e) = self.inner.store.archive_match(&record) {
            warn!(%match_id, error = %e, "Failed to archive match");
        }

        for slot in Slot::BOTH {
            let player = record.player(slot);
            if player.is_ai {
                continue;
            }
            self.inner
                .sink
                .send_to_player(
                    match_id,
                    &player.id,
                    Outbound::MatchSummary {
                        match_id,
                        summary: summaries[slot.index()].clone(),
                        standing: standings[slot.index()].clone(),
                    },
                )
                .await;
        }

        info!(
            %match_id,
            reason = %record.reason,
            rounds = record.resolved_rounds().count(),
            "Match finalized"
        );

        self.inner.sink.release(match_id).await;

        // Nobody may be listening.
        let _ = self.inner.completions.send(FinalizedMatch {
            record,
            summaries,
            standings,
        });
    }

    fn apply_outcome(&self, record: &MatchRecord, slot: Slot) -> PlayerStanding {
        let player = record.player(slot);
        let outcome = MatchOutcome::for_slot(record, slot);
        let current = self.load_stats(player);
        let update = self.inner.trust.update_stats(&current, &outcome);

        let entry = PlayerStatsEntry::new(
            player.id.clone(),
            player.display_name.clone(),
            update.stats.clone(),
        );
        if let Err(e) = self.inner.store.save_stats(&entry) {
            warn!(player = %player.id, error = %e, "Failed to save stats");
        }

        PlayerStanding {
            player_id: player.id.clone(),
            display_name: player.display_name.clone(),
            stats: update.stats,
            derived: update.derived,
        }
    }
}
