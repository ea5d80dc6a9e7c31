use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::MatchRegistry;
use crate::matchmaking::MatchmakingQueue;
use crate::storage::MatchStore;
use crate::transport::MailboxSink;
use crate::trust::TrustScoreEngine;

#[derive(Clone)]
pub struct AppState {
    pub registry: MatchRegistry,
    pub mailbox: Arc<MailboxSink>,
    pub store: Arc<dyn MatchStore>,
    pub trust: Arc<TrustScoreEngine>,
    pub matchmaking: Arc<tokio::sync::Mutex<MatchmakingQueue>>,
    pub cors_origin: String,
}

impl AppState {
    /// Wire the engine to a mailbox sink so HTTP clients can poll deliveries.
    pub fn new(config: &AppConfig, store: Arc<dyn MatchStore>) -> Self {
        let trust = Arc::new(TrustScoreEngine::new(
            config.trust.clone(),
            config.leaderboard.clone(),
        ));
        let mailbox = Arc::new(MailboxSink::with_retention(config.server.mailbox_retention));
        let registry = MatchRegistry::new(
            config.match_defaults.clone(),
            trust.clone(),
            store.clone(),
            mailbox.clone(),
        );

        Self {
            registry,
            mailbox,
            store,
            trust,
            matchmaking: Arc::new(tokio::sync::Mutex::new(MatchmakingQueue::new())),
            cors_origin: config.server.cors_origin.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_state(config: AppConfig) -> AppState {
    AppState::new(&config, Arc::new(crate::storage::MemoryMatchStore::new()))
}
