//! FIFO matchmaking bounded by trust score ranges.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::models::{Player, PlayerId};
use crate::trust::TrustScoreEngine;

/// A player waiting for an opponent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub player: Player,
    pub trust_score: u8,
    pub enqueued_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(player: Player, trust_score: u8) -> Self {
        Self {
            player,
            trust_score,
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueueOutcome {
    /// No eligible opponent yet. Position is 1-based.
    Waiting { position: usize },
    /// Paired with the longest-waiting eligible candidate.
    Paired { waiting: Candidate, newcomer: Candidate },
    AlreadyQueued,
}

#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    waiting: VecDeque<Candidate>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair the newcomer or add them to the back of the queue.
    pub fn enqueue(&mut self, newcomer: Candidate, trust: &TrustScoreEngine) -> QueueOutcome {
        if self.contains(&newcomer.player.id) {
            return QueueOutcome::AlreadyQueued;
        }

        let found = self
            .waiting
            .iter()
            .position(|c| trust.eligible(newcomer.trust_score, c.trust_score));

        if let Some(waiting) = found.and_then(|i| self.waiting.remove(i)) {
            info!(
                waiting = %waiting.player.id,
                newcomer = %newcomer.player.id,
                waiting_trust = waiting.trust_score,
                newcomer_trust = newcomer.trust_score,
                "Matchmaking pair found"
            );
            return QueueOutcome::Paired { waiting, newcomer };
        }

        debug!(player = %newcomer.player.id, trust = newcomer.trust_score, "Queued for matchmaking");
        self.waiting.push_back(newcomer);
        QueueOutcome::Waiting {
            position: self.waiting.len(),
        }
    }

    /// Put a candidate back at the head of the queue without pairing.
    pub fn requeue_front(&mut self, candidate: Candidate) {
        if !self.contains(&candidate.player.id) {
            self.waiting.push_front(candidate);
        }
    }

    /// Withdraw a waiting player.
    pub fn remove(&mut self, player_id: &PlayerId) -> Option<Candidate> {
        let index = self.waiting.iter().position(|c| &c.player.id == player_id)?;
        self.waiting.remove(index)
    }

    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.waiting.iter().any(|c| &c.player.id == player_id)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
