//! Outbound delivery.
//!
//! The engine never writes to sockets. It hands every message to an
//! `OutboundSink`, which decides how it reaches players.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::engine::Outbound;
use crate::models::{MatchId, PlayerId};

/// Destination for messages produced by match workers.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    /// Deliver to one participant.
    async fn send_to_player(&self, match_id: MatchId, player_id: &PlayerId, message: Outbound);

    /// Deliver to both participants.
    async fn broadcast(&self, match_id: MatchId, message: Outbound);

    /// The match has been finalized and will produce no more deliveries.
    async fn release(&self, _match_id: MatchId) {}
}

/// Who a delivery is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "player_id", rename_all = "snake_case")]
pub enum Recipient {
    Match,
    Player(PlayerId),
}

impl Recipient {
    /// Whether this delivery is visible to the given player.
    pub fn includes(&self, player_id: &PlayerId) -> bool {
        match self {
            Recipient::Match => true,
            Recipient::Player(p) => p == player_id,
        }
    }
}

/// A message as handed to the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub seq: u64,
    pub match_id: MatchId,
    pub recipient: Recipient,
    pub message: Outbound,
    pub sent_at: DateTime<Utc>,
}

/// Forwards every delivery into an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Delivery>,
    seq: AtomicU64,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                seq: AtomicU64::new(0),
            },
            rx,
        )
    }

    fn push(&self, match_id: MatchId, recipient: Recipient, message: Outbound) {
        let delivery = Delivery {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            match_id,
            recipient,
            message,
            sent_at: Utc::now(),
        };
        if self.tx.send(delivery).is_err() {
            trace!(%match_id, "Delivery receiver dropped");
        }
    }
}

#[async_trait]
impl OutboundSink for ChannelSink {
    async fn send_to_player(&self, match_id: MatchId, player_id: &PlayerId, message: Outbound) {
        self.push(match_id, Recipient::Player(player_id.clone()), message);
    }

    async fn broadcast(&self, match_id: MatchId, message: Outbound) {
        self.push(match_id, Recipient::Match, message);
    }
}

/// Finished matches whose mailboxes are kept by default.
pub const DEFAULT_MAILBOX_RETENTION: usize = 256;

#[derive(Default)]
struct Mailboxes {
    boxes: HashMap<MatchId, Vec<Delivery>>,
    /// Released matches, oldest first
    finished: VecDeque<MatchId>,
}

/// Keeps deliveries per match so HTTP clients can poll for them.
///
/// Live matches keep everything. Once a match is released its box stays
/// readable until `retain_finished` newer matches have been released.
pub struct MailboxSink {
    inner: RwLock<Mailboxes>,
    retain_finished: usize,
    seq: AtomicU64,
}

impl Default for MailboxSink {
    fn default() -> Self {
        Self::with_retention(DEFAULT_MAILBOX_RETENTION)
    }
}

impl MailboxSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retain_finished: usize) -> Self {
        Self {
            inner: RwLock::new(Mailboxes::default()),
            retain_finished,
            seq: AtomicU64::new(0),
        }
    }

    fn push(&self, match_id: MatchId, recipient: Recipient, message: Outbound) {
        let delivery = Delivery {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            match_id,
            recipient,
            message,
            sent_at: Utc::now(),
        };
        match self.inner.write() {
            Ok(mut inner) => inner.boxes.entry(match_id).or_default().push(delivery),
            Err(_) => warn!(%match_id, "Mailbox lock poisoned, dropping delivery"),
        }
    }

    /// Deliveries for a match with `seq > since` that the given player may
    /// see. Without a player only match-wide broadcasts are returned.
    pub fn events_for(
        &self,
        match_id: MatchId,
        player_id: Option<&PlayerId>,
        since: u64,
    ) -> Vec<Delivery> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        inner
            .boxes
            .get(&match_id)
            .map(|deliveries| {
                deliveries
                    .iter()
                    .filter(|d| d.seq > since)
                    .filter(|d| match player_id {
                        Some(p) => d.recipient.includes(p),
                        None => d.recipient == Recipient::Match,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_match(&self, match_id: MatchId) -> bool {
        self.inner
            .read()
            .map(|inner| inner.boxes.contains_key(&match_id))
            .unwrap_or(false)
    }

    /// Number of mailboxes currently held.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.boxes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release_box(&self, match_id: MatchId) {
        let Ok(mut inner) = self.inner.write() else {
            warn!(%match_id, "Mailbox lock poisoned, cannot release");
            return;
        };
        if !inner.boxes.contains_key(&match_id) || inner.finished.contains(&match_id) {
            return;
        }

        inner.finished.push_back(match_id);
        while inner.finished.len() > self.retain_finished {
            if let Some(evicted) = inner.finished.pop_front() {
                inner.boxes.remove(&evicted);
                trace!(match_id = %evicted, "Evicted finished mailbox");
            }
        }
    }
}

#[async_trait]
impl OutboundSink for MailboxSink {
    async fn send_to_player(&self, match_id: MatchId, player_id: &PlayerId, message: Outbound) {
        self.push(match_id, Recipient::Player(player_id.clone()), message);
    }

    async fn broadcast(&self, match_id: MatchId, message: Outbound) {
        self.push(match_id, Recipient::Match, message);
    }

    async fn release(&self, match_id: MatchId) {
        self.release_box(match_id);
    }
}
