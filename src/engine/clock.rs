//! Per-match timer source.
//!
//! Timers never touch match state. A fire only posts a `TimerToken` into the
//! owning worker's queue, where it is applied like any other event. Tokens
//! carry the generation they were armed under, so a fire that slipped past an
//! abort is discarded by the state machine.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::Slot;

/// The independent timers a match can have armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// End of the pause between two rounds
    RoundStart,
    DecisionDeadline,
    ReversalDeadline,
    DisconnectGrace(Slot),
}

/// What a timer delivers when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub round: u32,
    pub generation: u64,
}

/// Request to arm a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub token: TimerToken,
    pub after: Duration,
}

/// Cancellable timers for one match, backed by tokio tasks.
pub struct RoundClock {
    tx: mpsc::UnboundedSender<TimerToken>,
    pending: HashMap<TimerKind, JoinHandle<()>>,
}

impl RoundClock {
    pub fn new(tx: mpsc::UnboundedSender<TimerToken>) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
        }
    }

    /// Arm a timer, replacing any pending timer of the same kind.
    pub fn schedule(&mut self, request: TimerRequest) {
        let kind = request.token.kind;
        self.cancel(kind);

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(request.after).await;
            // The worker may already be gone.
            let _ = tx.send(request.token);
        });

        debug!(?kind, round = request.token.round, after = ?request.after, "Timer armed");
        self.pending.insert(kind, handle);
    }

    /// Abort a pending timer. Returns whether one was pending.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.pending.remove(&kind) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort the decision and reversal deadlines of the current round.
    pub fn cancel_round(&mut self) {
        self.cancel(TimerKind::DecisionDeadline);
        self.cancel(TimerKind::ReversalDeadline);
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }

    /// Whether a timer of this kind is armed and has not fired yet.
    pub fn is_pending(&mut self, kind: TimerKind) -> bool {
        self.pending.retain(|_, h| !h.is_finished());
        self.pending.contains_key(&kind)
    }
}

impl Drop for RoundClock {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(kind: TimerKind, round: u32) -> TimerToken {
        TimerToken {
            kind,
            round,
            generation: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = RoundClock::new(tx);

        clock.schedule(TimerRequest {
            token: token(TimerKind::DecisionDeadline, 1),
            after: Duration::from_secs(30),
        });

        let early = tokio::time::timeout(Duration::from_secs(29), rx.recv()).await;
        assert!(early.is_err());

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.kind, TimerKind::DecisionDeadline);
        assert_eq!(fired.round, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = RoundClock::new(tx);

        clock.schedule(TimerRequest {
            token: token(TimerKind::ReversalDeadline, 1),
            after: Duration::from_secs(5),
        });
        assert!(clock.is_pending(TimerKind::ReversalDeadline));
        assert!(clock.cancel(TimerKind::ReversalDeadline));
        assert!(!clock.is_pending(TimerKind::ReversalDeadline));

        let fired = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = RoundClock::new(tx);

        clock.schedule(TimerRequest {
            token: token(TimerKind::RoundStart, 2),
            after: Duration::from_secs(3),
        });
        clock.schedule(TimerRequest {
            token: token(TimerKind::RoundStart, 3),
            after: Duration::from_secs(10),
        });

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.round, 3);
        let extra = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_round_keeps_grace_timers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = RoundClock::new(tx);

        clock.schedule(TimerRequest {
            token: token(TimerKind::DecisionDeadline, 1),
            after: Duration::from_secs(30),
        });
        clock.schedule(TimerRequest {
            token: token(TimerKind::ReversalDeadline, 1),
            after: Duration::from_secs(5),
        });
        clock.schedule(TimerRequest {
            token: token(TimerKind::DisconnectGrace(Slot::B), 0),
            after: Duration::from_secs(40),
        });

        clock.cancel_round();

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.kind, TimerKind::DisconnectGrace(Slot::B));
    }
}
