//! One task per live match.
//!
//! The worker owns the state machine and its clock. Inbound events and timer
//! fires arrive on two queues and are applied one at a time, so nothing inside
//! a match ever runs concurrently.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::clock::{RoundClock, TimerToken};
use super::messages::{InboundEvent, Outbound};
use super::state_machine::{Effect, MatchSnapshot, MatchStateMachine};
use super::EngineError;
use crate::models::{MatchId, MatchRecord, PlayerId, Slot};
use crate::transport::OutboundSink;

const COMMAND_BUFFER: usize = 64;

enum MatchCommand {
    Inbound {
        event: InboundEvent,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Snapshot {
        reply: oneshot::Sender<MatchSnapshot>,
    },
}

/// Handle to a running match.
#[derive(Clone)]
pub struct MatchHandle {
    id: MatchId,
    players: [PlayerId; 2],
    tx: mpsc::Sender<MatchCommand>,
}

impl MatchHandle {
    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn has_player(&self, player_id: &PlayerId) -> bool {
        self.players.contains(player_id)
    }

    /// Queue an event and wait until the worker has applied it.
    pub async fn send(&self, event: InboundEvent) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MatchCommand::Inbound { event, reply })
            .await
            .map_err(|_| EngineError::MatchClosed(self.id))?;
        rx.await.map_err(|_| EngineError::MatchClosed(self.id))?
    }

    /// Current state, or `None` once the worker has stopped.
    pub async fn snapshot(&self) -> Option<MatchSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(MatchCommand::Snapshot { reply }).await.ok()?;
        rx.await.ok()
    }
}

/// The task that drives a single match.
pub struct MatchWorker {
    machine: MatchStateMachine,
    clock: RoundClock,
    commands: mpsc::Receiver<MatchCommand>,
    timers: mpsc::UnboundedReceiver<TimerToken>,
    sink: Arc<dyn OutboundSink>,
}

impl MatchWorker {
    pub fn new(machine: MatchStateMachine, sink: Arc<dyn OutboundSink>) -> (Self, MatchHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (timer_tx, timers) = mpsc::unbounded_channel();

        let handle = MatchHandle {
            id: machine.id(),
            players: [
                machine.player(Slot::A).id.clone(),
                machine.player(Slot::B).id.clone(),
            ],
            tx,
        };

        let worker = Self {
            machine,
            clock: RoundClock::new(timer_tx),
            commands,
            timers,
            sink,
        };

        (worker, handle)
    }

    /// Run until the match ends. Returns the archived record.
    pub async fn run(mut self) -> Option<MatchRecord> {
        let match_id = self.machine.id();
        debug!(%match_id, "Match worker started");

        let effects = self.machine.start(Utc::now());
        self.apply(effects).await;

        while !self.machine.phase().is_terminal() {
            tokio::select! {
                Some(command) = self.commands.recv() => self.handle_command(command).await,
                Some(token) = self.timers.recv() => {
                    let effects = self.machine.on_timer(token, Utc::now());
                    self.apply(effects).await;
                }
                else => break,
            }
        }

        self.clock.cancel_all();
        let record = self.machine.record();
        if record.is_none() {
            warn!(%match_id, "Match worker stopped before the match ended");
        }
        record
    }

    async fn handle_command(&mut self, command: MatchCommand) {
        match command {
            MatchCommand::Inbound { event, reply } => {
                let result = self.handle_event(event).await;
                // The caller may have given up waiting.
                let _ = reply.send(result);
            }
            MatchCommand::Snapshot { reply } => {
                let _ = reply.send(self.machine.snapshot());
            }
        }
    }

    async fn handle_event(&mut self, event: InboundEvent) -> Result<(), EngineError> {
        let now = Utc::now();
        // AI slots are driven by the worker alone
        let outcome = if self.is_ai(event.player_id()) {
            Err(EngineError::NotAParticipant {
                match_id: self.machine.id(),
                player_id: event.player_id().clone(),
            })
        } else {
            match &event {
                InboundEvent::SubmitDecision {
                    player_id,
                    decision,
                    ..
                } => self.machine.submit_decision(player_id, *decision, now),
                InboundEvent::LeaveMatch { player_id, .. } => self.machine.leave(player_id, now),
                InboundEvent::PlayerDisconnected { player_id, .. } => {
                    self.machine.disconnect(player_id, now)
                }
                InboundEvent::PlayerReconnected { player_id, .. } => {
                    self.machine.reconnect(player_id, now)
                }
            }
        };

        match outcome {
            Ok(effects) => {
                self.apply(effects).await;
                Ok(())
            }
            Err(err) => {
                let match_id = self.machine.id();
                let player_id = event.player_id();
                if err.is_protocol_violation() {
                    warn!(
                        %match_id,
                        player = %player_id,
                        event = event.kind(),
                        error = %err,
                        "Rejected inbound event"
                    );
                } else {
                    debug!(%match_id, player = %player_id, error = %err, "Late inbound event");
                }

                if self.machine.slot_of(player_id).is_some() && !self.is_ai(player_id) {
                    let round_number = match &err {
                        EngineError::DecisionFinal { round, .. } => Some(*round),
                        _ => self.machine.open_round().map(|r| r.number),
                    };
                    self.sink
                        .send_to_player(
                            match_id,
                            player_id,
                            Outbound::DecisionRejected {
                                match_id,
                                round_number,
                                reason: err.to_string(),
                            },
                        )
                        .await;
                }
                Err(err)
            }
        }
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        let match_id = self.machine.id();
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Schedule(request) => self.clock.schedule(request),
                Effect::CancelRoundTimers => self.clock.cancel_round(),
                Effect::CancelTimer(kind) => {
                    self.clock.cancel(kind);
                }
                Effect::CancelAllTimers => self.clock.cancel_all(),
                Effect::Broadcast(message) => self.sink.broadcast(match_id, message).await,
                Effect::SendTo(player_id, message) => {
                    if !self.is_ai(&player_id) {
                        self.sink.send_to_player(match_id, &player_id, message).await;
                    }
                }
                Effect::RoundOpened(round) => queue.extend(self.play_ai_turns(round)),
                Effect::Ended => info!(%match_id, "Match worker finishing"),
            }
        }
    }

    fn is_ai(&self, player_id: &PlayerId) -> bool {
        self.machine
            .slot_of(player_id)
            .map(|slot| self.machine.player(slot).is_ai)
            .unwrap_or(false)
    }

    /// Submit choices for AI participants in a freshly opened round.
    fn play_ai_turns(&mut self, round: u32) -> Vec<Effect> {
        let default_strategy = self.machine.config().ai_strategy;
        let mut effects = Vec::new();

        for slot in Slot::BOTH {
            let still_open = self
                .machine
                .open_round()
                .map(|r| r.number == round && r.decision(slot).is_none())
                .unwrap_or(false);
            if !self.machine.player(slot).is_ai || !still_open {
                continue;
            }

            let strategy = self.machine.player(slot).strategy.unwrap_or(default_strategy);
            let choice = strategy.choose(
                &self.machine.history(slot),
                &self.machine.history(slot.other()),
            );
            let player_id = self.machine.player(slot).id.clone();
            debug!(match_id = %self.machine.id(), round, player = %player_id, %choice, "AI decision");

            match self.machine.submit_decision(&player_id, choice, Utc::now()) {
                Ok(more) => effects.extend(more),
                Err(err) => warn!(match_id = %self.machine.id(), error = %err, "AI decision rejected"),
            }
        }
        effects
    }
}
