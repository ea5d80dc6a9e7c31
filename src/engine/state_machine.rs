//! Authoritative state of a single match.
//!
//! The machine is synchronous and owns no timers or sockets. Every operation
//! takes the current wall-clock time and returns the `Effect`s the worker must
//! carry out (arm or cancel timers, deliver messages). All slot lookups go
//! through player ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::clock::{TimerKind, TimerRequest, TimerToken};
use super::messages::{Outbound, RevealedDecision};
use super::{EngineError, FinalReason};
use crate::config::MatchConfig;
use crate::models::{
    replay_totals, Choice, Decision, MatchId, MatchPhase, MatchRecord, Player, PlayerId, Round,
    ScorePair, Slot, TerminationReason,
};

/// Work the caller must perform after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Schedule(TimerRequest),
    /// Cancel the decision and reversal deadlines of the current round
    CancelRoundTimers,
    CancelTimer(TimerKind),
    CancelAllTimers,
    Broadcast(Outbound),
    SendTo(PlayerId, Outbound),
    /// A new round is accepting decisions
    RoundOpened(u32),
    /// The match reached a terminal phase
    Ended,
}

#[derive(Debug, Clone, Copy)]
struct ReversalWindow {
    slot: Slot,
    deadline: DateTime<Utc>,
    open: bool,
}

/// Read-only view of a live match. Never reveals undecided choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_id: MatchId,
    pub player_a: Player,
    pub player_b: Player,
    pub phase: MatchPhase,
    pub max_rounds: u32,
    pub current_round: Option<u32>,
    pub resolved_rounds: u32,
    pub decided_a: bool,
    pub decided_b: bool,
    pub connected_a: bool,
    pub connected_b: bool,
    pub totals: ScorePair,
    pub round_deadline: Option<DateTime<Utc>>,
    pub winner: Option<PlayerId>,
    pub reason: Option<TerminationReason>,
}

/// `now + d`, saturating at the latest representable instant.
fn deadline_after(now: DateTime<Utc>, d: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub struct MatchStateMachine {
    id: MatchId,
    players: [Player; 2],
    config: MatchConfig,
    phase: MatchPhase,
    rounds: Vec<Round>,
    reversal: Option<ReversalWindow>,
    /// Bumped whenever a round opens or resolves, and when the match ends
    generation: u64,
    connected: [bool; 2],
    grace_generation: [u64; 2],
    winner: Option<PlayerId>,
    reason: Option<TerminationReason>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl MatchStateMachine {
    pub fn new(id: MatchId, players: [Player; 2], config: MatchConfig, now: DateTime<Utc>) -> Self {
        Self {
            id,
            players,
            config,
            phase: MatchPhase::AwaitingRound,
            rounds: Vec::new(),
            reversal: None,
            generation: 0,
            connected: [true, true],
            grace_generation: [0, 0],
            winner: None,
            reason: None,
            started_at: now,
            ended_at: None,
        }
    }

    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn winner(&self) -> Option<&PlayerId> {
        self.winner.as_ref()
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        self.reason
    }

    pub fn player(&self, slot: Slot) -> &Player {
        &self.players[slot.index()]
    }

    pub fn slot_of(&self, player_id: &PlayerId) -> Option<Slot> {
        Slot::BOTH
            .into_iter()
            .find(|s| &self.players[s.index()].id == player_id)
    }

    pub fn is_connected(&self, slot: Slot) -> bool {
        self.connected[slot.index()]
    }

    /// Running totals, always replayed from the ledger.
    pub fn totals(&self) -> ScorePair {
        replay_totals(&self.rounds)
    }

    pub fn resolved_count(&self) -> u32 {
        self.rounds.iter().filter(|r| r.is_resolved()).count() as u32
    }

    /// The round currently accepting decisions, if any.
    pub fn open_round(&self) -> Option<&Round> {
        match self.phase {
            MatchPhase::DecisionOpen | MatchPhase::ReversalWindow => self.rounds.last(),
            _ => None,
        }
    }

    /// Choices of a slot across resolved rounds, oldest first.
    pub fn history(&self, slot: Slot) -> Vec<Choice> {
        self.rounds
            .iter()
            .filter(|r| r.is_resolved())
            .filter_map(|r| r.decision(slot).map(|d| d.choice))
            .collect()
    }

    /// Open the first round. A no-op once the match is under way.
    pub fn start(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        if self.phase != MatchPhase::AwaitingRound || !self.rounds.is_empty() {
            return Vec::new();
        }
        info!(
            match_id = %self.id,
            player_a = %self.players[0].id,
            player_b = %self.players[1].id,
            max_rounds = self.config.max_rounds,
            "Match started"
        );
        self.open_next_round(now)
    }

    /// Apply a decision or a replacement from a player.
    pub fn submit_decision(
        &mut self,
        player_id: &PlayerId,
        choice: Choice,
        now: DateTime<Utc>,
    ) -> Result<Vec<Effect>, EngineError> {
        let slot = self.participant(player_id)?;
        if !matches!(
            self.phase,
            MatchPhase::DecisionOpen | MatchPhase::ReversalWindow
        ) {
            return Err(EngineError::RoundNotOpen(self.id));
        }

        let match_id = self.id;
        let round = self
            .rounds
            .last_mut()
            .ok_or(EngineError::RoundNotOpen(match_id))?;
        let round_number = round.number;

        if round.decision(slot).is_some() {
            return self.replace_decision(slot, choice, round_number, now);
        }

        *round.decision_mut(slot) = Some(Decision::new(player_id.clone(), choice, now));
        let opponent_decided = round.decision(slot.other()).is_some();

        let mut effects = Vec::new();
        if opponent_decided {
            effects.push(Effect::SendTo(
                player_id.clone(),
                Outbound::DecisionAccepted {
                    match_id,
                    round_number,
                    choice,
                    replaced: false,
                    reversal_deadline: None,
                },
            ));
            effects.extend(self.resolve_round(now));
            return Ok(effects);
        }

        let window = self.config.reversal_window();
        let reversal_deadline = if window.is_zero() {
            None
        } else {
            let deadline = deadline_after(now, window);
            self.reversal = Some(ReversalWindow {
                slot,
                deadline,
                open: true,
            });
            self.phase = MatchPhase::ReversalWindow;
            effects.push(Effect::Schedule(TimerRequest {
                token: TimerToken {
                    kind: TimerKind::ReversalDeadline,
                    round: round_number,
                    generation: self.generation,
                },
                after: window,
            }));
            Some(deadline)
        };

        effects.push(Effect::SendTo(
            player_id.clone(),
            Outbound::DecisionAccepted {
                match_id,
                round_number,
                choice,
                replaced: false,
                reversal_deadline,
            },
        ));
        effects.push(Effect::SendTo(
            self.player(slot.other()).id.clone(),
            Outbound::OpponentDecided {
                match_id,
                round_number,
            },
        ));

        debug!(match_id = %self.id, round = round_number, %slot, "First decision recorded");
        Ok(effects)
    }

    fn replace_decision(
        &mut self,
        slot: Slot,
        choice: Choice,
        round_number: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Effect>, EngineError> {
        let final_err = |reason| EngineError::DecisionFinal {
            round: round_number,
            reason,
        };

        let round = self
            .rounds
            .last_mut()
            .ok_or(EngineError::RoundNotOpen(self.id))?;
        if round.decision(slot.other()).is_some() {
            return Err(final_err(FinalReason::OpponentDecided));
        }

        let window_open = matches!(
            self.reversal,
            Some(w) if w.slot == slot && w.open && now < w.deadline
        );
        if !window_open {
            return Err(final_err(FinalReason::ReversalWindowExpired));
        }

        let decision = round
            .decision_mut(slot)
            .as_mut()
            .ok_or(EngineError::RoundNotOpen(self.id))?;
        decision.choice = choice;
        decision.received_at = now;
        let player_id = decision.player_id.clone();

        debug!(match_id = %self.id, round = round_number, %slot, %choice, "Decision replaced");
        Ok(vec![Effect::SendTo(
            player_id,
            Outbound::DecisionAccepted {
                match_id: self.id,
                round_number,
                choice,
                replaced: true,
                reversal_deadline: self.reversal.map(|w| w.deadline),
            },
        )])
    }

    /// Apply a timer fire. Stale tokens are ignored.
    pub fn on_timer(&mut self, token: TimerToken, now: DateTime<Utc>) -> Vec<Effect> {
        if self.phase.is_terminal() {
            debug!(match_id = %self.id, ?token, "Timer fired after match end");
            return Vec::new();
        }

        match token.kind {
            TimerKind::RoundStart => {
                if self.phase == MatchPhase::AwaitingRound
                    && token.generation == self.generation
                    && token.round as usize == self.rounds.len() + 1
                {
                    return self.open_next_round(now);
                }
            }
            TimerKind::DecisionDeadline => {
                if self.is_current_round_token(&token) {
                    return self.expire_decision_deadline(now);
                }
            }
            TimerKind::ReversalDeadline => {
                if self.is_current_round_token(&token) && self.phase == MatchPhase::ReversalWindow {
                    if let Some(window) = self.reversal.as_mut() {
                        window.open = false;
                    }
                    self.phase = MatchPhase::DecisionOpen;
                    debug!(match_id = %self.id, round = token.round, "Reversal window closed");
                    return Vec::new();
                }
            }
            TimerKind::DisconnectGrace(slot) => {
                if token.generation == self.grace_generation[slot.index()]
                    && !self.connected[slot.index()]
                {
                    info!(match_id = %self.id, %slot, "Disconnect grace expired");
                    let winner = self.player(slot.other()).id.clone();
                    return self.finish(TerminationReason::DisconnectTimeout, Some(winner), now);
                }
            }
        }

        debug!(match_id = %self.id, ?token, "Ignoring stale timer");
        Vec::new()
    }

    /// Explicit leave. The remaining player wins regardless of score.
    pub fn leave(
        &mut self,
        player_id: &PlayerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Effect>, EngineError> {
        let slot = self.participant(player_id)?;
        info!(match_id = %self.id, player = %player_id, "Player left match");
        let winner = self.player(slot.other()).id.clone();
        Ok(self.finish(TerminationReason::Forfeit, Some(winner), now))
    }

    pub fn disconnect(
        &mut self,
        player_id: &PlayerId,
        _now: DateTime<Utc>,
    ) -> Result<Vec<Effect>, EngineError> {
        let slot = self.participant(player_id)?;
        if !self.connected[slot.index()] {
            return Ok(Vec::new());
        }

        self.connected[slot.index()] = false;
        self.grace_generation[slot.index()] += 1;
        info!(match_id = %self.id, player = %player_id, "Player disconnected");

        Ok(vec![
            Effect::Schedule(TimerRequest {
                token: TimerToken {
                    kind: TimerKind::DisconnectGrace(slot),
                    round: self.rounds.len() as u32,
                    generation: self.grace_generation[slot.index()],
                },
                after: self.config.disconnect_grace(),
            }),
            Effect::SendTo(
                self.player(slot.other()).id.clone(),
                Outbound::OpponentConnection {
                    match_id: self.id,
                    connected: false,
                },
            ),
        ])
    }

    pub fn reconnect(
        &mut self,
        player_id: &PlayerId,
        _now: DateTime<Utc>,
    ) -> Result<Vec<Effect>, EngineError> {
        let slot = self.participant(player_id)?;
        if self.connected[slot.index()] {
            return Ok(Vec::new());
        }

        self.connected[slot.index()] = true;
        self.grace_generation[slot.index()] += 1;
        info!(match_id = %self.id, player = %player_id, "Player reconnected");

        let mut effects = vec![
            Effect::CancelTimer(TimerKind::DisconnectGrace(slot)),
            Effect::SendTo(
                self.player(slot.other()).id.clone(),
                Outbound::OpponentConnection {
                    match_id: self.id,
                    connected: true,
                },
            ),
        ];
        if let Some(round) = self.open_round() {
            effects.push(Effect::SendTo(player_id.clone(), self.timer_sync(round)));
        }
        Ok(effects)
    }

    /// Archived form, available once the match has ended.
    pub fn record(&self) -> Option<MatchRecord> {
        let reason = self.reason?;
        Some(MatchRecord {
            id: self.id,
            player_a: self.players[0].clone(),
            player_b: self.players[1].clone(),
            max_rounds: self.config.max_rounds,
            rounds: self.rounds.clone(),
            final_scores: self.totals(),
            winner: self.winner.clone(),
            reason,
            started_at: self.started_at,
            ended_at: self.ended_at.unwrap_or(self.started_at),
        })
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        let open = self.open_round();
        MatchSnapshot {
            match_id: self.id,
            player_a: self.players[0].clone(),
            player_b: self.players[1].clone(),
            phase: self.phase,
            max_rounds: self.config.max_rounds,
            current_round: open.map(|r| r.number),
            resolved_rounds: self.resolved_count(),
            decided_a: open.map(|r| r.decision(Slot::A).is_some()).unwrap_or(false),
            decided_b: open.map(|r| r.decision(Slot::B).is_some()).unwrap_or(false),
            connected_a: self.connected[0],
            connected_b: self.connected[1],
            totals: self.totals(),
            round_deadline: open.map(|r| r.deadline),
            winner: self.winner.clone(),
            reason: self.reason,
        }
    }

    fn participant(&self, player_id: &PlayerId) -> Result<Slot, EngineError> {
        if self.phase.is_terminal() {
            return Err(EngineError::MatchClosed(self.id));
        }
        self.slot_of(player_id)
            .ok_or_else(|| EngineError::NotAParticipant {
                match_id: self.id,
                player_id: player_id.clone(),
            })
    }

    fn is_current_round_token(&self, token: &TimerToken) -> bool {
        token.generation == self.generation
            && self.open_round().map(|r| r.number) == Some(token.round)
    }

    fn timer_sync(&self, round: &Round) -> Outbound {
        Outbound::TimerSync {
            match_id: self.id,
            round_number: round.number,
            decision_deadline_seconds: self.config.decision_deadline_seconds,
            reversal_window_seconds: self.config.reversal_window_seconds,
            deadline: round.deadline,
        }
    }

    fn open_next_round(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let number = self.rounds.len() as u32 + 1;
        let window = self.config.decision_deadline();
        let deadline = deadline_after(now, window);

        self.generation += 1;
        self.reversal = None;
        self.rounds.push(Round::new(number, now, deadline));
        self.phase = MatchPhase::DecisionOpen;

        let sync = self.timer_sync(&self.rounds[self.rounds.len() - 1]);
        debug!(match_id = %self.id, round = number, "Round opened");

        vec![
            Effect::Schedule(TimerRequest {
                token: TimerToken {
                    kind: TimerKind::DecisionDeadline,
                    round: number,
                    generation: self.generation,
                },
                after: window,
            }),
            Effect::Broadcast(sync),
            Effect::RoundOpened(number),
        ]
    }

    /// Auto-cooperate every undecided player, then resolve.
    fn expire_decision_deadline(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let ids = [self.players[0].id.clone(), self.players[1].id.clone()];
        let Some(round) = self.rounds.last_mut() else {
            return Vec::new();
        };

        for slot in Slot::BOTH {
            let entry = round.decision_mut(slot);
            if entry.is_none() {
                *entry = Some(Decision::timeout(ids[slot.index()].clone(), now));
                info!(
                    match_id = %self.id,
                    round = round.number,
                    %slot,
                    "Decision deadline expired, defaulting to cooperate"
                );
            }
        }

        self.resolve_round(now)
    }

    fn resolve_round(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let payoff = self.config.payoff;
        let match_id = self.id;
        let Some(round) = self.rounds.last_mut() else {
            return Vec::new();
        };
        let (Some(a), Some(b)) = (round.decision_a.as_ref(), round.decision_b.as_ref()) else {
            return Vec::new();
        };

        let result = payoff.payoff(a.choice, b.choice);
        let decisions = [a, b]
            .into_iter()
            .map(|d| RevealedDecision {
                player_id: d.player_id.clone(),
                choice: d.choice,
                source: d.source,
            })
            .collect();
        round.result = Some(result);
        round.resolved_at = Some(now);
        let round_number = round.number;

        // Result creation and timer invalidation happen in the same step.
        self.generation += 1;
        self.reversal = None;
        self.phase = MatchPhase::RoundResolved;

        let totals = self.totals();
        info!(
            match_id = %match_id,
            round = round_number,
            score_a = result.a,
            score_b = result.b,
            total_a = totals.a,
            total_b = totals.b,
            "Round resolved"
        );

        let mut effects = vec![
            Effect::CancelRoundTimers,
            Effect::Broadcast(Outbound::RoundResolved {
                match_id,
                round_number,
                decisions,
                result,
                totals,
            }),
        ];

        if self.resolved_count() >= self.config.max_rounds {
            let winner = match totals.a.cmp(&totals.b) {
                std::cmp::Ordering::Greater => Some(self.players[0].id.clone()),
                std::cmp::Ordering::Less => Some(self.players[1].id.clone()),
                std::cmp::Ordering::Equal => None,
            };
            effects.extend(self.finish(TerminationReason::Completed, winner, now));
            return effects;
        }

        self.phase = MatchPhase::AwaitingRound;
        let delay = self.config.inter_round_delay();
        if delay.is_zero() {
            effects.extend(self.open_next_round(now));
        } else {
            effects.push(Effect::Schedule(TimerRequest {
                token: TimerToken {
                    kind: TimerKind::RoundStart,
                    round: round_number + 1,
                    generation: self.generation,
                },
                after: delay,
            }));
        }
        effects
    }

    fn finish(
        &mut self,
        reason: TerminationReason,
        winner: Option<PlayerId>,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        // An unresolved round stays in the ledger without a result.
        self.phase = match reason {
            TerminationReason::Completed => MatchPhase::MatchComplete,
            TerminationReason::Forfeit | TerminationReason::DisconnectTimeout => {
                MatchPhase::MatchForfeited
            }
        };
        self.generation += 1;
        self.reversal = None;
        self.winner = winner.clone();
        self.reason = Some(reason);
        self.ended_at = Some(now);

        let final_scores = self.totals();
        info!(
            match_id = %self.id,
            %reason,
            winner = ?winner,
            score_a = final_scores.a,
            score_b = final_scores.b,
            "Match ended"
        );

        vec![
            Effect::CancelAllTimers,
            Effect::Broadcast(Outbound::MatchEnded {
                match_id: self.id,
                winner_player_id: winner,
                reason,
                final_scores,
            }),
            Effect::Ended,
        ]
    }
}
