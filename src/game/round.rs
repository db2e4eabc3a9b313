//! Round State Machine
//!
//! Tracks one session as seen by one side. Each observed record is fed to
//! [`RoundTracker::observe`], which returns the writes and notifications the
//! local side should perform. The tracker is pure; the caller performs I/O.
//!
//! ```text
//! NoSession -> Pending -> Joined -> AwaitingMoves -> RoundReady
//!                                        ^               |
//!                                        +-- DrawReset <-+-> Terminal
//! ```
//!
//! Records can be delivered more than once and in any interleaving with the
//! local side's own writes, so every round is resolved exactly once and the
//! opponent's drawn move is ignored until it has been seen cleared.

use serde::{Serialize, Deserialize};

use crate::game::moves::{resolve_round, Move, RoundResult};
use crate::game::player::PlayerId;
use crate::game::session::{GameSession, PlayerStatus, SessionId, SessionStatus};

/// Phase of a session from one side's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No record observed yet.
    NoSession,
    /// Record exists, own status still pending.
    Pending,
    /// Own status is in-game.
    Joined,
    /// At least one move is idle.
    AwaitingMoves,
    /// Both moves set; resolving.
    RoundReady,
    /// Draw observed; own move being reset.
    DrawReset,
    /// Decisive result reached.
    Terminal(RoundResult),
    /// Record deleted before a decisive result.
    Closed,
}

impl SessionPhase {
    /// True once no further transitions can happen.
    pub fn is_final(self) -> bool {
        matches!(self, SessionPhase::Terminal(_) | SessionPhase::Closed)
    }
}

/// Resolved round summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// 1-based round number within the session.
    pub round: u32,
    /// Local player's move.
    pub own_move: Move,
    /// Opponent's move.
    pub opponent_move: Move,
    /// Result for the local player.
    pub result: RoundResult,
}

/// What the local side should do after observing a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundAction {
    /// Write own status `in-game`.
    Join,
    /// Both joined; write session status `active`.
    Activate,
    /// Ask the local player for a move.
    RequestMove,
    /// Draw: write own move back to `idle`.
    ResetOwnMove,
    /// A round was resolved.
    Resolved(RoundOutcome),
    /// Decisive result; the session is over for this side.
    Finished(RoundResult),
    /// The record disappeared before a decisive result.
    Closed,
}

/// Per-side session state machine.
#[derive(Clone, Debug)]
pub struct RoundTracker {
    me: PlayerId,
    session_id: SessionId,
    phase: SessionPhase,
    rounds: u32,
    join_sent: bool,
    activate_sent: bool,
    move_requested: bool,
    /// Own drawn move, until the reset is observed.
    own_reset_pending: bool,
    /// Opponent's drawn move, until it is observed cleared.
    stale_opponent: Option<Move>,
    opponent_joined: bool,
}

impl RoundTracker {
    /// Track `session_id` for local player `me`.
    pub fn new(session_id: SessionId, me: PlayerId) -> Self {
        Self {
            me,
            session_id,
            phase: SessionPhase::NoSession,
            rounds: 0,
            join_sent: false,
            activate_sent: false,
            move_requested: false,
            own_reset_pending: false,
            stale_opponent: None,
            opponent_joined: false,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Session being tracked.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Rounds resolved so far.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// True once the opponent has been seen `in-game`.
    pub fn opponent_joined(&self) -> bool {
        self.opponent_joined
    }

    /// True while a local move would be accepted into the current round.
    pub fn can_submit(&self) -> bool {
        self.phase == SessionPhase::AwaitingMoves && self.move_requested
    }

    /// Note that the local player submitted a move.
    pub fn move_submitted(&mut self) {
        self.move_requested = false;
    }

    /// Feed the latest observed record (`None` once deleted).
    pub fn observe(&mut self, record: Option<&GameSession>) -> Vec<RoundAction> {
        if self.phase.is_final() {
            return Vec::new();
        }

        let Some(record) = record else {
            if self.phase == SessionPhase::NoSession {
                return Vec::new();
            }
            self.phase = SessionPhase::Closed;
            return vec![RoundAction::Closed];
        };

        let Some(opponent) = record.opponent_of(&self.me).cloned() else {
            return Vec::new();
        };
        if record.status_of(&opponent) == PlayerStatus::InGame || record.status == SessionStatus::Active {
            self.opponent_joined = true;
        }

        let mut actions = Vec::new();

        if record.status_of(&self.me) == PlayerStatus::Pending {
            self.phase = SessionPhase::Pending;
            if !self.join_sent {
                self.join_sent = true;
                actions.push(RoundAction::Join);
            }
            return actions;
        }

        if matches!(self.phase, SessionPhase::NoSession | SessionPhase::Pending) {
            self.phase = SessionPhase::Joined;
        }

        if record.both_joined() && record.status == SessionStatus::Pending && !self.activate_sent {
            self.activate_sent = true;
            actions.push(RoundAction::Activate);
        }

        let own = record.move_of(&self.me);
        let opponent_raw = record.move_of(&opponent);

        let opponent_move = match self.stale_opponent {
            Some(_) if opponent_raw == Move::Idle => {
                self.stale_opponent = None;
                Move::Idle
            }
            Some(_) => Move::Idle,
            None => opponent_raw,
        };

        if self.own_reset_pending {
            if own.is_playable() {
                return actions;
            }
            self.own_reset_pending = false;
        }

        if !own.is_playable() || !opponent_move.is_playable() {
            self.phase = SessionPhase::AwaitingMoves;
            if !own.is_playable() && !self.move_requested {
                self.move_requested = true;
                actions.push(RoundAction::RequestMove);
            }
            return actions;
        }

        self.phase = SessionPhase::RoundReady;
        self.move_requested = false;
        self.rounds += 1;
        let result = resolve_round(own, opponent_move);
        actions.push(RoundAction::Resolved(RoundOutcome {
            round: self.rounds,
            own_move: own,
            opponent_move,
            result,
        }));

        if result.is_decisive() {
            self.phase = SessionPhase::Terminal(result);
            actions.push(RoundAction::Finished(result));
        } else {
            self.phase = SessionPhase::DrawReset;
            self.own_reset_pending = true;
            self.stale_opponent = Some(opponent_move);
            actions.push(RoundAction::ResetOwnMove);
        }

        actions
    }
}
