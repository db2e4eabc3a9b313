//! Game Session Records
//!
//! The shared record two peers write to during a duel. Each peer only ever
//! writes its own entries in `player_status` and `moves`, so concurrent
//! partial updates never conflict.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::game::moves::Move;
use crate::game::player::PlayerId;

/// Separator between the two player ids in a session id.
pub const SESSION_ID_SEPARATOR: &str = "-vs-";

// =============================================================================
// SESSION ID
// =============================================================================

/// Deterministic session identifier.
///
/// Built from the two player ids sorted lexicographically, so both peers
/// arrive at the same id without coordinating. Login names never contain
/// the separator, so distinct pairs always get distinct ids.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Id for the unordered pair `{a, b}`.
    pub fn for_pair(a: &PlayerId, b: &PlayerId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{}{}{}", low, SESSION_ID_SEPARATOR, high))
    }

    /// Wrap a raw id string read from the store.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Session-wide status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, waiting for both players to join.
    #[default]
    Pending,
    /// Both players have joined.
    Active,
}

impl SessionStatus {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
        }
    }
}

/// Per-player join status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayerStatus {
    /// Not yet in the session view.
    #[default]
    Pending,
    /// Joined the session.
    InGame,
}

impl PlayerStatus {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            PlayerStatus::Pending => "pending",
            PlayerStatus::InGame => "in-game",
        }
    }
}

// =============================================================================
// GAME SESSION
// =============================================================================

/// A duel between exactly two players.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    /// Deterministic id of the pair.
    pub id: SessionId,
    /// Lexicographically lower player id.
    pub player_a: PlayerId,
    /// Lexicographically higher player id.
    pub player_b: PlayerId,
    /// Session-wide status.
    pub status: SessionStatus,
    /// Join status per player.
    pub player_status: BTreeMap<PlayerId, PlayerStatus>,
    /// Current-round move per player.
    pub moves: BTreeMap<PlayerId, Move>,
}

impl GameSession {
    /// Fresh pending session: both players pending, both moves idle.
    pub fn new(a: &PlayerId, b: &PlayerId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            id: SessionId::for_pair(a, b),
            player_a: low.clone(),
            player_b: high.clone(),
            status: SessionStatus::Pending,
            player_status: [(low.clone(), PlayerStatus::Pending), (high.clone(), PlayerStatus::Pending)]
                .into_iter()
                .collect(),
            moves: [(low.clone(), Move::Idle), (high.clone(), Move::Idle)]
                .into_iter()
                .collect(),
        }
    }

    /// True if `player` is one of the two participants.
    pub fn contains(&self, player: &PlayerId) -> bool {
        &self.player_a == player || &self.player_b == player
    }

    /// The other participant, if `player` is in this session.
    pub fn opponent_of(&self, player: &PlayerId) -> Option<&PlayerId> {
        if &self.player_a == player {
            Some(&self.player_b)
        } else if &self.player_b == player {
            Some(&self.player_a)
        } else {
            None
        }
    }

    /// Current move of a player (idle if absent).
    pub fn move_of(&self, player: &PlayerId) -> Move {
        self.moves.get(player).copied().unwrap_or_default()
    }

    /// Join status of a player (pending if absent).
    pub fn status_of(&self, player: &PlayerId) -> PlayerStatus {
        self.player_status.get(player).copied().unwrap_or_default()
    }

    /// Both players have entered the session.
    pub fn both_joined(&self) -> bool {
        self.status_of(&self.player_a) == PlayerStatus::InGame
            && self.status_of(&self.player_b) == PlayerStatus::InGame
    }

    /// Both moves are set; the round can be resolved.
    pub fn round_ready(&self) -> bool {
        self.move_of(&self.player_a).is_playable() && self.move_of(&self.player_b).is_playable()
    }
}
