//! Client Events
//!
//! Notifications a client publishes to its presentation layer.

use serde::{Serialize, Deserialize};

use crate::core::geo::Position;
use crate::game::moves::RoundResult;
use crate::game::player::PlayerId;
use crate::game::round::RoundOutcome;
use crate::game::session::SessionId;

/// Kind of change in a subscribed collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Record appeared (or started matching the filter).
    Added,
    /// Record changed and still matches.
    Modified,
    /// Record deleted (or stopped matching the filter).
    Removed,
}

/// Event delivered to the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A fresh own position was computed and published.
    PositionUpdated {
        /// New position.
        position: Position,
    },

    /// A peer appeared, moved or left.
    PeerRosterChanged {
        /// Peer id.
        peer_id: PlayerId,
        /// What happened.
        kind: ChangeKind,
        /// New position, `None` when unknown or removed.
        position: Option<Position>,
    },

    /// Scanning was suspended or resumed by a radio transition.
    ScanningChanged {
        /// True while scanning is allowed.
        enabled: bool,
    },

    /// A session with `opponent_id` was created or joined.
    SessionCreated {
        /// Session id.
        session_id: SessionId,
        /// The opponent.
        opponent_id: PlayerId,
    },

    /// The local player should pick a move.
    AwaitingMove {
        /// Session id.
        session_id: SessionId,
        /// Round about to be played (1-based).
        round: u32,
    },

    /// A round was resolved.
    RoundResolved {
        /// Session id.
        session_id: SessionId,
        /// Round summary.
        outcome: RoundOutcome,
    },

    /// The session ended for this side.
    SessionTerminal {
        /// Session id.
        session_id: SessionId,
        /// Decisive result, `None` if the record vanished first.
        result: Option<RoundResult>,
    },
}

impl ClientEvent {
    /// Session this event belongs to, if any.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            ClientEvent::SessionCreated { session_id, .. }
            | ClientEvent::AwaitingMove { session_id, .. }
            | ClientEvent::RoundResolved { session_id, .. }
            | ClientEvent::SessionTerminal { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_tag() {
        let event = ClientEvent::ScanningChanged { enabled: false };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"scanning_changed\""));
        assert_eq!(serde_json::from_str::<ClientEvent>(&json).unwrap(), event);
    }

    #[test]
    fn test_session_id_accessor() {
        let id = SessionId::from_raw("a-vs-b");
        let event = ClientEvent::SessionTerminal { session_id: id.clone(), result: None };
        assert_eq!(event.session_id(), Some(&id));
        assert!(ClientEvent::ScanningChanged { enabled: true }.session_id().is_none());
    }
}
