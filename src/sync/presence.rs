//! Presence Synchronization
//!
//! Player records in the shared store: login, position publishing, logout,
//! and the two subscriptions every client keeps open (peer roster and pending
//! sessions that name the local player).

use std::collections::BTreeMap;
use std::sync::Arc;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::core::geo::Position;
use crate::game::events::ChangeKind;
use crate::game::player::{InvalidName, Player, PlayerId, Team};
use crate::game::session::{SessionId, SessionStatus};
use crate::store::{field, DocumentStore, Filter, StoreError, GAMES_COLLECTION, PLAYERS_COLLECTION};
use crate::sync::listener::{spawn_listener, ListenerHandle};
use crate::sync::protocol::{
    decode_player, encode_new_player, location_update, FIELD_CURRENT_GAME, FIELD_PLAYER1,
    FIELD_PLAYER2, FIELD_STATUS,
};

/// Presence errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PresenceError {
    /// Login name rejected.
    #[error("invalid login: {0}")]
    InvalidName(#[from] InvalidName),

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// One roster delta.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerChange {
    /// Peer id.
    pub peer_id: PlayerId,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Peer team; `None` on removal.
    pub team: Option<Team>,
    /// New position; `None` when unknown or removed.
    pub position: Option<Position>,
}

/// A pending session naming the local player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSession {
    /// Session id.
    pub session_id: SessionId,
    /// The other participant.
    pub opponent_id: PlayerId,
}

// =============================================================================
// PEER ROSTER
// =============================================================================

/// Local cache of the other players, refreshed only from subscription deltas.
///
/// Owned by a single task; never shared.
#[derive(Clone, Debug)]
pub struct PeerRoster {
    me: PlayerId,
    peers: BTreeMap<PlayerId, Player>,
}

impl PeerRoster {
    /// Empty roster for local player `me`.
    pub fn new(me: PlayerId) -> Self {
        Self { me, peers: BTreeMap::new() }
    }

    /// Apply a delta. Returns true if the cache changed.
    pub fn apply(&mut self, change: &PeerChange) -> bool {
        if change.peer_id == self.me {
            return false;
        }

        match change.kind {
            ChangeKind::Removed => self.peers.remove(&change.peer_id).is_some(),
            ChangeKind::Added | ChangeKind::Modified => {
                let team = match (change.team, self.peers.get(&change.peer_id)) {
                    (Some(team), _) => team,
                    (None, Some(existing)) => existing.team,
                    (None, None) => return false,
                };
                let player = Player {
                    id: change.peer_id.clone(),
                    team,
                    position: change.position,
                };
                match self.peers.insert(change.peer_id.clone(), player.clone()) {
                    Some(previous) => previous != player,
                    None => true,
                }
            }
        }
    }

    /// Cached peers, ordered by id.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.peers.values()
    }

    /// Cached peer.
    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.peers.get(id)
    }

    /// Number of cached peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True if no peers are cached.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

// =============================================================================
// PRESENCE SYNC
// =============================================================================

/// Reads and writes player records.
pub struct PresenceSync<S> {
    store: Arc<S>,
}

impl<S> Clone for PresenceSync<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone() }
    }
}

impl<S: DocumentStore> PresenceSync<S> {
    /// Create over a shared store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Log in: write a fresh record for `"{name}-{team}"` with no location.
    #[instrument(skip(self))]
    pub async fn register_player(&self, name: &str, team: Team) -> Result<Player, PresenceError> {
        let player = Player::login(name, team)?;
        self.store
            .set(PLAYERS_COLLECTION, player.id.as_str(), encode_new_player(name, &player))
            .await?;
        info!(player = %player.id, "player registered");
        Ok(player)
    }

    /// Publish the local player's latest position.
    pub async fn publish_position(&self, player: &PlayerId, position: Position) -> Result<(), StoreError> {
        self.store
            .update(PLAYERS_COLLECTION, player.as_str(), location_update(position))
            .await?;
        debug!(player = %player, %position, "position published");
        Ok(())
    }

    /// Record which session the player is in (empty id clears it).
    pub async fn set_current_game(&self, player: &PlayerId, session: Option<&SessionId>) -> Result<(), StoreError> {
        let value = session.map(SessionId::as_str).unwrap_or("");
        self.store
            .update(PLAYERS_COLLECTION, player.as_str(), field(FIELD_CURRENT_GAME, json!(value)))
            .await
    }

    /// Log out: delete the player record. Best effort.
    pub async fn remove_player(&self, player: &PlayerId) {
        match self.store.delete(PLAYERS_COLLECTION, player.as_str()).await {
            Ok(_) => info!(player = %player, "player removed"),
            Err(e) => warn!(player = %player, "failed to remove player: {}", e),
        }
    }

    /// Watch every other player. The initial roster arrives as `Added` deltas.
    pub async fn subscribe_peers<F>(&self, me: &PlayerId, mut handler: F) -> Result<ListenerHandle, StoreError>
    where
        F: FnMut(PeerChange) + Send + 'static,
    {
        let subscription = self
            .store
            .watch_collection(PLAYERS_COLLECTION, Filter::all())
            .await?;
        let me = me.clone();

        Ok(spawn_listener([subscription], move |change| {
            if change.id == me.as_str() {
                return;
            }

            let (team, position) = match &change.document {
                Some(document) => match decode_player(&change.id, document) {
                    Ok(player) => (Some(player.team), player.position),
                    Err(e) => {
                        warn!(peer = %change.id, "ignoring malformed player record: {}", e);
                        return;
                    }
                },
                None => (None, None),
            };

            handler(PeerChange {
                peer_id: PlayerId::new(change.id),
                kind: change.kind,
                team,
                position,
            });
        }))
    }

    /// Watch pending sessions in which `me` is a participant.
    ///
    /// Lets a player whose own matcher has not (yet) fired still join a
    /// session created by the peer. One feed per participant slot, so only
    /// records naming `me` are delivered.
    pub async fn subscribe_pending_sessions<F>(&self, me: &PlayerId, mut handler: F) -> Result<ListenerHandle, StoreError>
    where
        F: FnMut(PendingSession) + Send + 'static,
    {
        let mut feeds = Vec::with_capacity(2);
        for slot in [FIELD_PLAYER1, FIELD_PLAYER2] {
            let filter = Filter::field_eq(FIELD_STATUS, SessionStatus::Pending.as_str()).and(slot, me.as_str());
            feeds.push(self.store.watch_collection(GAMES_COLLECTION, filter).await?);
        }
        let me = me.clone();

        Ok(spawn_listener(feeds, move |change| {
            if change.kind == ChangeKind::Removed {
                return;
            }
            let Some(document) = change.document else {
                return;
            };

            let participant = |name: &str| document.get(name).and_then(|v| v.as_str()).map(PlayerId::from);
            let opponent_id = match (participant(FIELD_PLAYER1), participant(FIELD_PLAYER2)) {
                (Some(p1), Some(p2)) if p1 == me && p2 != me => p2,
                (Some(p1), Some(p2)) if p2 == me && p1 != me => p1,
                _ => return,
            };

            handler(PendingSession {
                session_id: SessionId::from_raw(change.id),
                opponent_id,
            });
        }))
    }
}
