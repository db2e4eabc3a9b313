//! Session Coordination
//!
//! Owns the lifecycle of one duel record in the shared store: deterministic
//! naming, idempotent creation, join and move writes, and teardown.
//!
//! Every write is a partial update of the caller's own fields, so the two
//! peers never clobber each other and every call is safe to retry.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::game::moves::{resolve_round, Move, RoundResult};
use crate::game::player::PlayerId;
use crate::game::session::{GameSession, PlayerStatus, SessionId, SessionStatus};
use crate::store::{DocumentStore, StoreError, GAMES_COLLECTION};
use crate::sync::listener::{spawn_listener, ListenerHandle};
use crate::sync::protocol::{
    decode_session, encode_session, move_update, player_status_update, session_status_update,
};

/// Session errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// Move is not rock, paper or scissors.
    #[error("invalid move: {0}")]
    InvalidMove(String),

    /// A player cannot duel themselves.
    #[error("player {0} cannot duel themselves")]
    SamePlayer(PlayerId),

    /// Player is not part of the session.
    #[error("player {player} is not in session {session}")]
    NotInSession {
        /// Session id.
        session: SessionId,
        /// Player id.
        player: PlayerId,
    },

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Creates, drives and tears down duel records.
pub struct SessionCoordinator<S> {
    store: Arc<S>,
}

impl<S> Clone for SessionCoordinator<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone() }
    }
}

impl<S: DocumentStore> SessionCoordinator<S> {
    /// Create a coordinator over a shared store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Deterministic id of the pair.
    pub fn session_id(a: &PlayerId, b: &PlayerId) -> SessionId {
        SessionId::for_pair(a, b)
    }

    /// Create the session for `{me, opponent}` or join the existing one.
    ///
    /// Creating an existing record is a no-op merge: whichever peer wrote first
    /// determines the initial content. Returns once the store acknowledges.
    #[instrument(skip(self), fields(me = %me, opponent = %opponent))]
    pub async fn create_or_join(&self, me: &PlayerId, opponent: &PlayerId) -> Result<SessionId, SessionError> {
        if me == opponent {
            return Err(SessionError::SamePlayer(me.clone()));
        }

        let session = GameSession::new(me, opponent);
        let created = self
            .store
            .upsert(GAMES_COLLECTION, session.id.as_str(), encode_session(&session))
            .await?;

        if created {
            info!(session = %session.id, "created game session");
        } else {
            debug!(session = %session.id, "joined existing game session");
        }
        Ok(session.id)
    }

    /// Mark `me` as in-game.
    pub async fn mark_joined(&self, session_id: &SessionId, me: &PlayerId) -> Result<(), SessionError> {
        self.store
            .update(GAMES_COLLECTION, session_id.as_str(), player_status_update(me, PlayerStatus::InGame))
            .await?;
        debug!(session = %session_id, player = %me, "player joined");
        Ok(())
    }

    /// Submit `me`'s move for the current round.
    pub async fn submit_move(&self, session_id: &SessionId, me: &PlayerId, mv: Move) -> Result<(), SessionError> {
        if !mv.is_playable() {
            return Err(SessionError::InvalidMove(mv.to_string()));
        }
        self.write_move(session_id, me, mv).await
    }

    /// Parse and submit a move given by name.
    pub async fn submit_move_str(&self, session_id: &SessionId, me: &PlayerId, mv: &str) -> Result<(), SessionError> {
        let parsed: Move = mv.parse().map_err(|_| SessionError::InvalidMove(mv.to_owned()))?;
        self.submit_move(session_id, me, parsed).await
    }

    /// Clear `me`'s move after a draw.
    pub async fn reset_move(&self, session_id: &SessionId, me: &PlayerId) -> Result<(), SessionError> {
        self.write_move(session_id, me, Move::Idle).await
    }

    async fn write_move(&self, session_id: &SessionId, me: &PlayerId, mv: Move) -> Result<(), SessionError> {
        self.store
            .update(GAMES_COLLECTION, session_id.as_str(), move_update(me, mv))
            .await?;
        debug!(session = %session_id, player = %me, %mv, "move written");
        Ok(())
    }

    /// Mark the session active. Both peers may call this; the writes commute.
    pub async fn activate(&self, session_id: &SessionId) -> Result<(), SessionError> {
        self.store
            .update(GAMES_COLLECTION, session_id.as_str(), session_status_update(SessionStatus::Active))
            .await?;
        Ok(())
    }

    /// Read the current record.
    pub async fn fetch(&self, session_id: &SessionId) -> Result<Option<GameSession>, SessionError> {
        let document = self.store.get(GAMES_COLLECTION, session_id.as_str()).await?;
        Ok(document
            .map(|doc| decode_session(session_id.as_str(), &doc))
            .transpose()?)
    }

    /// Invoke `handler` with the full record on every change, and with `None`
    /// once the record is deleted. Local writes are observed too.
    pub async fn on_session_change<F>(&self, session_id: &SessionId, mut handler: F) -> Result<ListenerHandle, SessionError>
    where
        F: FnMut(Option<GameSession>) + Send + 'static,
    {
        let subscription = self
            .store
            .watch_document(GAMES_COLLECTION, session_id.as_str())
            .await?;

        Ok(spawn_listener([subscription], move |change| match change.document {
            Some(document) => match decode_session(&change.id, &document) {
                Ok(session) => handler(Some(session)),
                Err(e) => warn!(session = %change.id, "ignoring malformed session update: {}", e),
            },
            None => handler(None),
        }))
    }

    /// Resolve a round from the main player's point of view.
    pub fn resolve_round(main_move: Move, opponent_move: Move) -> RoundResult {
        resolve_round(main_move, opponent_move)
    }

    /// Delete the session record.
    ///
    /// Best effort: failures are logged and otherwise ignored. Safe to call from
    /// either side, any number of times.
    pub async fn teardown(&self, session_id: &SessionId) {
        match self.store.delete(GAMES_COLLECTION, session_id.as_str()).await {
            Ok(true) => info!(session = %session_id, "game session removed"),
            Ok(false) => debug!(session = %session_id, "game session already removed"),
            Err(e) => warn!(session = %session_id, "failed to remove game session: {}", e),
        }
    }
}
