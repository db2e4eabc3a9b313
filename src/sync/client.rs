//! Game Client
//!
//! The per-process event loop. One task owns the peer roster and the round
//! tracker; store callbacks, ranging results, radio changes and user commands
//! are all funnelled into it.
//!
//! ```text
//! scans ──> Geolocator ──> PresenceSync.publish ──┐
//!                                                 v
//! store pushes ──> PeerRoster ──> ProximityMatcher ──> SessionCoordinator
//!                                                          │
//! store pushes ──> RoundTracker <──────────────────────────┘
//!                       │
//!                       └──> ClientEvent (broadcast)
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::core::trilateration::{estimate_position, BeaconTable, RangedBeacon};
use crate::game::events::{ChangeKind, ClientEvent};
use crate::game::moves::{Move, RoundResult};
use crate::game::player::{Player, PlayerId};
use crate::game::proximity::find_eligible_opponent;
use crate::game::round::{RoundAction, RoundTracker};
use crate::game::session::{GameSession, SessionId};
use crate::store::{DocumentStore, StoreError};
use crate::sync::connectivity::Connectivity;
use crate::sync::coordinator::{SessionCoordinator, SessionError};
use crate::sync::listener::ListenerHandle;
use crate::sync::presence::{PeerChange, PeerRoster, PendingSession, PresenceError, PresenceSync};

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Login or presence failure.
    #[error("presence error: {0}")]
    Presence(#[from] PresenceError),

    /// Session failure.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// No session is in progress.
    #[error("no active session")]
    NoActiveSession,

    /// A move was already submitted for this round, or none is expected yet.
    #[error("not expecting a move")]
    MoveNotExpected,

    /// The client loop has stopped.
    #[error("client stopped")]
    Stopped,
}

/// Why the client loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientExit {
    /// Shutdown was requested or every handle was dropped.
    Shutdown,
    /// The local player lost a duel and logged out.
    Eliminated,
}

enum Command {
    SubmitMove(Move, oneshot::Sender<Result<(), ClientError>>),
    Shutdown,
}

enum Inbound {
    Peer(PeerChange),
    Pending(PendingSession),
    Session(SessionId, Option<GameSession>),
}

// =============================================================================
// HANDLE
// =============================================================================

/// Presentation-side handle to a running client.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    player_id: PlayerId,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ClientEvent>,
}

impl ClientHandle {
    /// Local player id.
    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    /// Subscribe to presentation events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Submit a move for the current round.
    pub async fn submit_move(&self, mv: Move) -> Result<(), ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::SubmitMove(mv, reply_tx))
            .await
            .map_err(|_| ClientError::Stopped)?;
        reply_rx.await.map_err(|_| ClientError::Stopped)?
    }

    /// Ask the client to log out and stop.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

// =============================================================================
// CLIENT
// =============================================================================

struct ActiveSession {
    tracker: RoundTracker,
    opponent: PlayerId,
    entered_at: Instant,
    _listener: ListenerHandle,
}

/// One logged-in player.
pub struct GameClient<S> {
    config: ClientConfig,
    beacons: BeaconTable,
    me: Player,
    presence: PresenceSync<S>,
    coordinator: SessionCoordinator<S>,
    roster: PeerRoster,
    active: Option<ActiveSession>,
    /// Opponents already played this login; never matched again.
    finished_opponents: BTreeSet<PlayerId>,
    scanning: bool,
    events: broadcast::Sender<ClientEvent>,
    commands: mpsc::Receiver<Command>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    _peers: ListenerHandle,
    _pending: ListenerHandle,
}

impl<S: DocumentStore> GameClient<S> {
    /// Log in as `config.player_name` on `config.player_team` and open the
    /// roster and pending-session subscriptions.
    #[instrument(skip_all, fields(name = %config.player_name, team = %config.player_team))]
    pub async fn login(
        store: Arc<S>,
        config: ClientConfig,
        beacons: BeaconTable,
    ) -> Result<(Self, ClientHandle), ClientError> {
        let presence = PresenceSync::new(store.clone());
        let coordinator = SessionCoordinator::new(store);

        let me = presence
            .register_player(&config.player_name, config.player_team)
            .await?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let tx = inbound_tx.clone();
        let peers = presence
            .subscribe_peers(&me.id, move |change| {
                let _ = tx.send(Inbound::Peer(change));
            })
            .await?;

        let tx = inbound_tx.clone();
        let pending = presence
            .subscribe_pending_sessions(&me.id, move |session| {
                let _ = tx.send(Inbound::Pending(session));
            })
            .await?;

        let (events, _) = broadcast::channel(config.event_capacity);
        let (command_tx, commands) = mpsc::channel(16);

        let handle = ClientHandle {
            player_id: me.id.clone(),
            commands: command_tx,
            events: events.clone(),
        };

        info!(player = %me.id, beacons = beacons.len(), "logged in");

        let client = Self {
            roster: PeerRoster::new(me.id.clone()),
            config,
            beacons,
            me,
            presence,
            coordinator,
            active: None,
            finished_opponents: BTreeSet::new(),
            scanning: false,
            events,
            commands,
            inbound_tx,
            inbound_rx,
            _peers: peers,
            _pending: pending,
        };

        Ok((client, handle))
    }

    /// Local player as currently known.
    pub fn player(&self) -> &Player {
        &self.me
    }

    /// Run until shutdown or elimination. Logs the player out on return.
    #[instrument(skip_all, fields(player = %self.me.id))]
    pub async fn run(
        mut self,
        mut scans: mpsc::Receiver<Vec<RangedBeacon>>,
        mut connectivity: watch::Receiver<Connectivity>,
    ) -> Result<ClientExit, ClientError> {
        self.scanning = connectivity.borrow_and_update().can_scan();
        let mut scans_open = true;
        let mut connectivity_open = true;

        let exit = loop {
            let join_deadline = self.join_deadline();
            tokio::select! {
                scan = scans.recv(), if scans_open && self.scanning => match scan {
                    Some(scan) => self.handle_scan(&scan).await,
                    None => {
                        debug!("ranging stream ended");
                        scans_open = false;
                    }
                },
                inbound = self.inbound_rx.recv() => {
                    let Some(inbound) = inbound else {
                        break ClientExit::Shutdown;
                    };
                    if let Some(exit) = self.handle_inbound(inbound).await {
                        break exit;
                    }
                }
                command = self.commands.recv() => match command {
                    Some(Command::SubmitMove(mv, reply)) => {
                        let _ = reply.send(self.handle_submit(mv).await);
                    }
                    Some(Command::Shutdown) | None => break ClientExit::Shutdown,
                },
                _ = tokio::time::sleep_until(join_deadline.unwrap_or_else(Instant::now)), if join_deadline.is_some() => {
                    self.abandon_session("opponent did not join in time").await;
                }
                changed = connectivity.changed(), if connectivity_open => match changed {
                    Ok(()) => {
                        let can_scan = connectivity.borrow_and_update().can_scan();
                        self.set_scanning(can_scan, &mut scans);
                    }
                    Err(_) => connectivity_open = false,
                },
            }
        };

        self.close().await;
        info!(?exit, "client stopped");
        Ok(exit)
    }

    /// Deadline for the opponent to join the current session, if still waiting.
    fn join_deadline(&self) -> Option<Instant> {
        let active = self.active.as_ref()?;
        if active.tracker.opponent_joined() || active.tracker.phase().is_final() {
            return None;
        }
        Some(active.entered_at + self.config.join_timeout)
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn set_scanning(&mut self, can_scan: bool, scans: &mut mpsc::Receiver<Vec<RangedBeacon>>) {
        if self.scanning == can_scan {
            return;
        }
        self.scanning = can_scan;

        // Results ranged around a radio transition are stale either way.
        let mut dropped = 0;
        while scans.try_recv().is_ok() {
            dropped += 1;
        }
        if can_scan {
            info!(dropped, "scanning resumed");
        } else {
            info!(dropped, "scanning suspended");
        }
        self.emit(ClientEvent::ScanningChanged { enabled: can_scan });
    }

    async fn handle_scan(&mut self, scan: &[RangedBeacon]) {
        let Some(fixes) = self.beacons.select_fixes(scan) else {
            debug!(ranged = scan.len(), "not enough known beacons in scan");
            return;
        };

        let position = match estimate_position(&fixes) {
            Ok(position) => position,
            Err(e) => {
                debug!("skipping scan cycle: {}", e);
                return;
            }
        };

        self.me.position = Some(position);
        self.emit(ClientEvent::PositionUpdated { position });

        if let Err(e) = self.presence.publish_position(&self.me.id, position).await {
            warn!("failed to publish position: {}", e);
        }

        self.try_match().await;
    }

    async fn try_match(&mut self) {
        if self.active.is_some() || self.me.position.is_none() {
            return;
        }

        let candidates = self
            .roster
            .players()
            .filter(|peer| !self.finished_opponents.contains(&peer.id));
        let Some(opponent) = find_eligible_opponent(&self.me, candidates, self.config.proximity_meters) else {
            return;
        };

        match self.coordinator.create_or_join(&self.me.id, &opponent).await {
            Ok(session_id) => self.enter_session(session_id, opponent).await,
            Err(e) => warn!(opponent = %opponent, "session creation failed, retrying next cycle: {}", e),
        }
    }

    async fn enter_session(&mut self, session_id: SessionId, opponent: PlayerId) {
        if let Some(active) = &self.active {
            if active.tracker.session_id() != &session_id {
                debug!(session = %session_id, "already in a session, ignoring");
            }
            return;
        }
        if self.finished_opponents.contains(&opponent) {
            debug!(session = %session_id, "ignoring session with previous opponent");
            return;
        }

        let tx = self.inbound_tx.clone();
        let id = session_id.clone();
        let listener = match self
            .coordinator
            .on_session_change(&session_id, move |record| {
                let _ = tx.send(Inbound::Session(id.clone(), record));
            })
            .await
        {
            Ok(listener) => listener,
            Err(e) => {
                warn!(session = %session_id, "failed to watch session: {}", e);
                return;
            }
        };

        if let Err(e) = self.presence.set_current_game(&self.me.id, Some(&session_id)).await {
            warn!("failed to record current game: {}", e);
        }

        info!(session = %session_id, opponent = %opponent, "entered session");
        self.emit(ClientEvent::SessionCreated {
            session_id: session_id.clone(),
            opponent_id: opponent.clone(),
        });

        self.active = Some(ActiveSession {
            tracker: RoundTracker::new(session_id, self.me.id.clone()),
            opponent,
            entered_at: Instant::now(),
            _listener: listener,
        });
    }

    async fn handle_inbound(&mut self, inbound: Inbound) -> Option<ClientExit> {
        match inbound {
            Inbound::Peer(change) => {
                let opponent_left = change.kind == ChangeKind::Removed
                    && self
                        .active
                        .as_ref()
                        .is_some_and(|a| a.opponent == change.peer_id && !a.tracker.opponent_joined());
                if opponent_left {
                    self.abandon_session("opponent left before joining").await;
                }
                if self.roster.apply(&change) {
                    self.emit(ClientEvent::PeerRosterChanged {
                        peer_id: change.peer_id,
                        kind: change.kind,
                        position: change.position,
                    });
                    self.try_match().await;
                }
                None
            }
            Inbound::Pending(pending) => {
                if self.active.is_none() {
                    self.enter_session(pending.session_id, pending.opponent_id).await;
                }
                None
            }
            Inbound::Session(session_id, record) => {
                let actions = match self.active.as_mut() {
                    Some(active) if active.tracker.session_id() == &session_id => {
                        active.tracker.observe(record.as_ref())
                    }
                    _ => return None,
                };

                for action in actions {
                    if let Some(exit) = self.perform(&session_id, action).await {
                        return Some(exit);
                    }
                }
                None
            }
        }
    }

    async fn perform(&mut self, session_id: &SessionId, action: RoundAction) -> Option<ClientExit> {
        match action {
            RoundAction::Join => {
                if let Err(e) = self.coordinator.mark_joined(session_id, &self.me.id).await {
                    warn!(session = %session_id, "failed to join session: {}", e);
                }
            }
            RoundAction::Activate => {
                if let Err(e) = self.coordinator.activate(session_id).await {
                    warn!(session = %session_id, "failed to activate session: {}", e);
                }
            }
            RoundAction::RequestMove => {
                let round = self.active.as_ref().map_or(1, |a| a.tracker.rounds() + 1);
                self.emit(ClientEvent::AwaitingMove { session_id: session_id.clone(), round });
            }
            RoundAction::ResetOwnMove => {
                if let Err(e) = self.coordinator.reset_move(session_id, &self.me.id).await {
                    warn!(session = %session_id, "failed to reset move after draw: {}", e);
                }
            }
            RoundAction::Resolved(outcome) => {
                info!(
                    session = %session_id,
                    round = outcome.round,
                    own = %outcome.own_move,
                    opponent = %outcome.opponent_move,
                    result = ?outcome.result,
                    "round resolved"
                );
                self.emit(ClientEvent::RoundResolved { session_id: session_id.clone(), outcome });
            }
            RoundAction::Finished(result) => {
                self.emit(ClientEvent::SessionTerminal { session_id: session_id.clone(), result: Some(result) });
                return self.finish_session(Some(result)).await;
            }
            RoundAction::Closed => {
                info!(session = %session_id, "session closed before a decisive round");
                self.emit(ClientEvent::SessionTerminal { session_id: session_id.clone(), result: None });
                return self.finish_session(None).await;
            }
        }
        None
    }

    /// Give up on a session the opponent never joined.
    async fn abandon_session(&mut self, reason: &str) {
        let Some(session_id) = self.active.as_ref().map(|a| a.tracker.session_id().clone()) else {
            return;
        };
        info!(session = %session_id, reason, "abandoning session");
        self.emit(ClientEvent::SessionTerminal { session_id, result: None });
        self.finish_session(None).await;
    }

    async fn finish_session(&mut self, result: Option<RoundResult>) -> Option<ClientExit> {
        let active = self.active.take()?;
        let session_id = active.tracker.session_id().clone();
        self.finished_opponents.insert(active.opponent.clone());
        drop(active);

        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            coordinator.teardown(&session_id).await;
        });

        if let Err(e) = self.presence.set_current_game(&self.me.id, None).await {
            debug!("failed to clear current game: {}", e);
        }

        if result == Some(RoundResult::OpponentWins) && self.config.leave_on_defeat {
            info!("defeated, leaving the map");
            return Some(ClientExit::Eliminated);
        }
        None
    }

    async fn handle_submit(&mut self, mv: Move) -> Result<(), ClientError> {
        let Some(active) = self.active.as_mut() else {
            return Err(ClientError::NoActiveSession);
        };
        if !mv.is_playable() {
            return Err(SessionError::InvalidMove(mv.to_string()).into());
        }
        if !active.tracker.can_submit() {
            return Err(ClientError::MoveNotExpected);
        }

        self.coordinator
            .submit_move(active.tracker.session_id(), &self.me.id, mv)
            .await?;
        active.tracker.move_submitted();
        debug!(%mv, "move submitted");
        Ok(())
    }

    /// Leave any session in progress and log out.
    async fn close(&mut self) {
        if let Some(active) = self.active.take() {
            let session_id = active.tracker.session_id().clone();
            drop(active);
            self.coordinator.teardown(&session_id).await;
        }
        self.presence.remove_player(&self.me.id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::core::geo::Position;
    use crate::core::trilateration::KnownBeaconFix;
    use crate::game::player::Team;
    use crate::store::{InMemoryStore, PLAYERS_COLLECTION};
    use crate::sync::connectivity::{ConnectivityMonitor, Radio, RadioSignal};

    fn beacons() -> BeaconTable {
        BeaconTable::new([
            KnownBeaconFix { beacon_id: "b1".into(), position: Position::new(0.0, 0.0) },
            KnownBeaconFix { beacon_id: "b2".into(), position: Position::new(0.0, 0.0001) },
            KnownBeaconFix { beacon_id: "b3".into(), position: Position::new(0.0001, 0.0) },
        ])
    }

    fn config(name: &str, team: Team) -> ClientConfig {
        ClientConfig {
            player_name: name.to_string(),
            player_team: team,
            ..ClientConfig::default()
        }
    }

    async fn next_event<F>(rx: &mut broadcast::Receiver<ClientEvent>, mut predicate: F) -> ClientEvent
    where
        F: FnMut(&ClientEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(event) if predicate(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let store = Arc::new(InMemoryStore::new());
        let (client, handle) = GameClient::login(store.clone(), config("alice", Team::A), beacons())
            .await
            .unwrap();
        assert_eq!(handle.player_id().as_str(), "alice-A");
        assert_eq!(store.count(PLAYERS_COLLECTION).await, 1);

        let (_scan_tx, scans) = mpsc::channel(4);
        let monitor = ConnectivityMonitor::default();
        let task = tokio::spawn(client.run(scans, monitor.subscribe()));

        assert!(matches!(handle.submit_move(Move::Rock).await, Err(ClientError::NoActiveSession)));

        handle.shutdown().await;
        assert_eq!(task.await.unwrap().unwrap(), ClientExit::Shutdown);
        assert_eq!(store.count(PLAYERS_COLLECTION).await, 0);
        assert!(matches!(handle.submit_move(Move::Rock).await, Err(ClientError::Stopped)));
    }

    #[tokio::test]
    async fn test_scan_publishes_position() {
        let store = Arc::new(InMemoryStore::new());
        let (client, handle) = GameClient::login(store.clone(), config("alice", Team::A), beacons())
            .await
            .unwrap();
        let mut events = handle.subscribe();

        let (scan_tx, scans) = mpsc::channel(4);
        let monitor = ConnectivityMonitor::default();
        let task = tokio::spawn(client.run(scans, monitor.subscribe()));

        // Fewer than three known beacons: no fix.
        scan_tx.send(vec![RangedBeacon::new("b1", 1.0)]).await.unwrap();

        let truth = Position::new(0.00003, 0.00004);
        scan_tx.send(beacons().synthetic_scan(truth)).await.unwrap();

        let event = next_event(&mut events, |e| matches!(e, ClientEvent::PositionUpdated { .. })).await;
        let ClientEvent::PositionUpdated { position } = event else { unreachable!() };
        assert!(position.distance_meters(&truth) < 0.01);

        handle.shutdown().await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_radio_off_suspends_scanning() {
        let store = Arc::new(InMemoryStore::new());
        let (client, handle) = GameClient::login(store.clone(), config("alice", Team::A), beacons())
            .await
            .unwrap();
        let mut events = handle.subscribe();

        let (scan_tx, scans) = mpsc::channel(4);
        let monitor = ConnectivityMonitor::default();
        let task = tokio::spawn(client.run(scans, monitor.subscribe()));

        monitor.apply(Radio::Bluetooth, RadioSignal::Off);
        let event = next_event(&mut events, |e| matches!(e, ClientEvent::ScanningChanged { .. })).await;
        assert_eq!(event, ClientEvent::ScanningChanged { enabled: false });

        // Ranged while suspended: discarded on resume.
        scan_tx.send(beacons().synthetic_scan(Position::new(0.00003, 0.00004))).await.unwrap();

        monitor.apply(Radio::Bluetooth, RadioSignal::On);
        let event = next_event(&mut events, |e| matches!(e, ClientEvent::ScanningChanged { .. })).await;
        assert_eq!(event, ClientEvent::ScanningChanged { enabled: true });

        let stale = tokio::time::timeout(
            Duration::from_millis(200),
            next_event(&mut events, |e| matches!(e, ClientEvent::PositionUpdated { .. })),
        )
        .await;
        assert!(stale.is_err());

        handle.shutdown().await;
        task.await.unwrap().unwrap();
    }
}
