//! Two full clients dueling over one in-memory store.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use beacon_duel::core::geo::LocalFrame;
use beacon_duel::core::trilateration::KnownBeaconFix;
use beacon_duel::store::{GAMES_COLLECTION, PLAYERS_COLLECTION};
use beacon_duel::sync::{ClientError, ClientExit, ConnectivityMonitor, PresenceSync, SessionError};
use beacon_duel::{
    BeaconTable, ClientConfig, ClientEvent, ClientHandle, GameClient, InMemoryStore, Move,
    Position, RangedBeacon, RoundResult, SessionId, Team,
};

const ORIGIN: Position = Position::new(45.0, 7.0);

fn venue() -> (BeaconTable, LocalFrame) {
    let frame = LocalFrame::new(ORIGIN);
    let table = BeaconTable::new([
        KnownBeaconFix { beacon_id: "b1".into(), position: ORIGIN },
        KnownBeaconFix { beacon_id: "b2".into(), position: frame.unproject(20.0, 0.0) },
        KnownBeaconFix { beacon_id: "b3".into(), position: frame.unproject(0.0, 20.0) },
    ]);
    (table, frame)
}

struct Running {
    handle: ClientHandle,
    events: broadcast::Receiver<ClientEvent>,
    scans: mpsc::Sender<Vec<RangedBeacon>>,
    task: JoinHandle<Result<ClientExit, ClientError>>,
}

async fn start(
    store: &Arc<InMemoryStore>,
    monitor: &ConnectivityMonitor,
    table: &BeaconTable,
    name: &str,
    team: Team,
    proximity_meters: f64,
) -> Running {
    let config = ClientConfig {
        player_name: name.to_string(),
        player_team: team,
        proximity_meters,
        ..ClientConfig::default()
    };
    start_with(store, monitor, table, config).await
}

async fn start_with(
    store: &Arc<InMemoryStore>,
    monitor: &ConnectivityMonitor,
    table: &BeaconTable,
    config: ClientConfig,
) -> Running {
    let (client, handle) = GameClient::login(store.clone(), config, table.clone()).await.unwrap();
    let events = handle.subscribe();
    let (scans, scan_rx) = mpsc::channel(8);
    let task = tokio::spawn(client.run(scan_rx, monitor.subscribe()));
    Running { handle, events, scans, task }
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

async fn awaiting_round(rx: &mut broadcast::Receiver<ClientEvent>) -> u32 {
    match next_event(rx, |e| matches!(e, ClientEvent::AwaitingMove { .. })).await {
        ClientEvent::AwaitingMove { round, .. } => round,
        _ => unreachable!(),
    }
}

async fn resolved(rx: &mut broadcast::Receiver<ClientEvent>) -> RoundResult {
    match next_event(rx, |e| matches!(e, ClientEvent::RoundResolved { .. })).await {
        ClientEvent::RoundResolved { outcome, .. } => outcome.result,
        _ => unreachable!(),
    }
}

async fn terminal(rx: &mut broadcast::Receiver<ClientEvent>) -> Option<RoundResult> {
    match next_event(rx, |e| matches!(e, ClientEvent::SessionTerminal { .. })).await {
        ClientEvent::SessionTerminal { result, .. } => result,
        _ => unreachable!(),
    }
}

async fn session_created(rx: &mut broadcast::Receiver<ClientEvent>) -> SessionId {
    session_created_with(rx).await.0
}

async fn session_created_with(rx: &mut broadcast::Receiver<ClientEvent>) -> (SessionId, String) {
    match next_event(rx, |e| matches!(e, ClientEvent::SessionCreated { .. })).await {
        ClientEvent::SessionCreated { session_id, opponent_id } => (session_id, opponent_id.as_str().to_string()),
        _ => unreachable!(),
    }
}

async fn eventually_count(store: &InMemoryStore, collection: &str, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.count(collection).await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never reached {} records", collection, expected));
}

#[tokio::test]
async fn test_draw_then_decisive_duel() {
    let store = Arc::new(InMemoryStore::new());
    let monitor = ConnectivityMonitor::default();
    let (table, frame) = venue();

    let mut alice = start(&store, &monitor, &table, "alice", Team::A, 2.0).await;
    let mut bob = start(&store, &monitor, &table, "bob", Team::B, 2.0).await;

    alice.scans.send(table.synthetic_scan(frame.unproject(5.0, 5.0))).await.unwrap();
    bob.scans.send(table.synthetic_scan(frame.unproject(15.0, 15.0))).await.unwrap();
    bob.scans.send(table.synthetic_scan(frame.unproject(5.6, 5.8))).await.unwrap();

    let session = session_created(&mut alice.events).await;
    assert_eq!(session.as_str(), "alice-A-vs-bob-B");
    assert_eq!(session_created(&mut bob.events).await, session);
    assert_eq!(store.count(GAMES_COLLECTION).await, 1);

    // Round 1: paper vs paper.
    assert_eq!(awaiting_round(&mut alice.events).await, 1);
    assert_eq!(awaiting_round(&mut bob.events).await, 1);

    assert!(matches!(
        alice.handle.submit_move(Move::Idle).await,
        Err(ClientError::Session(SessionError::InvalidMove(_)))
    ));
    alice.handle.submit_move(Move::Paper).await.unwrap();
    assert!(matches!(
        alice.handle.submit_move(Move::Rock).await,
        Err(ClientError::MoveNotExpected)
    ));
    bob.handle.submit_move(Move::Paper).await.unwrap();

    assert_eq!(resolved(&mut alice.events).await, RoundResult::Draw);
    assert_eq!(resolved(&mut bob.events).await, RoundResult::Draw);

    // Round 2: rock beats scissors.
    assert_eq!(awaiting_round(&mut alice.events).await, 2);
    assert_eq!(awaiting_round(&mut bob.events).await, 2);
    alice.handle.submit_move(Move::Rock).await.unwrap();
    bob.handle.submit_move(Move::Scissors).await.unwrap();

    assert_eq!(terminal(&mut alice.events).await, Some(RoundResult::MainWins));
    assert_eq!(terminal(&mut bob.events).await, Some(RoundResult::OpponentWins));

    // The loser logs out; the winner stays on the map.
    assert_eq!(bob.task.await.unwrap().unwrap(), ClientExit::Eliminated);
    eventually_count(&store, GAMES_COLLECTION, 0).await;
    eventually_count(&store, PLAYERS_COLLECTION, 1).await;

    alice.handle.shutdown().await;
    assert_eq!(alice.task.await.unwrap().unwrap(), ClientExit::Shutdown);
    assert_eq!(store.count(PLAYERS_COLLECTION).await, 0);
}

#[tokio::test]
async fn test_one_sided_detection_still_joins() {
    let store = Arc::new(InMemoryStore::new());
    let monitor = ConnectivityMonitor::default();
    let (table, frame) = venue();

    // Alice's matcher never fires at one meter.
    let mut alice = start(&store, &monitor, &table, "alice", Team::A, 0.5).await;
    let mut bob = start(&store, &monitor, &table, "bob", Team::B, 2.0).await;

    alice.scans.send(table.synthetic_scan(frame.unproject(5.0, 5.0))).await.unwrap();
    bob.scans.send(table.synthetic_scan(frame.unproject(5.6, 5.8))).await.unwrap();

    let session = session_created(&mut bob.events).await;
    assert_eq!(session_created(&mut alice.events).await, session);

    assert_eq!(awaiting_round(&mut alice.events).await, 1);
    assert_eq!(awaiting_round(&mut bob.events).await, 1);
    alice.handle.submit_move(Move::Scissors).await.unwrap();
    bob.handle.submit_move(Move::Rock).await.unwrap();

    assert_eq!(terminal(&mut alice.events).await, Some(RoundResult::OpponentWins));
    assert_eq!(terminal(&mut bob.events).await, Some(RoundResult::MainWins));
    assert_eq!(alice.task.await.unwrap().unwrap(), ClientExit::Eliminated);

    bob.handle.shutdown().await;
    assert_eq!(bob.task.await.unwrap().unwrap(), ClientExit::Shutdown);
    eventually_count(&store, GAMES_COLLECTION, 0).await;
    eventually_count(&store, PLAYERS_COLLECTION, 0).await;
}

#[tokio::test]
async fn test_opponent_leaving_closes_session() {
    let store = Arc::new(InMemoryStore::new());
    let monitor = ConnectivityMonitor::default();
    let (table, frame) = venue();

    let mut alice = start(&store, &monitor, &table, "alice", Team::A, 2.0).await;
    let mut bob = start(&store, &monitor, &table, "bob", Team::B, 2.0).await;

    alice.scans.send(table.synthetic_scan(frame.unproject(5.0, 5.0))).await.unwrap();
    bob.scans.send(table.synthetic_scan(frame.unproject(5.6, 5.8))).await.unwrap();

    assert_eq!(awaiting_round(&mut alice.events).await, 1);
    assert_eq!(awaiting_round(&mut bob.events).await, 1);

    bob.handle.shutdown().await;
    assert_eq!(bob.task.await.unwrap().unwrap(), ClientExit::Shutdown);

    assert_eq!(terminal(&mut alice.events).await, None);
    assert!(matches!(
        alice.handle.submit_move(Move::Rock).await,
        Err(ClientError::NoActiveSession)
    ));

    alice.handle.shutdown().await;
    alice.task.await.unwrap().unwrap();
    eventually_count(&store, GAMES_COLLECTION, 0).await;
}

#[tokio::test]
async fn test_opponent_gone_before_joining_frees_client() {
    let store = Arc::new(InMemoryStore::new());
    let monitor = ConnectivityMonitor::default();
    let (table, frame) = venue();

    let mut alice = start(&store, &monitor, &table, "alice", Team::A, 2.0).await;

    // A peer that publishes a position but never runs a client loop.
    let presence = PresenceSync::new(store.clone());
    let bob = presence.register_player("bob", Team::B).await.unwrap();
    presence.publish_position(&bob.id, frame.unproject(5.6, 5.8)).await.unwrap();

    alice.scans.send(table.synthetic_scan(frame.unproject(5.0, 5.0))).await.unwrap();
    let (session, opponent) = session_created_with(&mut alice.events).await;
    assert_eq!(session.as_str(), "alice-A-vs-bob-B");
    assert_eq!(opponent, "bob-B");

    presence.remove_player(&bob.id).await;
    assert_eq!(terminal(&mut alice.events).await, None);
    eventually_count(&store, GAMES_COLLECTION, 0).await;

    // Alice is free to match again.
    let mut carol = start(&store, &monitor, &table, "carol", Team::B, 2.0).await;
    carol.scans.send(table.synthetic_scan(frame.unproject(5.3, 5.0))).await.unwrap();

    let (session, opponent) = session_created_with(&mut alice.events).await;
    assert_eq!(session.as_str(), "alice-A-vs-carol-B");
    assert_eq!(opponent, "carol-B");
    assert_eq!(session_created(&mut carol.events).await, session);

    alice.handle.shutdown().await;
    carol.handle.shutdown().await;
    alice.task.await.unwrap().unwrap();
    carol.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_join_timeout_abandons_session() {
    let store = Arc::new(InMemoryStore::new());
    let monitor = ConnectivityMonitor::default();
    let (table, frame) = venue();

    let config = ClientConfig {
        player_name: "alice".to_string(),
        player_team: Team::A,
        proximity_meters: 2.0,
        join_timeout: Duration::from_millis(200),
        ..ClientConfig::default()
    };
    let mut alice = start_with(&store, &monitor, &table, config).await;

    let presence = PresenceSync::new(store.clone());
    let bob = presence.register_player("bob", Team::B).await.unwrap();
    presence.publish_position(&bob.id, frame.unproject(5.6, 5.8)).await.unwrap();

    alice.scans.send(table.synthetic_scan(frame.unproject(5.0, 5.0))).await.unwrap();
    session_created(&mut alice.events).await;

    assert_eq!(terminal(&mut alice.events).await, None);
    eventually_count(&store, GAMES_COLLECTION, 0).await;
    assert!(matches!(
        alice.handle.submit_move(Move::Rock).await,
        Err(ClientError::NoActiveSession)
    ));

    // The absent peer is not matched again.
    alice.scans.send(table.synthetic_scan(frame.unproject(5.0, 5.1))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.count(GAMES_COLLECTION).await, 0);
    assert_eq!(store.count(PLAYERS_COLLECTION).await, 2);

    alice.handle.shutdown().await;
    assert_eq!(alice.task.await.unwrap().unwrap(), ClientExit::Shutdown);
}
