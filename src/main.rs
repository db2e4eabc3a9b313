//! Beacon Duel Demo
//!
//! Runs two clients against an in-process store: both log in, the rival
//! walks up to the first player, and the pair plays one drawn round followed
//! by a decisive one.

use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use beacon_duel::{
    BeaconTable, ClientConfig, ClientEvent, ClientHandle, GameClient, InMemoryStore, Move,
    Position, RoundResult, VERSION,
    core::geo::LocalFrame,
    core::trilateration::KnownBeaconFix,
    sync::ConnectivityMonitor,
};

/// Moves each side plays, by round.
const FIRST_SCRIPT: &[Move] = &[Move::Paper, Move::Rock];
const RIVAL_SCRIPT: &[Move] = &[Move::Paper, Move::Scissors];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Beacon Duel v{}", VERSION);

    let config = ClientConfig::from_env().context("invalid configuration")?;
    let beacons = match &config.beacon_table {
        Some(path) => BeaconTable::load(path)
            .with_context(|| format!("failed to load beacon table {}", path.display()))?,
        None => demo_beacons(),
    };
    info!("Proximity threshold: {} m, {} beacons", config.proximity_meters, beacons.len());

    demo_match(config, beacons).await
}

/// Three beacons on a 20 m right triangle.
fn demo_beacons() -> BeaconTable {
    let origin = Position::new(52.3702, 4.8952);
    let frame = LocalFrame::new(origin);
    BeaconTable::new([
        KnownBeaconFix { beacon_id: "C4:7C:8D:00:00:01".into(), position: origin },
        KnownBeaconFix { beacon_id: "C4:7C:8D:00:00:02".into(), position: frame.unproject(20.0, 0.0) },
        KnownBeaconFix { beacon_id: "C4:7C:8D:00:00:03".into(), position: frame.unproject(0.0, 20.0) },
    ])
}

async fn demo_match(config: ClientConfig, beacons: BeaconTable) -> Result<()> {
    info!("=== Starting Demo Match ===");

    let origin = beacons
        .iter()
        .next()
        .map(|(_, position)| *position)
        .context("beacon table is empty")?;
    let frame = LocalFrame::new(origin);

    let store = Arc::new(InMemoryStore::new());
    let monitor = ConnectivityMonitor::default();

    let rival_config = ClientConfig {
        player_name: format!("{}_rival", config.player_name),
        player_team: config.player_team.opponent(),
        ..config.clone()
    };

    let (first, first_handle) = GameClient::login(store.clone(), config, beacons.clone()).await?;
    let (rival, rival_handle) = GameClient::login(store.clone(), rival_config, beacons.clone()).await?;

    let first_player = tokio::spawn(play(first_handle.clone(), first_handle.subscribe(), FIRST_SCRIPT));
    let rival_player = tokio::spawn(play(rival_handle.clone(), rival_handle.subscribe(), RIVAL_SCRIPT));

    let (first_scans, first_rx) = mpsc::channel(8);
    let (rival_scans, rival_rx) = mpsc::channel(8);
    let first_task = tokio::spawn(first.run(first_rx, monitor.subscribe()));
    let rival_task = tokio::spawn(rival.run(rival_rx, monitor.subscribe()));

    // The first player stands still; the rival walks over.
    first_scans.send(beacons.synthetic_scan(frame.unproject(5.0, 5.0))).await?;
    for (x, y) in [(15.0, 15.0), (11.0, 11.0), (8.0, 8.0), (5.8, 5.6)] {
        tokio::time::sleep(Duration::from_millis(100)).await;
        rival_scans.send(beacons.synthetic_scan(frame.unproject(x, y))).await?;
    }

    let results = tokio::time::timeout(Duration::from_secs(10), async {
        (first_player.await, rival_player.await)
    })
    .await
    .context("duel did not finish")?;

    match results {
        (Ok(first), Ok(rival)) => info!(first = ?first, rival = ?rival, "duel finished"),
        (first, rival) => warn!(?first, ?rival, "player task failed"),
    }

    first_handle.shutdown().await;
    rival_handle.shutdown().await;
    let first_exit = first_task.await??;
    let rival_exit = rival_task.await??;
    info!(?first_exit, ?rival_exit, "clients stopped");

    info!("=== Demo Match Complete ===");
    Ok(())
}

/// Answer every move request from `script` until the session ends.
async fn play(
    handle: ClientHandle,
    mut events: broadcast::Receiver<ClientEvent>,
    script: &'static [Move],
) -> Option<RoundResult> {
    loop {
        match events.recv().await {
            Ok(ClientEvent::AwaitingMove { round, .. }) => {
                let mv = script[round.saturating_sub(1) as usize % script.len()];
                info!(player = %handle.player_id(), round, %mv, "playing");
                if let Err(e) = handle.submit_move(mv).await {
                    warn!(player = %handle.player_id(), "move rejected: {}", e);
                }
            }
            Ok(ClientEvent::RoundResolved { outcome, .. }) => {
                info!(player = %handle.player_id(), round = outcome.round, result = ?outcome.result, "round over");
            }
            Ok(ClientEvent::SessionTerminal { result, .. }) => return result,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
