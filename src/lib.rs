//! # Beacon Duel
//!
//! Proximity rock-paper-scissors for indoor venues. Each player's position is
//! trilaterated from Bluetooth beacon ranges; players of opposing teams who
//! come within a couple of meters of each other are paired into a duel that
//! is played entirely through a shared realtime document store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        BEACON DUEL                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Positioning (pure)                        │
//! │  ├── geo.rs      - Positions, haversine, local frame         │
//! │  └── trilateration.rs - Beacon table and solver              │
//! │                                                              │
//! │  game/           - Duel rules (pure)                         │
//! │  ├── player.rs   - Player ids and teams                      │
//! │  ├── proximity.rs- Opponent selection                        │
//! │  ├── moves.rs    - Moves and round resolution                │
//! │  ├── session.rs  - Shared session record                     │
//! │  ├── round.rs    - Per-side round state machine              │
//! │  └── events.rs   - Presentation events                       │
//! │                                                              │
//! │  store/          - Shared document store                     │
//! │  ├── mod.rs      - Store trait, filters, subscriptions       │
//! │  └── memory.rs   - In-process implementation                 │
//! │                                                              │
//! │  sync/           - Store-facing services (async)             │
//! │  ├── protocol.rs - Record codec                              │
//! │  ├── coordinator.rs - Session lifecycle                      │
//! │  ├── presence.rs - Player records and roster                 │
//! │  ├── connectivity.rs - Radio state                           │
//! │  └── client.rs   - Per-player event loop                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! The two peers never talk directly. Agreement comes from the record itself:
//! - Session ids are a pure function of the player pair, so both sides
//!   creating "their" session converge on one record.
//! - Creation never overwrites existing fields.
//! - Each side only writes its own status and move fields.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use config::{ClientConfig, ConfigError};
pub use self::core::geo::Position;
pub use self::core::trilateration::{estimate_position, BeaconTable, GeometryError, RangedBeacon};
pub use game::events::ClientEvent;
pub use game::moves::{Move, RoundResult};
pub use game::player::{Player, PlayerId, Team};
pub use game::session::{GameSession, SessionId};
pub use store::{DocumentStore, InMemoryStore, StoreError};
pub use sync::{ClientHandle, GameClient, SessionCoordinator, SessionError, PresenceSync};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
