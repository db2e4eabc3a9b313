//! Sync Layer
//!
//! Everything that talks to the shared store or reacts to the outside world.
//! This layer is **asynchronous**; the rules it drives live in `game/`.

pub mod listener;
pub mod protocol;
pub mod coordinator;
pub mod presence;
pub mod connectivity;
pub mod client;

pub use listener::ListenerHandle;
pub use coordinator::{SessionCoordinator, SessionError};
pub use presence::{PeerChange, PeerRoster, PendingSession, PresenceError, PresenceSync};
pub use connectivity::{Connectivity, ConnectivityMonitor, Radio, RadioSignal, RadioState};
pub use client::{ClientError, ClientExit, ClientHandle, GameClient};
