//! Game Logic Module
//!
//! Pure duel rules. No I/O.
//!
//! ## Module Structure
//!
//! - `player`: Player identity and teams
//! - `proximity`: Opponent selection
//! - `moves`: Moves and round resolution
//! - `session`: Shared session record
//! - `round`: Per-side session state machine
//! - `events`: Presentation events

pub mod player;
pub mod proximity;
pub mod moves;
pub mod session;
pub mod round;
pub mod events;

// Re-export key types
pub use player::{Player, PlayerId, Team};
pub use proximity::{find_eligible_opponent, DEFAULT_PROXIMITY_METERS};
pub use moves::{resolve_round, Move, RoundResult};
pub use session::{GameSession, PlayerStatus, SessionId, SessionStatus};
pub use round::{RoundAction, RoundOutcome, RoundTracker, SessionPhase};
pub use events::{ChangeKind, ClientEvent};
