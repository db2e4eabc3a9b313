//! Player Identity
//!
//! Player ids are plain strings composed from the login name and team, so
//! both peers can name each other without a registry.

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::geo::Position;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Separates the login name from the team in a [`PlayerId`].
pub const NAME_SEPARATOR: char = '-';

/// Login name that cannot be composed into an unambiguous id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidName {
    /// Blank name.
    #[error("player name must not be empty")]
    Empty,

    /// Name contains the id separator.
    #[error("player name {0:?} must not contain '{sep}'", sep = NAME_SEPARATOR)]
    ContainsSeparator(String),
}

/// Check that `name` can be used to log in.
///
/// Names never contain [`NAME_SEPARATOR`], so an id splits back into exactly
/// one name and team, and a session id into exactly one pair.
pub fn validate_name(name: &str) -> Result<(), InvalidName> {
    if name.trim().is_empty() {
        return Err(InvalidName::Empty);
    }
    if name.contains(NAME_SEPARATOR) {
        return Err(InvalidName::ContainsSeparator(name.to_owned()));
    }
    Ok(())
}

/// Unique player identifier, `"{name}-{team}"`.
///
/// Ordering is lexicographic on the underlying string. Matchmaking and
/// session naming rely on this order being identical on every client.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Compose the id a player gets on login.
    pub fn compose(name: &str, team: Team) -> Self {
        Self(format!("{}-{}", name, team))
    }

    /// Borrow the id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for PlayerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// TEAM
// =============================================================================

/// The two opposing teams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    /// Team A
    A,
    /// Team B
    B,
}

impl Team {
    /// The opposing team.
    pub fn opponent(self) -> Team {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::A => f.write_str("A"),
            Team::B => f.write_str("B"),
        }
    }
}

/// Unrecognized team name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown team: {0}")]
pub struct UnknownTeam(pub String);

impl FromStr for Team {
    type Err = UnknownTeam;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Team::A),
            "B" | "b" => Ok(Team::B),
            other => Err(UnknownTeam(other.to_owned())),
        }
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// A participant as cached by one client.
///
/// The store copy is authoritative; `position` may lag until the next push.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Unique id.
    pub id: PlayerId,
    /// Team membership.
    pub team: Team,
    /// Last known position, if any fix has been published.
    pub position: Option<Position>,
}

impl Player {
    /// Create a player with no known position.
    pub fn new(id: PlayerId, team: Team) -> Self {
        Self { id, team, position: None }
    }

    /// Log in as `name` on `team`.
    pub fn login(name: &str, team: Team) -> Result<Self, InvalidName> {
        validate_name(name)?;
        Ok(Self::new(PlayerId::compose(name, team), team))
    }

    /// Builder-style position setter.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// True if the two players are on different teams.
    #[inline]
    pub fn is_opponent_of(&self, other: &Player) -> bool {
        self.team != other.team
    }
}
