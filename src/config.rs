//! Client Configuration
//!
//! Defaults plus `DUEL_*` environment overrides.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::game::player::{validate_name, InvalidName, Team};
use crate::game::proximity::DEFAULT_PROXIMITY_METERS;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Variable present but unusable.
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
        /// What was wrong.
        reason: &'static str,
    },
}

/// Per-client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Maximum distance to an eligible opponent, in meters.
    pub proximity_meters: f64,
    /// Beacon reference table file.
    pub beacon_table: Option<PathBuf>,
    /// Login name.
    pub player_name: String,
    /// Login team.
    pub player_team: Team,
    /// Capacity of the presentation event channel.
    pub event_capacity: usize,
    /// Log out after losing a duel instead of returning to the map.
    pub leave_on_defeat: bool,
    /// How long to wait for the opponent to join before abandoning a session.
    pub join_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proximity_meters: DEFAULT_PROXIMITY_METERS,
            beacon_table: None,
            player_name: "player".to_string(),
            player_team: Team::A,
            event_capacity: 64,
            leave_on_defeat: true,
            join_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// - `DUEL_PROXIMITY_METERS`: finite, positive
    /// - `DUEL_BEACON_TABLE`: path
    /// - `DUEL_PLAYER_NAME`, `DUEL_PLAYER_TEAM` (`A` or `B`)
    /// - `DUEL_EVENT_CAPACITY`: positive
    /// - `DUEL_LEAVE_ON_DEFEAT`: `true`/`1` or `false`/`0`
    /// - `DUEL_JOIN_TIMEOUT_MS`: positive
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(meters) = parse::<f64>(&lookup, "DUEL_PROXIMITY_METERS")? {
            if !meters.is_finite() || meters <= 0.0 {
                return Err(invalid("DUEL_PROXIMITY_METERS", meters.to_string(), "must be a positive distance"));
            }
            config.proximity_meters = meters;
        }

        if let Some(path) = lookup("DUEL_BEACON_TABLE").filter(|p| !p.is_empty()) {
            config.beacon_table = Some(PathBuf::from(path));
        }

        if let Some(name) = lookup("DUEL_PLAYER_NAME") {
            let trimmed = name.trim();
            match validate_name(trimmed) {
                Ok(()) => config.player_name = trimmed.to_string(),
                Err(InvalidName::Empty) => return Err(invalid("DUEL_PLAYER_NAME", name, "must not be empty")),
                Err(InvalidName::ContainsSeparator(_)) => {
                    return Err(invalid("DUEL_PLAYER_NAME", name, "must not contain '-'"))
                }
            }
        }

        if let Some(team) = parse::<Team>(&lookup, "DUEL_PLAYER_TEAM")? {
            config.player_team = team;
        }

        if let Some(capacity) = parse::<usize>(&lookup, "DUEL_EVENT_CAPACITY")? {
            if capacity == 0 {
                return Err(invalid("DUEL_EVENT_CAPACITY", "0".into(), "must be positive"));
            }
            config.event_capacity = capacity;
        }

        if let Some(flag) = lookup("DUEL_LEAVE_ON_DEFEAT") {
            config.leave_on_defeat = match flag.as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(invalid("DUEL_LEAVE_ON_DEFEAT", flag, "expected true or false")),
            };
        }

        if let Some(millis) = parse::<u64>(&lookup, "DUEL_JOIN_TIMEOUT_MS")? {
            if millis == 0 {
                return Err(invalid("DUEL_JOIN_TIMEOUT_MS", "0".into(), "must be positive"));
            }
            config.join_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(name, raw, "could not be parsed")),
    }
}

fn invalid(name: &'static str, value: String, reason: &'static str) -> ConfigError {
    ConfigError::InvalidValue { name, value, reason }
}
