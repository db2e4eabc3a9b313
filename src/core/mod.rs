//! Core positioning primitives.
//!
//! Pure geometry with no I/O: positions, distance models and trilateration.

pub mod geo;
pub mod trilateration;

// Re-export core types
pub use geo::{LocalFrame, Position, EARTH_RADIUS_METERS, METERS_PER_DEGREE_LAT};
pub use trilateration::{
    estimate_position, BeaconFix, BeaconId, BeaconTable, BeaconTableError, GeometryError,
    KnownBeaconFix, RangedBeacon,
};
