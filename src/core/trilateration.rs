//! Beacon Trilateration
//!
//! Estimates a 2-D position from ranged distances to three beacons whose
//! positions are known in advance.
//!
//! ## Algorithm
//!
//! All three fixes are projected into a [`LocalFrame`] anchored at the first fix.
//! Subtracting the circle equations of fixes (1, 2) and (2, 3) cancels the
//! quadratic terms and leaves a 2x2 linear system in the unknown offset `(x, y)`,
//! solved by Cramer's rule and projected back to degrees.

use std::collections::BTreeMap;
use std::path::Path;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use super::geo::{LocalFrame, Position};

/// Number of fixes the solver consumes.
pub const FIXES_REQUIRED: usize = 3;

/// Relative determinant magnitude below which the system is treated as singular.
const DEGENERATE_EPSILON: f64 = 1e-9;

/// Beacon identifier as reported by the ranging service.
pub type BeaconId = String;

/// A beacon observed during one scan cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangedBeacon {
    /// Beacon identifier.
    pub beacon_id: BeaconId,
    /// Estimated distance to the beacon in meters.
    pub distance_meters: f64,
}

impl RangedBeacon {
    /// Create a ranged beacon sample.
    pub fn new(beacon_id: impl Into<BeaconId>, distance_meters: f64) -> Self {
        Self {
            beacon_id: beacon_id.into(),
            distance_meters,
        }
    }
}

/// A reference beacon with a surveyed position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnownBeaconFix {
    /// Beacon identifier.
    pub beacon_id: BeaconId,
    /// Surveyed position.
    pub position: Position,
}

/// One trilateration input: measured distance to a known position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeaconFix {
    /// Measured distance in meters.
    pub distance: f64,
    /// Known beacon position.
    pub position: Position,
}

impl BeaconFix {
    /// Create a fix.
    pub const fn new(distance: f64, position: Position) -> Self {
        Self { distance, position }
    }
}

/// Trilateration failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// Reference points are collinear or coincident.
    #[error("degenerate beacon geometry (determinant {determinant:e})")]
    DegenerateGeometry {
        /// Determinant of the linear system.
        determinant: f64,
    },

    /// A measured distance is negative or not a number.
    #[error("invalid beacon distance: {0}")]
    InvalidDistance(f64),
}

/// Estimate the position that best explains three ranged distances.
///
/// Pure function: identical inputs always give identical outputs.
pub fn estimate_position(fixes: &[BeaconFix; FIXES_REQUIRED]) -> Result<Position, GeometryError> {
    for fix in fixes {
        if !fix.distance.is_finite() || fix.distance < 0.0 {
            return Err(GeometryError::InvalidDistance(fix.distance));
        }
    }

    let frame = LocalFrame::new(fixes[0].position);
    let (x1, y1) = frame.project(&fixes[0].position);
    let (x2, y2) = frame.project(&fixes[1].position);
    let (x3, y3) = frame.project(&fixes[2].position);
    let (r1, r2, r3) = (fixes[0].distance, fixes[1].distance, fixes[2].distance);

    // a*x + b*y = c  (fixes 1 and 2)
    // d*x + e*y = f  (fixes 2 and 3)
    let a = 2.0 * (x2 - x1);
    let b = 2.0 * (y2 - y1);
    let c = r1 * r1 - r2 * r2 - x1 * x1 + x2 * x2 - y1 * y1 + y2 * y2;
    let d = 2.0 * (x3 - x2);
    let e = 2.0 * (y3 - y2);
    let f = r2 * r2 - r3 * r3 - x2 * x2 + x3 * x3 - y2 * y2 + y3 * y3;

    let determinant = a * e - b * d;
    let scale = (a.abs() + b.abs()) * (d.abs() + e.abs());
    if scale == 0.0 || determinant.abs() <= DEGENERATE_EPSILON * scale {
        return Err(GeometryError::DegenerateGeometry { determinant });
    }

    let x = (c * e - b * f) / determinant;
    let y = (a * f - c * d) / determinant;

    let estimate = frame.unproject(x, y);
    if !estimate.is_finite() {
        return Err(GeometryError::DegenerateGeometry { determinant });
    }
    Ok(estimate)
}

// =============================================================================
// REFERENCE TABLE
// =============================================================================

/// Errors loading the beacon reference table.
#[derive(Debug, Error)]
pub enum BeaconTableError {
    /// File could not be read.
    #[error("failed to read beacon table: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid table JSON.
    #[error("failed to parse beacon table: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct TableFile {
    items: Vec<TableEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableEntry {
    beacon_uid: String,
    latitude: f64,
    longitude: f64,
}

/// Static lookup from beacon id to surveyed position.
///
/// Loaded once at startup and never mutated afterwards.
#[derive(Clone, Debug, Default)]
pub struct BeaconTable {
    fixes: BTreeMap<BeaconId, Position>,
}

impl BeaconTable {
    /// Build a table from known fixes. Later duplicates win.
    pub fn new(fixes: impl IntoIterator<Item = KnownBeaconFix>) -> Self {
        Self {
            fixes: fixes
                .into_iter()
                .map(|fix| (fix.beacon_id, fix.position))
                .collect(),
        }
    }

    /// Parse `{"items": [{"beaconUid", "latitude", "longitude"}, ...]}`.
    pub fn from_json(json: &str) -> Result<Self, BeaconTableError> {
        let file: TableFile = serde_json::from_str(json)?;
        Ok(Self::new(file.items.into_iter().map(|entry| KnownBeaconFix {
            beacon_id: entry.beacon_uid,
            position: Position::new(entry.latitude, entry.longitude),
        })))
    }

    /// Read and parse a table file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BeaconTableError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Position of a beacon, if surveyed.
    pub fn get(&self, beacon_id: &str) -> Option<Position> {
        self.fixes.get(beacon_id).copied()
    }

    /// Surveyed beacons, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = (&BeaconId, &Position)> {
        self.fixes.iter()
    }

    /// Number of surveyed beacons.
    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    /// True if no beacons are surveyed.
    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    /// Pick the three closest surveyed beacons from one scan cycle.
    ///
    /// Unknown beacons are ignored. Ties in distance are broken by beacon id so
    /// the selection does not depend on scan order. Returns `None` when fewer
    /// than three surveyed beacons were ranged.
    pub fn select_fixes(&self, scan: &[RangedBeacon]) -> Option<[BeaconFix; FIXES_REQUIRED]> {
        let mut known: Vec<(&RangedBeacon, Position)> = scan
            .iter()
            .filter_map(|beacon| self.get(&beacon.beacon_id).map(|pos| (beacon, pos)))
            .collect();

        known.sort_by(|(a, _), (b, _)| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then_with(|| a.beacon_id.cmp(&b.beacon_id))
        });

        match known.as_slice() {
            [first, second, third, ..] => Some([
                BeaconFix::new(first.0.distance_meters, first.1),
                BeaconFix::new(second.0.distance_meters, second.1),
                BeaconFix::new(third.0.distance_meters, third.1),
            ]),
            _ => None,
        }
    }

    /// Noise-free ranging of every surveyed beacon from `truth`.
    ///
    /// Stands in for the ranging service in simulations and the demo binary.
    pub fn synthetic_scan(&self, truth: Position) -> Vec<RangedBeacon> {
        let frame = LocalFrame::new(truth);
        self.fixes
            .iter()
            .map(|(id, position)| RangedBeacon::new(id.clone(), frame.distance(&truth, position)))
            .collect()
    }
}
