//! Geographic Positions
//!
//! Latitude/longitude value type plus the two distance models the crate needs:
//! a local planar frame for trilateration and great-circle distance for proximity.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Meters spanned by one degree of latitude.
pub const METERS_PER_DEGREE_LAT: f64 = 110_574.0;

/// Equatorial Earth radius (WGS-84) used for great-circle distance.
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// A point on the Earth's surface in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in decimal degrees (positive north).
    pub latitude: f64,
    /// Longitude in decimal degrees (positive east).
    pub longitude: f64,
}

impl Position {
    /// Create a new position.
    #[inline]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// True if both coordinates are finite numbers.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_meters(&self, other: &Position) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let h = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
    }
}

impl fmt::Display for Position {
    /// Degrees-minutes-seconds, e.g. `52° 13' 12.5" N, 21° 0' 36" E`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lat_d, lat_m, lat_s) = to_dms(self.latitude);
        let (lon_d, lon_m, lon_s) = to_dms(self.longitude);
        let ns = if self.latitude >= 0.0 { 'N' } else { 'S' };
        let ew = if self.longitude >= 0.0 { 'E' } else { 'W' };
        write!(
            f,
            "{}° {}' {:.2}\" {}, {}° {}' {:.2}\" {}",
            lat_d, lat_m, lat_s, ns, lon_d, lon_m, lon_s, ew
        )
    }
}

fn to_dms(value: f64) -> (u32, u32, f64) {
    let abs = value.abs();
    let degrees = abs.trunc();
    let minutes_f = (abs - degrees) * 60.0;
    let minutes = minutes_f.trunc();
    let seconds = (minutes_f - minutes) * 60.0;
    (degrees as u32, minutes as u32, seconds)
}

// =============================================================================
// LOCAL PLANAR FRAME
// =============================================================================

/// Equirectangular projection anchored at a reference position.
///
/// Offsets are in meters: `x` along latitude (north), `y` along longitude (east).
/// Accurate over the tens of meters a beacon deployment spans.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalFrame {
    origin: Position,
    lon_scale: f64,
}

impl LocalFrame {
    /// Anchor a frame at `origin`.
    pub fn new(origin: Position) -> Self {
        Self {
            origin,
            lon_scale: METERS_PER_DEGREE_LAT * origin.latitude.to_radians().cos(),
        }
    }

    /// The anchor position.
    #[inline]
    pub fn origin(&self) -> Position {
        self.origin
    }

    /// Meters per degree of longitude at the anchor latitude.
    #[inline]
    pub fn lon_scale(&self) -> f64 {
        self.lon_scale
    }

    /// Project a position to `(x, y)` meters from the origin.
    #[inline]
    pub fn project(&self, p: &Position) -> (f64, f64) {
        (
            (p.latitude - self.origin.latitude) * METERS_PER_DEGREE_LAT,
            (p.longitude - self.origin.longitude) * self.lon_scale,
        )
    }

    /// Inverse of [`LocalFrame::project`].
    #[inline]
    pub fn unproject(&self, x: f64, y: f64) -> Position {
        Position {
            latitude: self.origin.latitude + x / METERS_PER_DEGREE_LAT,
            longitude: self.origin.longitude + y / self.lon_scale,
        }
    }

    /// Planar distance in meters between two positions.
    pub fn distance(&self, a: &Position, b: &Position) -> f64 {
        let (ax, ay) = self.project(a);
        let (bx, by) = self.project(b);
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero() {
        let p = Position::new(52.2297, 21.0122);
        assert_eq!(p.distance_meters(&p), 0.0);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = Position::new(52.2297, 21.0122);
        let b = Position::new(52.2298, 21.0124);
        assert!((a.distance_meters(&b) - b.distance_meters(&a)).abs() < 1e-9);
    }

    #[test]
    fn test_distance_one_degree_longitude_at_equator() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(0.0, 1.0);
        let expected = EARTH_RADIUS_METERS * 1f64.to_radians();
        assert!((a.distance_meters(&b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_small_distance_matches_planar() {
        let a = Position::new(52.0, 21.0);
        let b = Position::new(52.00001, 21.00001);
        let frame = LocalFrame::new(a);
        let planar = frame.distance(&a, &b);
        let great_circle = a.distance_meters(&b);
        // Both models agree to within a few centimeters at beacon scale.
        assert!((planar - great_circle).abs() < 0.05);
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = LocalFrame::new(Position::new(52.0, 21.0));
        let p = Position::new(52.0003, 20.9996);
        let (x, y) = frame.project(&p);
        let back = frame.unproject(x, y);
        assert!((back.latitude - p.latitude).abs() < 1e-12);
        assert!((back.longitude - p.longitude).abs() < 1e-12);
    }

    #[test]
    fn test_display_dms() {
        let p = Position::new(52.5, -21.25);
        let s = p.to_string();
        assert!(s.starts_with("52° 30' 0.00\" N"));
        assert!(s.ends_with("21° 15' 0.00\" W"));
    }
}
