//! Geospatial building blocks for the listing / point-of-interest proximity join.
//!
//! This crate provides:
//! - Haversine great-circle distance in meters
//! - A cosine-scaled bounding-box pre-filter
//! - A fixed-size latitude/longitude grid index over target points
//! - A storage-free chunk processor, optionally parallel via rayon
//!
//! # Example
//!
//! ```
//! use proximity_geo::{ChunkProcessor, GeoPoint, GridIndex, ProximityParams};
//!
//! let params = ProximityParams::default();
//! let targets = vec![
//!     GeoPoint::new(100, 37.5010, 127.0010),
//!     GeoPoint::new(200, 38.5000, 127.0000),
//! ];
//! let grid = GridIndex::build(&targets, params.grid_size).unwrap();
//! let processor = ChunkProcessor::new(&grid, &params).unwrap();
//!
//! let origins = vec![GeoPoint::new(1, 37.5000, 127.0000)];
//! let output = processor.process_chunk(&origins, |_, _| false);
//!
//! assert_eq!(output.triples.len(), 1);
//! assert_eq!(output.triples[0].target_id, 100);
//! ```

mod chunk;
mod error;
mod filter;
mod grid;
mod haversine;

pub use chunk::{ChunkOutput, ChunkProcessor, ChunkStats, DistanceTriple, ProximityParams};
pub use error::{GeoError, GeoErrorCode, Result};
pub use filter::{CoarseFilter, METERS_PER_DEGREE};
pub use grid::{CellKey, CellReach, GridIndex};
pub use haversine::{haversine_distance_meters, EARTH_RADIUS_M};

use serde::{Deserialize, Serialize};

/// A geographic coordinate with latitude and longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a new coordinate.
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Returns true if both values are finite and within range.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Returns true if neither value is NaN or infinite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Converts degrees to radians for internal calculations.
    #[inline]
    pub(crate) fn to_radians(self) -> (f64, f64) {
        (self.latitude.to_radians(), self.longitude.to_radians())
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self::new(lat, lng)
    }
}

/// A geo-tagged row: a listing (origin) or a point-of-interest (target).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Listing or address identifier
    pub id: i64,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a new point.
    #[inline]
    pub fn new(id: i64, latitude: f64, longitude: f64) -> Self {
        Self { id, latitude, longitude }
    }

    /// Builds a point from nullable database columns.
    ///
    /// Returns `None` when either coordinate is missing. Range and NaN checks
    /// are left to [`GeoPoint::is_valid`] so callers can count those rows.
    pub fn from_nullable(id: i64, latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        Some(Self::new(id, latitude?, longitude?))
    }

    /// The point's coordinate.
    #[inline]
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Returns true if the point may take part in matching.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.coordinate().is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(0.0, 0.0).is_valid());
        assert!(Coordinate::new(90.0, 180.0).is_valid());
        assert!(Coordinate::new(-90.0, -180.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_coordinate_from_tuple() {
        let coord: Coordinate = (37.5665, 126.9780).into();
        assert_eq!(coord.latitude, 37.5665);
    }

    #[test]
    fn test_point_from_nullable() {
        assert!(GeoPoint::from_nullable(1, None, Some(127.0)).is_none());
        assert!(GeoPoint::from_nullable(1, Some(37.5), None).is_none());

        let point = GeoPoint::from_nullable(1, Some(37.5), Some(127.0)).unwrap();
        assert!(point.is_valid());

        let nan = GeoPoint::from_nullable(2, Some(f64::NAN), Some(127.0)).unwrap();
        assert!(!nan.is_valid());
    }
}
