//! Bounding-box pre-filter applied before the exact haversine distance.
//!
//! Most candidate pairs coming out of the grid are still too far apart. This
//! check costs a subtraction per axis and one cosine, and it never rejects a
//! pair that the exact distance would accept as long as the margin is at
//! least 1.0. Close to a pole the east-west estimate stops being a lower
//! bound, so only the latitude is checked there.

use crate::{Coordinate, GeoError, Result};

/// Approximate length of one degree of latitude, in meters.
///
/// Slightly below the spherical value (about 111,195 m) so the approximation
/// errs on the side of accepting.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Radius of the polar caps where the longitude test is skipped, in
/// multiples of the filter limit.
const POLAR_CAP_LIMITS: f64 = 8.0;

/// Cosine-scaled bounding-box check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoarseFilter {
    max_distance: f64,
    margin_factor: f64,
    limit: f64,
    polar_latitude: f64,
}

impl CoarseFilter {
    /// Creates a filter for `max_distance` meters widened by `margin_factor`.
    ///
    /// # Errors
    /// Fails if the distance is not positive or the margin is below 1.0.
    pub fn new(max_distance: f64, margin_factor: f64) -> Result<Self> {
        if !(max_distance.is_finite() && max_distance > 0.0) {
            return Err(GeoError::InvalidParams(format!(
                "max_distance must be positive, got {}",
                max_distance
            )));
        }
        if !(margin_factor.is_finite() && margin_factor >= 1.0) {
            return Err(GeoError::InvalidParams(format!(
                "margin_factor must be at least 1.0, got {}",
                margin_factor
            )));
        }
        let limit = max_distance * margin_factor;
        Ok(Self {
            max_distance,
            margin_factor,
            limit,
            polar_latitude: 90.0 - POLAR_CAP_LIMITS * limit / METERS_PER_DEGREE,
        })
    }

    /// Radius the filter accepts, in meters.
    pub fn limit(&self) -> f64 {
        self.limit
    }

    /// Radius of the exact check, in meters.
    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// Returns true if the pair may lie within the radius.
    #[inline]
    pub fn accepts(&self, a: &Coordinate, b: &Coordinate) -> bool {
        let north_south = (a.latitude - b.latitude).abs() * METERS_PER_DEGREE;
        if north_south > self.limit {
            return false;
        }
        if a.latitude.abs() >= self.polar_latitude || b.latitude.abs() >= self.polar_latitude {
            return true;
        }

        let mean_latitude = ((a.latitude + b.latitude) / 2.0).to_radians();
        let east_west = longitude_delta(a.longitude, b.longitude) * METERS_PER_DEGREE * mean_latitude.cos();
        east_west <= self.limit
    }
}

/// Absolute longitude difference folded into [0, 180] degrees.
#[inline]
fn longitude_delta(a: f64, b: f64) -> f64 {
    let delta = (a - b).abs() % 360.0;
    if delta > 180.0 { 360.0 - delta } else { delta }
}
