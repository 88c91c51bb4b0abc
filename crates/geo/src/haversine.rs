//! Haversine distance calculation.
//!
//! The Haversine formula calculates the great-circle distance between two points
//! on a sphere given their longitudes and latitudes. It stays well conditioned
//! for very short distances, which is the common case for a 1 km join radius.

use crate::{Coordinate, GeoError, Result};

/// Earth's mean radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculates the great-circle distance between two coordinates in meters.
///
/// # Errors
/// Returns [`GeoError::NonFiniteCoordinate`] if either coordinate contains
/// NaN or an infinity, so a bad row cannot leak NaN into stored distances.
///
/// # Example
/// ```
/// use proximity_geo::{haversine_distance_meters, Coordinate};
///
/// let origin = Coordinate::new(37.5000, 127.0000);
/// let target = Coordinate::new(37.5010, 127.0010);
///
/// let distance = haversine_distance_meters(&origin, &target).unwrap();
/// assert!((distance - 142.0).abs() < 2.0);
/// ```
pub fn haversine_distance_meters(from: &Coordinate, to: &Coordinate) -> Result<f64> {
    for coord in [from, to] {
        if !coord.is_finite() {
            return Err(GeoError::NonFiniteCoordinate {
                latitude: coord.latitude,
                longitude: coord.longitude,
            });
        }
    }
    Ok(haversine_unchecked(from, to))
}

/// Distance in meters for coordinates already known to be finite.
#[inline]
pub(crate) fn haversine_unchecked(from: &Coordinate, to: &Coordinate) -> f64 {
    let (lat1, lon1) = from.to_radians();
    let (lat2, lon2) = to.to_radians();

    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    // Rounding can push `a` a hair past 1 for antipodal points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SEOUL_CITY_HALL: Coordinate = Coordinate { latitude: 37.5665, longitude: 126.9780 };
    const GANGNAM_STATION: Coordinate = Coordinate { latitude: 37.4979, longitude: 127.0276 };
    const BUSAN_STATION: Coordinate = Coordinate { latitude: 35.1152, longitude: 129.0422 };

    fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
        haversine_distance_meters(a, b).unwrap()
    }

    #[test]
    fn test_city_hall_to_gangnam() {
        // Expected: ~8.8 km
        let d = distance(&SEOUL_CITY_HALL, &GANGNAM_STATION);
        assert!((d - 8_800.0).abs() < 200.0, "City Hall-Gangnam: {}", d);
    }

    #[test]
    fn test_seoul_to_busan() {
        // Expected: ~329 km
        let d = distance(&SEOUL_CITY_HALL, &BUSAN_STATION);
        assert!((d - 329_000.0).abs() < 3_000.0, "Seoul-Busan: {}", d);
    }

    #[test]
    fn test_same_point_zero_distance() {
        assert_eq!(distance(&SEOUL_CITY_HALL, &SEOUL_CITY_HALL), 0.0);
    }

    #[test]
    fn test_one_degree_of_meridian() {
        let a = Coordinate::new(37.5, 127.0);
        let b = Coordinate::new(38.5, 127.0);
        let d = distance(&a, &b);
        assert!((d - 111_000.0).abs() < 1_110.0, "one degree: {}", d);
    }

    #[test]
    fn test_antipodal_points() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 180.0);
        let d = distance(&a, &b);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);

        let north = Coordinate::new(90.0, 0.0);
        let south = Coordinate::new(-90.0, 0.0);
        assert!((distance(&north, &south) - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn test_tiny_distance_is_stable() {
        // One centimeter east at the equator.
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 0.01 / 111_195.0);
        let d = distance(&a, &b);
        assert!(d > 0.0 && (d - 0.01).abs() < 1e-4, "tiny: {}", d);
    }

    #[test]
    fn test_non_finite_is_an_error() {
        let nan = Coordinate::new(f64::NAN, 127.0);
        let inf = Coordinate::new(37.5, f64::INFINITY);

        assert!(matches!(
            haversine_distance_meters(&nan, &SEOUL_CITY_HALL),
            Err(GeoError::NonFiniteCoordinate { .. })
        ));
        assert!(haversine_distance_meters(&SEOUL_CITY_HALL, &inf).is_err());
    }

    fn coordinate() -> impl Strategy<Value = Coordinate> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lon)| Coordinate::new(lat, lon))
    }

    proptest! {
        #[test]
        fn prop_symmetric(a in coordinate(), b in coordinate()) {
            let d1 = distance(&a, &b);
            let d2 = distance(&b, &a);
            prop_assert!((d1 - d2).abs() < 1e-6);
        }

        #[test]
        fn prop_identity_is_zero(a in coordinate()) {
            prop_assert_eq!(distance(&a, &a), 0.0);
        }

        #[test]
        fn prop_bounded_by_half_circumference(a in coordinate(), b in coordinate()) {
            let d = distance(&a, &b);
            prop_assert!(d >= 0.0);
            prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_M + 1e-6);
        }
    }
}
