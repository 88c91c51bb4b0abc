//! Checks applied to a batch right before it is written.

use crate::ProcessedPairSet;
use proximity_geo::DistanceTriple;
use proximity_store::{DistanceStore, Result};
use std::collections::{BTreeSet, HashSet};

/// Rows that passed screening plus what was dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenedBatch {
    /// Rows to insert, in input order
    pub rows: Vec<DistanceTriple>,
    /// Already recorded or repeated within the batch
    pub duplicates_dropped: u64,
    /// Distance not finite, not positive, or beyond the radius
    pub rejected_validation: u64,
    /// Origin or target row no longer exists
    pub rejected_missing_parent: u64,
}

/// Whether a distance may be stored.
#[inline]
pub fn is_valid_distance(distance: f64, max_distance: f64) -> bool {
    distance.is_finite() && distance > 0.0 && distance <= max_distance
}

/// Screens `batch` in three steps: duplicates, distance validation, then
/// parent existence.
///
/// # Errors
/// Fails only if the parent lookup fails; the caller treats that as a failed
/// batch.
pub fn screen_batch<S>(
    batch: &[DistanceTriple],
    processed: &ProcessedPairSet,
    max_distance: f64,
    store: &mut S,
) -> Result<ScreenedBatch>
where
    S: DistanceStore + ?Sized,
{
    let mut screened = ScreenedBatch::default();
    let mut seen = HashSet::with_capacity(batch.len());
    let mut candidates = Vec::with_capacity(batch.len());

    for row in batch {
        let key = (row.origin_id, row.target_id);
        if processed.contains(row.origin_id, row.target_id) || !seen.insert(key) {
            screened.duplicates_dropped += 1;
            continue;
        }
        if !is_valid_distance(row.distance_meters, max_distance) {
            tracing::warn!(
                origin_id = row.origin_id,
                target_id = row.target_id,
                distance_meters = row.distance_meters,
                "Dropping row with invalid distance"
            );
            screened.rejected_validation += 1;
            continue;
        }
        candidates.push(*row);
    }

    if candidates.is_empty() {
        return Ok(screened);
    }

    let origin_ids: Vec<i64> = candidates.iter().map(|r| r.origin_id).collect::<BTreeSet<_>>().into_iter().collect();
    let target_ids: Vec<i64> = candidates.iter().map(|r| r.target_id).collect::<BTreeSet<_>>().into_iter().collect();
    let origins = store.existing_origin_ids(&origin_ids)?;
    let targets = store.existing_target_ids(&target_ids)?;

    for row in candidates {
        if origins.contains(&row.origin_id) && targets.contains(&row.target_id) {
            screened.rows.push(row);
        } else {
            tracing::warn!(
                origin_id = row.origin_id,
                target_id = row.target_id,
                "Dropping row whose origin or target no longer exists"
            );
            screened.rejected_missing_parent += 1;
        }
    }

    Ok(screened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proximity_geo::GeoPoint;
    use proximity_store::{Fault, MemoryStore};

    fn triple(origin_id: i64, target_id: i64, distance_meters: f64) -> DistanceTriple {
        DistanceTriple { origin_id, target_id, distance_meters }
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_origins([GeoPoint::new(1, 37.5, 127.0), GeoPoint::new(2, 37.5, 127.0)])
            .with_targets([GeoPoint::new(100, 37.5, 127.001), GeoPoint::new(200, 37.5, 127.002)])
    }

    #[test]
    fn test_distance_bounds() {
        assert!(is_valid_distance(0.001, 1000.0));
        assert!(is_valid_distance(1000.0, 1000.0));
        assert!(!is_valid_distance(0.0, 1000.0));
        assert!(!is_valid_distance(-1.0, 1000.0));
        assert!(!is_valid_distance(1000.01, 1000.0));
        assert!(!is_valid_distance(f64::NAN, 1000.0));
        assert!(!is_valid_distance(f64::INFINITY, 1000.0));
    }

    #[test]
    fn test_drops_recorded_and_repeated_pairs() {
        let mut store = store();
        let processed: ProcessedPairSet = [(1, 100)].into_iter().collect();
        let batch = [triple(1, 100, 88.0), triple(2, 100, 88.0), triple(2, 100, 88.0)];

        let screened = screen_batch(&batch, &processed, 1000.0, &mut store).unwrap();
        assert_eq!(screened.rows, vec![triple(2, 100, 88.0)]);
        assert_eq!(screened.duplicates_dropped, 2);
    }

    #[test]
    fn test_drops_invalid_distances() {
        let mut store = store();
        let batch = [triple(1, 100, f64::NAN), triple(1, 200, 1500.0), triple(2, 200, 176.0)];

        let screened = screen_batch(&batch, &ProcessedPairSet::new(), 1000.0, &mut store).unwrap();
        assert_eq!(screened.rows.len(), 1);
        assert_eq!(screened.rejected_validation, 2);
    }

    #[test]
    fn test_drops_rows_with_missing_parents() {
        let mut store = store();
        store.remove_target(200);
        let batch = [triple(1, 100, 88.0), triple(1, 200, 176.0), triple(3, 100, 50.0)];

        let screened = screen_batch(&batch, &ProcessedPairSet::new(), 1000.0, &mut store).unwrap();
        assert_eq!(screened.rows, vec![triple(1, 100, 88.0)]);
        assert_eq!(screened.rejected_missing_parent, 2);
    }

    #[test]
    fn test_lookup_failure_is_reported() {
        let mut store = store();
        store.inject(Fault::ParentLookup);
        let batch = [triple(1, 100, 88.0)];
        assert!(screen_batch(&batch, &ProcessedPairSet::new(), 1000.0, &mut store).is_err());
    }

    #[test]
    fn test_empty_after_dedup_skips_lookup() {
        let mut store = store();
        store.inject(Fault::ParentLookup);
        let processed: ProcessedPairSet = [(1, 100)].into_iter().collect();
        let screened = screen_batch(&[triple(1, 100, 88.0)], &processed, 1000.0, &mut store).unwrap();
        assert!(screened.rows.is_empty());
    }
}
