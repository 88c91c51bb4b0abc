//! Persistence for proximity distance records.
//!
//! The join reads origins and targets, reads the pairs it already recorded,
//! and appends new `(origin_id, target_id, distance_meters)` rows. All of it
//! goes through the [`DistanceStore`] trait:
//!
//! - [`PgStore`]: PostgreSQL via the blocking `postgres` client
//! - [`MemoryStore`]: in-process tables with failure injection, for tests and
//!   offline dry runs
//!
//! Writes are first-write-wins: a pair that is already recorded is left
//! untouched, so re-running a join never changes existing rows.

#![warn(missing_docs)]

mod error;
mod memory;
mod pg;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::{Fault, MemoryStore};
pub use pg::{redact_url, PgStore};

use chrono::{DateTime, Utc};
use proximity_geo::{DistanceTriple, GeoPoint};
use serde::Serialize;
use std::collections::HashSet;

/// `(origin_id, target_id)`
pub type PairKey = (i64, i64);

/// A persisted distance row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceRecord {
    /// Listing id
    pub origin_id: i64,
    /// Point-of-interest id
    pub target_id: i64,
    /// Great-circle distance in meters
    pub distance_meters: f64,
    /// Insert time
    pub created_at: DateTime<Utc>,
}

impl DistanceRecord {
    /// Unique key of the record.
    pub fn key(&self) -> PairKey {
        (self.origin_id, self.target_id)
    }
}

/// Storage operations needed by one join run.
///
/// Point queries only return rows with non-null, in-range coordinates.
pub trait DistanceStore {
    /// Creates the output table and its indexes if missing.
    fn ensure_schema(&mut self) -> Result<()>;

    /// Every `(origin_id, target_id)` already recorded.
    fn load_processed_pairs(&mut self) -> Result<Vec<PairKey>>;

    /// Origins with usable coordinates.
    fn fetch_origins(&mut self) -> Result<Vec<GeoPoint>>;

    /// Targets with usable coordinates.
    fn fetch_targets(&mut self) -> Result<Vec<GeoPoint>>;

    /// Subset of `ids` present in the origin table.
    fn existing_origin_ids(&mut self, ids: &[i64]) -> Result<HashSet<i64>>;

    /// Subset of `ids` present in the target table.
    fn existing_target_ids(&mut self, ids: &[i64]) -> Result<HashSet<i64>>;

    /// Writes `rows` in one transaction, skipping pairs that already exist.
    ///
    /// Returns the number of rows actually inserted. On error nothing from
    /// the batch is written.
    fn insert_batch(&mut self, rows: &[DistanceTriple]) -> Result<u64>;
}

impl<S: DistanceStore + ?Sized> DistanceStore for Box<S> {
    fn ensure_schema(&mut self) -> Result<()> {
        (**self).ensure_schema()
    }

    fn load_processed_pairs(&mut self) -> Result<Vec<PairKey>> {
        (**self).load_processed_pairs()
    }

    fn fetch_origins(&mut self) -> Result<Vec<GeoPoint>> {
        (**self).fetch_origins()
    }

    fn fetch_targets(&mut self) -> Result<Vec<GeoPoint>> {
        (**self).fetch_targets()
    }

    fn existing_origin_ids(&mut self, ids: &[i64]) -> Result<HashSet<i64>> {
        (**self).existing_origin_ids(ids)
    }

    fn existing_target_ids(&mut self, ids: &[i64]) -> Result<HashSet<i64>> {
        (**self).existing_target_ids(ids)
    }

    fn insert_batch(&mut self, rows: &[DistanceTriple]) -> Result<u64> {
        (**self).insert_batch(rows)
    }
}
