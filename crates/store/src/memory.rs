//! In-process store with the same constraints as the PostgreSQL table.

use crate::{DistanceRecord, DistanceStore, PairKey, Result, StoreError};
use chrono::Utc;
use proximity_geo::{DistanceTriple, GeoPoint};
use std::collections::{BTreeMap, HashSet};

/// Failure that [`MemoryStore`] can be told to raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `load_processed_pairs` fails
    LoadPairs,
    /// `fetch_origins` fails
    FetchOrigins,
    /// `fetch_targets` fails
    FetchTargets,
    /// `existing_origin_ids` and `existing_target_ids` fail
    ParentLookup,
    /// `insert_batch` fails for any batch containing this origin id
    InsertWithOrigin(i64),
    /// The connection drops during the next parent lookup or insert; the
    /// call after that reconnects and succeeds
    DropConnectionOnce,
}

#[derive(Debug, Clone, Copy)]
struct SourceRow {
    id: i64,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl SourceRow {
    fn usable_point(&self) -> Option<GeoPoint> {
        GeoPoint::from_nullable(self.id, self.latitude, self.longitude).filter(GeoPoint::is_valid)
    }
}

/// Tables held in memory.
///
/// Inserts enforce the unique pair key (first write wins), the parent
/// references and `distance_meters > 0`, and a batch that breaks a
/// constraint is rejected as a whole.
#[derive(Debug, Default)]
pub struct MemoryStore {
    origins: Vec<SourceRow>,
    targets: Vec<SourceRow>,
    records: BTreeMap<PairKey, DistanceRecord>,
    faults: HashSet<Fault>,
    schema_ready: bool,
    insert_calls: usize,
    disconnected: bool,
    reconnects: usize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds origins with known coordinates.
    pub fn with_origins(mut self, origins: impl IntoIterator<Item = GeoPoint>) -> Self {
        for point in origins {
            self.add_origin(point.id, Some(point.latitude), Some(point.longitude));
        }
        self
    }

    /// Adds targets with known coordinates.
    pub fn with_targets(mut self, targets: impl IntoIterator<Item = GeoPoint>) -> Self {
        for point in targets {
            self.add_target(point.id, Some(point.latitude), Some(point.longitude));
        }
        self
    }

    /// Appends an origin row; coordinates may be missing.
    pub fn add_origin(&mut self, id: i64, latitude: Option<f64>, longitude: Option<f64>) {
        self.origins.push(SourceRow { id, latitude, longitude });
    }

    /// Appends a target row; coordinates may be missing.
    pub fn add_target(&mut self, id: i64, latitude: Option<f64>, longitude: Option<f64>) {
        self.targets.push(SourceRow { id, latitude, longitude });
    }

    /// Deletes a target and, like `ON DELETE CASCADE`, its distance rows.
    pub fn remove_target(&mut self, id: i64) {
        self.targets.retain(|row| row.id != id);
        self.records.retain(|&(_, target_id), _| target_id != id);
    }

    /// Pre-populates a record, bypassing the parent checks.
    pub fn seed_record(&mut self, origin_id: i64, target_id: i64, distance_meters: f64) {
        self.records.insert(
            (origin_id, target_id),
            DistanceRecord {
                origin_id,
                target_id,
                distance_meters,
                created_at: Utc::now(),
            },
        );
    }

    /// Makes subsequent calls fail.
    pub fn inject(&mut self, fault: Fault) {
        self.faults.insert(fault);
    }

    /// Removes every injected fault.
    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    /// Records ordered by `(origin_id, target_id)`.
    pub fn records(&self) -> Vec<DistanceRecord> {
        self.records.values().cloned().collect()
    }

    /// Looks up one record.
    pub fn record(&self, origin_id: i64, target_id: i64) -> Option<&DistanceRecord> {
        self.records.get(&(origin_id, target_id))
    }

    /// Number of records.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Whether `ensure_schema` has run.
    pub fn schema_ready(&self) -> bool {
        self.schema_ready
    }

    /// Number of `insert_batch` calls, failed ones included.
    pub fn insert_calls(&self) -> usize {
        self.insert_calls
    }

    /// Times the store came back after a dropped connection.
    pub fn reconnects(&self) -> usize {
        self.reconnects
    }

    /// Reconnects if the previous call dropped the connection, then drops it
    /// again if a [`Fault::DropConnectionOnce`] is pending.
    fn connection(&mut self, operation: &str) -> Result<()> {
        if self.disconnected {
            self.disconnected = false;
            self.reconnects += 1;
        }
        if self.faults.remove(&Fault::DropConnectionOnce) {
            self.disconnected = true;
            return Err(StoreError::Injected(format!("connection dropped during {operation}")));
        }
        Ok(())
    }

    fn fail_if(&self, fault: Fault, operation: &str) -> Result<()> {
        if self.faults.contains(&fault) {
            return Err(StoreError::Injected(operation.to_string()));
        }
        Ok(())
    }

    fn usable(rows: &[SourceRow]) -> Vec<GeoPoint> {
        let mut points: Vec<GeoPoint> = rows.iter().filter_map(SourceRow::usable_point).collect();
        points.sort_by_key(|point| point.id);
        points
    }

    fn present(rows: &[SourceRow], ids: &[i64]) -> HashSet<i64> {
        let wanted: HashSet<i64> = ids.iter().copied().collect();
        rows.iter().map(|row| row.id).filter(|id| wanted.contains(id)).collect()
    }
}

impl DistanceStore for MemoryStore {
    fn ensure_schema(&mut self) -> Result<()> {
        self.schema_ready = true;
        Ok(())
    }

    fn load_processed_pairs(&mut self) -> Result<Vec<PairKey>> {
        self.fail_if(Fault::LoadPairs, "load processed pairs")?;
        Ok(self.records.keys().copied().collect())
    }

    fn fetch_origins(&mut self) -> Result<Vec<GeoPoint>> {
        self.fail_if(Fault::FetchOrigins, "fetch origins")?;
        Ok(Self::usable(&self.origins))
    }

    fn fetch_targets(&mut self) -> Result<Vec<GeoPoint>> {
        self.fail_if(Fault::FetchTargets, "fetch targets")?;
        Ok(Self::usable(&self.targets))
    }

    fn existing_origin_ids(&mut self, ids: &[i64]) -> Result<HashSet<i64>> {
        self.connection("look up origin ids")?;
        self.fail_if(Fault::ParentLookup, "look up origin ids")?;
        Ok(Self::present(&self.origins, ids))
    }

    fn existing_target_ids(&mut self, ids: &[i64]) -> Result<HashSet<i64>> {
        self.connection("look up target ids")?;
        self.fail_if(Fault::ParentLookup, "look up target ids")?;
        Ok(Self::present(&self.targets, ids))
    }

    fn insert_batch(&mut self, rows: &[DistanceTriple]) -> Result<u64> {
        self.insert_calls += 1;
        self.connection("insert batch")?;

        for row in rows {
            self.fail_if(Fault::InsertWithOrigin(row.origin_id), "insert batch")?;
        }

        let origin_ids: HashSet<i64> = self.origins.iter().map(|r| r.id).collect();
        let target_ids: HashSet<i64> = self.targets.iter().map(|r| r.id).collect();
        for row in rows {
            if !origin_ids.contains(&row.origin_id) {
                return Err(StoreError::Constraint(format!("origin {} does not exist", row.origin_id)));
            }
            if !target_ids.contains(&row.target_id) {
                return Err(StoreError::Constraint(format!("target {} does not exist", row.target_id)));
            }
            if row.distance_meters.is_nan() || row.distance_meters <= 0.0 {
                return Err(StoreError::Constraint(format!(
                    "distance_meters > 0 violated for ({}, {})",
                    row.origin_id, row.target_id
                )));
            }
        }

        let now = Utc::now();
        let mut inserted = 0;
        for row in rows {
            let key = (row.origin_id, row.target_id);
            if self.records.contains_key(&key) {
                continue;
            }
            self.records.insert(
                key,
                DistanceRecord {
                    origin_id: row.origin_id,
                    target_id: row.target_id,
                    distance_meters: row.distance_meters,
                    created_at: now,
                },
            );
            inserted += 1;
        }
        Ok(inserted)
    }
}
