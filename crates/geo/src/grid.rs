//! Fixed-size latitude/longitude grid over target points.
//!
//! Targets are bucketed by `(⌊lon / size⌋, ⌊lat / size⌋)`. Finding every
//! target near an origin then means scanning the origin's cell and a ring of
//! neighbours instead of every target. The index is built once per run and
//! never mutated afterwards, so it can be shared by reference across workers.

use crate::filter::METERS_PER_DEGREE;
use crate::{Coordinate, GeoError, GeoPoint, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Integer key of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CellKey {
    /// Longitude column
    pub x: i64,
    /// Latitude row
    pub y: i64,
}

impl CellKey {
    /// Creates a key.
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// How many cells to scan on each side of the centre cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellReach {
    /// Columns on each side
    pub x: u32,
    /// Rows on each side
    pub y: u32,
}

impl CellReach {
    /// The classic 3×3 neighbourhood.
    pub const ADJACENT: CellReach = CellReach { x: 1, y: 1 };

    /// Reach that covers every point within `radius_m` of an origin at
    /// `latitude`.
    ///
    /// Longitude columns narrow toward the poles, so the east-west reach is
    /// scaled by the cosine of the most poleward latitude the radius can touch.
    /// Both axes are at least 1.
    pub fn for_radius(latitude: f64, radius_m: f64, grid_size: f64) -> Self {
        let reach_deg = radius_m / METERS_PER_DEGREE;
        let y = cells(reach_deg / grid_size);

        let poleward = (latitude.abs() + reach_deg).min(90.0);
        let cos = poleward.to_radians().cos();
        let x = if cos <= f64::EPSILON {
            u32::MAX
        } else {
            cells(reach_deg / cos / grid_size)
        };

        Self { x, y }
    }
}

fn cells(span: f64) -> u32 {
    // `as` saturates, so an enormous span becomes u32::MAX.
    (span.ceil() as u32).max(1)
}

/// Target points bucketed into grid cells.
#[derive(Debug, Clone)]
pub struct GridIndex {
    grid_size: f64,
    cells: HashMap<CellKey, Vec<GeoPoint>>,
    len: usize,
    skipped: usize,
    min_x: i64,
    columns: i64,
    min_y: i64,
    max_y: i64,
}

impl GridIndex {
    /// Builds the index in one pass over `targets`.
    ///
    /// Targets with missing, NaN or out-of-range coordinates are skipped and
    /// counted rather than failing the build. Within a cell, points keep
    /// their input order.
    ///
    /// # Errors
    /// Returns [`GeoError::InvalidGridSize`] unless `grid_size` is a positive,
    /// finite number of degrees no larger than 90.
    pub fn build<'a, I>(targets: I, grid_size: f64) -> Result<Self>
    where
        I: IntoIterator<Item = &'a GeoPoint>,
    {
        if !(grid_size.is_finite() && grid_size > 0.0 && grid_size <= 90.0) {
            return Err(GeoError::InvalidGridSize(grid_size));
        }

        // Columns run from -180 up to (not including) +180; when the size does
        // not divide 360 the two seam columns are narrower than the rest.
        let half_turn = (180.0 / grid_size).ceil() as i64;

        let mut index = Self {
            grid_size,
            cells: HashMap::new(),
            len: 0,
            skipped: 0,
            min_x: -half_turn,
            columns: 2 * half_turn,
            min_y: (-90.0 / grid_size).floor() as i64,
            max_y: (90.0 / grid_size).floor() as i64,
        };

        for target in targets {
            if !target.is_valid() {
                tracing::warn!(
                    target_id = target.id,
                    latitude = target.latitude,
                    longitude = target.longitude,
                    "Skipping target with invalid coordinates"
                );
                index.skipped += 1;
                continue;
            }
            let key = index.cell_of(&target.coordinate());
            index.cells.entry(key).or_default().push(*target);
            index.len += 1;
        }

        tracing::debug!(
            targets = index.len,
            skipped = index.skipped,
            cells = index.cells.len(),
            grid_size,
            "Grid index built"
        );

        Ok(index)
    }

    /// Cell size in degrees.
    pub fn grid_size(&self) -> f64 {
        self.grid_size
    }

    /// Number of indexed targets.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no target was indexed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of targets rejected during the build.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Number of non-empty cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Cell containing `coord`.
    ///
    /// Longitude 180 is folded onto -180 so the two edges of the map share a
    /// column.
    pub fn cell_of(&self, coord: &Coordinate) -> CellKey {
        let longitude = if coord.longitude >= 180.0 { coord.longitude - 360.0 } else { coord.longitude };
        CellKey::new(
            (longitude / self.grid_size).floor() as i64,
            (coord.latitude / self.grid_size).floor() as i64,
        )
    }

    /// Targets stored in exactly one cell.
    pub fn bucket(&self, key: CellKey) -> &[GeoPoint] {
        self.cells.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Targets in the 3×3 block of cells centred on `(cell_x, cell_y)`.
    pub fn neighbors(&self, cell_x: i64, cell_y: i64) -> impl Iterator<Item = &GeoPoint> + '_ {
        self.neighbors_within(CellKey::new(cell_x, cell_y), CellReach::ADJACENT)
    }

    /// Targets in the block of cells `reach` columns and rows around `centre`.
    ///
    /// Columns wrap across the antimeridian; each cell is visited at most
    /// once even when the reach spans the whole globe.
    pub fn neighbors_within(&self, centre: CellKey, reach: CellReach) -> impl Iterator<Item = &GeoPoint> + '_ {
        let rows = (centre.y - i64::from(reach.y)).max(self.min_y)..=(centre.y + i64::from(reach.y)).min(self.max_y);
        let columns = self.columns_around(centre.x, reach.x);
        rows.flat_map(move |y| {
            columns
                .clone()
                .into_iter()
                .flat_map(move |x| self.bucket(CellKey::new(x, y)).iter())
        })
    }

    /// Canonical column keys within `reach` of `centre_x`.
    fn columns_around(&self, centre_x: i64, reach: u32) -> Vec<i64> {
        let span = 2 * i64::from(reach) + 1;
        if span >= self.columns {
            return (self.min_x..self.min_x + self.columns).collect();
        }
        (centre_x - i64::from(reach)..=centre_x + i64::from(reach))
            .map(|x| self.min_x + (x - self.min_x).rem_euclid(self.columns))
            .collect()
    }
}
