//! Storage-free proximity matching over slices of origins.
//!
//! A [`ChunkProcessor`] borrows a built [`GridIndex`] and turns a slice of
//! origins into `(origin, target, distance)` triples. It never touches
//! storage, so the same code runs inline or on a worker pool.

use crate::filter::CoarseFilter;
use crate::grid::{CellReach, GridIndex};
use crate::haversine::haversine_unchecked;
use crate::{GeoError, GeoPoint, Result};
use serde::{Deserialize, Serialize};

/// Matching parameters shared by the index and the processor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityParams {
    /// Join radius in meters
    pub max_distance: f64,
    /// Grid cell size in degrees
    pub grid_size: f64,
    /// Widening applied to the coarse filter radius
    pub margin_factor: f64,
}

impl Default for ProximityParams {
    fn default() -> Self {
        Self {
            max_distance: 1000.0,
            grid_size: 0.01,
            margin_factor: 1.2,
        }
    }
}

impl ProximityParams {
    /// Checks that every parameter is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.grid_size.is_finite() && self.grid_size > 0.0 && self.grid_size <= 90.0) {
            return Err(GeoError::InvalidGridSize(self.grid_size));
        }
        CoarseFilter::new(self.max_distance, self.margin_factor).map(|_| ())
    }
}

/// One matched pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceTriple {
    /// Listing id
    pub origin_id: i64,
    /// Point-of-interest id
    pub target_id: i64,
    /// Great-circle distance in meters
    pub distance_meters: f64,
}

/// Counters collected while processing origins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkStats {
    /// Origins that were matched against the grid
    pub origins_processed: u64,
    /// Origins dropped for invalid coordinates
    pub origins_skipped: u64,
    /// Targets drawn from neighbouring cells
    pub candidates: u64,
    /// Candidates skipped because the pair is already recorded
    pub already_processed: u64,
    /// Candidates rejected by the bounding-box check
    pub coarse_rejected: u64,
    /// Candidates whose exact distance was zero or beyond the radius
    pub out_of_radius: u64,
    /// Triples emitted
    pub matched: u64,
}

impl ChunkStats {
    /// Adds `other` into `self`.
    pub fn merge(&mut self, other: &ChunkStats) {
        self.origins_processed += other.origins_processed;
        self.origins_skipped += other.origins_skipped;
        self.candidates += other.candidates;
        self.already_processed += other.already_processed;
        self.coarse_rejected += other.coarse_rejected;
        self.out_of_radius += other.out_of_radius;
        self.matched += other.matched;
    }
}

/// Result of one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkOutput {
    /// Matched pairs in discovery order
    pub triples: Vec<DistanceTriple>,
    /// Counters for the chunk
    pub stats: ChunkStats,
}

/// Matches origins against a grid of targets.
#[derive(Debug, Clone, Copy)]
pub struct ChunkProcessor<'g> {
    grid: &'g GridIndex,
    filter: CoarseFilter,
}

impl<'g> ChunkProcessor<'g> {
    /// Creates a processor over `grid`.
    ///
    /// # Errors
    /// Fails if the parameters are invalid or `params.grid_size` differs from
    /// the size the grid was built with.
    pub fn new(grid: &'g GridIndex, params: &ProximityParams) -> Result<Self> {
        params.validate()?;
        if (grid.grid_size() - params.grid_size).abs() > f64::EPSILON {
            return Err(GeoError::InvalidParams(format!(
                "grid was built with cell size {} but parameters say {}",
                grid.grid_size(),
                params.grid_size
            )));
        }
        Ok(Self {
            grid,
            filter: CoarseFilter::new(params.max_distance, params.margin_factor)?,
        })
    }

    /// Join radius in meters.
    pub fn max_distance(&self) -> f64 {
        self.filter.max_distance()
    }

    /// Matches every origin in `origins`.
    ///
    /// `skip(origin_id, target_id)` returning true excludes a pair before any
    /// distance work. A triple is emitted when `0 < distance <= max_distance`.
    pub fn process_chunk<F>(&self, origins: &[GeoPoint], skip: F) -> ChunkOutput
    where
        F: Fn(i64, i64) -> bool,
    {
        let mut output = ChunkOutput::default();
        let max_distance = self.filter.max_distance();
        let grid_size = self.grid.grid_size();

        for origin in origins {
            if !origin.is_valid() {
                tracing::warn!(
                    origin_id = origin.id,
                    latitude = origin.latitude,
                    longitude = origin.longitude,
                    "Skipping origin with invalid coordinates"
                );
                output.stats.origins_skipped += 1;
                continue;
            }
            output.stats.origins_processed += 1;

            let coord = origin.coordinate();
            let cell = self.grid.cell_of(&coord);
            let reach = CellReach::for_radius(origin.latitude, max_distance, grid_size);

            for target in self.grid.neighbors_within(cell, reach) {
                output.stats.candidates += 1;

                if skip(origin.id, target.id) {
                    output.stats.already_processed += 1;
                    continue;
                }

                let target_coord = target.coordinate();
                if !self.filter.accepts(&coord, &target_coord) {
                    output.stats.coarse_rejected += 1;
                    continue;
                }

                let distance = haversine_unchecked(&coord, &target_coord);
                if distance > 0.0 && distance <= max_distance {
                    output.triples.push(DistanceTriple {
                        origin_id: origin.id,
                        target_id: target.id,
                        distance_meters: distance,
                    });
                    output.stats.matched += 1;
                } else {
                    output.stats.out_of_radius += 1;
                }
            }
        }

        tracing::debug!(
            origins = origins.len(),
            candidates = output.stats.candidates,
            matched = output.stats.matched,
            "Chunk processed"
        );

        output
    }

    /// Processes a group of chunks, one output per chunk in input order.
    ///
    /// With the `parallel` feature the chunks run on the current rayon pool.
    pub fn process_chunks<F>(&self, chunks: &[&[GeoPoint]], skip: &F) -> Vec<ChunkOutput>
    where
        F: Fn(i64, i64) -> bool + Sync,
    {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            chunks
                .par_iter()
                .map(|chunk| self.process_chunk(chunk, skip))
                .collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            chunks
                .iter()
                .map(|chunk| self.process_chunk(chunk, skip))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn scenario_targets() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(100, 37.5010, 127.0010),
            GeoPoint::new(200, 38.5000, 127.0000),
        ]
    }

    #[test]
    fn test_params_validation() {
        assert!(ProximityParams::default().validate().is_ok());

        let zero_grid = ProximityParams { grid_size: 0.0, ..Default::default() };
        assert_eq!(zero_grid.validate(), Err(GeoError::InvalidGridSize(0.0)));

        let no_radius = ProximityParams { max_distance: 0.0, ..Default::default() };
        assert!(no_radius.validate().is_err());

        let narrow = ProximityParams { margin_factor: 0.5, ..Default::default() };
        assert!(narrow.validate().is_err());
    }

    #[test]
    fn test_rejects_mismatched_grid() {
        let targets = scenario_targets();
        let grid = GridIndex::build(&targets, 0.02).unwrap();
        assert!(matches!(
            ChunkProcessor::new(&grid, &ProximityParams::default()),
            Err(GeoError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_nearby_target_matched_far_target_ignored() {
        let params = ProximityParams::default();
        let targets = scenario_targets();
        let grid = GridIndex::build(&targets, params.grid_size).unwrap();
        let processor = ChunkProcessor::new(&grid, &params).unwrap();

        let output = processor.process_chunk(&[GeoPoint::new(1, 37.5000, 127.0000)], |_, _| false);

        assert_eq!(output.triples.len(), 1);
        let triple = output.triples[0];
        assert_eq!((triple.origin_id, triple.target_id), (1, 100));
        assert!((triple.distance_meters - 142.0).abs() < 5.0, "distance: {}", triple.distance_meters);
        assert_eq!(output.stats.origins_processed, 1);
        assert_eq!(output.stats.matched, 1);
    }

    #[test]
    fn test_coarse_filter_rejects_inside_neighbourhood() {
        // Same cell row, three columns east: in reach, but ~1.8 km away.
        let params = ProximityParams::default();
        let targets = vec![GeoPoint::new(5, 37.5000, 127.0200)];
        let grid = GridIndex::build(&targets, params.grid_size).unwrap();
        let processor = ChunkProcessor::new(&grid, &params).unwrap();

        let output = processor.process_chunk(&[GeoPoint::new(1, 37.5000, 127.0005)], |_, _| false);
        assert!(output.triples.is_empty());
        assert_eq!(output.stats.candidates, 1);
        assert_eq!(output.stats.coarse_rejected, 1);
    }

    #[test]
    fn test_skip_predicate_excludes_pairs() {
        let params = ProximityParams::default();
        let targets = scenario_targets();
        let grid = GridIndex::build(&targets, params.grid_size).unwrap();
        let processor = ChunkProcessor::new(&grid, &params).unwrap();

        let output = processor.process_chunk(&[GeoPoint::new(1, 37.5000, 127.0000)], |o, t| o == 1 && t == 100);
        assert!(output.triples.is_empty());
        assert_eq!(output.stats.already_processed, 1);
    }

    #[test]
    fn test_invalid_origin_does_not_abort_chunk() {
        let params = ProximityParams::default();
        let targets = scenario_targets();
        let grid = GridIndex::build(&targets, params.grid_size).unwrap();
        let processor = ChunkProcessor::new(&grid, &params).unwrap();

        let origins = vec![
            GeoPoint::new(1, f64::NAN, 127.0),
            GeoPoint::new(2, 120.0, 127.0),
            GeoPoint::new(3, 37.5000, 127.0000),
        ];
        let output = processor.process_chunk(&origins, |_, _| false);
        assert_eq!(output.stats.origins_skipped, 2);
        assert_eq!(output.stats.origins_processed, 1);
        assert_eq!(output.triples.len(), 1);
        assert_eq!(output.triples[0].origin_id, 3);
    }

    #[test]
    fn test_coincident_points_are_not_emitted() {
        let params = ProximityParams::default();
        let targets = vec![GeoPoint::new(9, 37.5, 127.0)];
        let grid = GridIndex::build(&targets, params.grid_size).unwrap();
        let processor = ChunkProcessor::new(&grid, &params).unwrap();

        let output = processor.process_chunk(&[GeoPoint::new(1, 37.5, 127.0)], |_, _| false);
        assert!(output.triples.is_empty());
        assert_eq!(output.stats.out_of_radius, 1);
    }

    #[test]
    fn test_matches_across_antimeridian() {
        let params = ProximityParams::default();
        let targets = vec![GeoPoint::new(7, -16.5, -179.999)];
        let grid = GridIndex::build(&targets, params.grid_size).unwrap();
        let processor = ChunkProcessor::new(&grid, &params).unwrap();

        let output = processor.process_chunk(&[GeoPoint::new(1, -16.5, 179.999)], |_, _| false);
        assert_eq!(output.triples.len(), 1);
        assert!(output.triples[0].distance_meters < 250.0);
    }

    #[test]
    fn test_matches_across_the_pole() {
        let params = ProximityParams::default();
        let targets = vec![GeoPoint::new(9, 89.996, 180.0)];
        let grid = GridIndex::build(&targets, params.grid_size).unwrap();
        let processor = ChunkProcessor::new(&grid, &params).unwrap();

        let output = processor.process_chunk(&[GeoPoint::new(1, 89.996, 0.0)], |_, _| false);
        assert_eq!(output.stats.coarse_rejected, 0);
        assert_eq!(output.triples.len(), 1);
        assert!((output.triples[0].distance_meters - 889.6).abs() < 1.0);
    }

    #[test]
    fn test_process_chunks_matches_sequential() {
        let params = ProximityParams::default();
        let targets: Vec<GeoPoint> = (0..200)
            .map(|i| GeoPoint::new(1000 + i, 37.50 + (i % 20) as f64 * 0.001, 127.00 + (i / 20) as f64 * 0.001))
            .collect();
        let origins: Vec<GeoPoint> = (0..30)
            .map(|i| GeoPoint::new(i, 37.505 + (i % 5) as f64 * 0.002, 127.003 + (i / 5) as f64 * 0.001))
            .collect();
        let grid = GridIndex::build(&targets, params.grid_size).unwrap();
        let processor = ChunkProcessor::new(&grid, &params).unwrap();

        let skip = |o: i64, t: i64| (o + t) % 7 == 0;
        let chunks: Vec<&[GeoPoint]> = origins.chunks(4).collect();
        let outputs = processor.process_chunks(&chunks, &skip);
        assert_eq!(outputs.len(), chunks.len());

        let sequential = processor.process_chunk(&origins, skip);
        let mut merged = ChunkStats::default();
        let mut triples = Vec::new();
        for output in &outputs {
            merged.merge(&output.stats);
            triples.extend_from_slice(&output.triples);
        }
        assert_eq!(merged, sequential.stats);
        assert_eq!(triples, sequential.triples);
    }

    proptest! {
        // The processor must find exactly the pairs a brute-force scan finds.
        #[test]
        fn prop_matches_brute_force(
            lat in -60.0f64..60.0,
            lon in -179.9f64..179.9,
            origin_offsets in prop::collection::vec((-0.02f64..0.02, -0.02f64..0.02), 1..10),
            target_offsets in prop::collection::vec((-0.03f64..0.03, -0.03f64..0.03), 1..60),
            max_distance in 200.0f64..1_500.0,
            grid_size in prop::sample::select(vec![0.002, 0.01, 0.05]),
        ) {
            let params = ProximityParams { max_distance, grid_size, margin_factor: 1.0 };
            let origins: Vec<GeoPoint> = origin_offsets
                .iter()
                .enumerate()
                .map(|(i, (a, b))| GeoPoint::new(i as i64, lat + a, lon + b))
                .collect();
            let targets: Vec<GeoPoint> = target_offsets
                .iter()
                .enumerate()
                .map(|(i, (a, b))| GeoPoint::new(1_000 + i as i64, lat + a, lon + b))
                .collect();

            let grid = GridIndex::build(&targets, grid_size).unwrap();
            let processor = ChunkProcessor::new(&grid, &params).unwrap();
            let output = processor.process_chunk(&origins, |_, _| false);

            let found: BTreeSet<(i64, i64)> =
                output.triples.iter().map(|t| (t.origin_id, t.target_id)).collect();
            let mut expected = BTreeSet::new();
            for o in &origins {
                for t in &targets {
                    let d = haversine_unchecked(&o.coordinate(), &t.coordinate());
                    if d > 0.0 && d <= max_distance {
                        expected.insert((o.id, t.id));
                    }
                }
            }
            prop_assert_eq!(found, expected);

            for triple in &output.triples {
                prop_assert!(triple.distance_meters > 0.0 && triple.distance_meters <= max_distance);
            }
        }
    }
}
