//! Run summary returned to the caller.

use crate::RunPhase;
use proximity_geo::ChunkStats;
use serde::{Deserialize, Serialize};

/// Counters for one join run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Distinct origins fetched
    pub origins: u64,
    /// Targets fetched
    pub targets: u64,
    /// Targets the grid refused
    pub invalid_targets: u64,
    /// Origin rows dropped because their id was already seen
    pub duplicate_origins: u64,
    /// Chunks planned
    pub chunks: u64,
    /// Target candidates drawn from neighbouring cells
    pub candidate_pairs: u64,
    /// Candidates dropped by the bounding-box check
    pub coarse_rejected: u64,
    /// Candidates at zero distance or beyond the radius
    pub out_of_radius: u64,
    /// Candidates skipped because the pair was recorded before
    pub already_processed: u64,
    /// Pairs emitted by the chunk processor
    pub matched: u64,
    /// Rows inserted
    pub saved: u64,
    /// Rows the database already held when the insert ran
    pub conflicts: u64,
    /// Rows dropped as repeats during screening
    pub duplicates_dropped: u64,
    /// Rows dropped for a bad distance
    pub rejected_validation: u64,
    /// Rows dropped because a parent row is gone
    pub rejected_missing_parent: u64,
    /// Batches that failed and were rolled back
    pub failed_batches: u64,
    /// Rows in failed batches
    pub failed_records: u64,
    /// Whether the run stopped early on request
    pub cancelled: bool,
    /// Whether writes were skipped
    pub dry_run: bool,
    /// Wall time
    pub elapsed_ms: u64,
    /// Phase the run ended in
    pub final_phase: RunPhase,
}

impl RunSummary {
    /// Folds chunk counters into the summary.
    pub fn record_chunk(&mut self, stats: &ChunkStats) {
        self.candidate_pairs += stats.candidates;
        self.coarse_rejected += stats.coarse_rejected;
        self.out_of_radius += stats.out_of_radius;
        self.already_processed += stats.already_processed;
        self.matched += stats.matched;
    }

    /// Rows that never reached the table.
    pub fn rejected(&self) -> u64 {
        self.rejected_validation + self.rejected_missing_parent + self.failed_records
    }

    /// Whether every batch went through.
    pub fn is_clean(&self) -> bool {
        self.failed_batches == 0 && self.final_phase == RunPhase::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_chunk_accumulates() {
        let mut summary = RunSummary::default();
        let stats = ChunkStats {
            candidates: 10,
            coarse_rejected: 4,
            out_of_radius: 2,
            already_processed: 1,
            matched: 3,
            ..Default::default()
        };
        summary.record_chunk(&stats);
        summary.record_chunk(&stats);
        assert_eq!(summary.candidate_pairs, 20);
        assert_eq!(summary.matched, 6);
        assert_eq!(summary.already_processed, 2);
    }

    #[test]
    fn test_json_field_names() {
        let summary = RunSummary {
            saved: 5,
            final_phase: RunPhase::Done,
            ..Default::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["saved"], 5);
        assert_eq!(json["final_phase"], "DONE");
        assert_eq!(json["failed_batches"], 0);
        assert!(summary.is_clean());
    }
}
