//! Run phases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a run currently is.
///
/// ```text
/// LOAD_PROCESSED_PAIRS -> FETCH_CANDIDATES -> BUILD_INDEX
///     -> PROCESS_CHUNKS (with saves at the threshold) -> SAVE_REMAINING -> DONE
/// ```
///
/// `FAILED` is reachable only from the first three phases. Once chunks are
/// being processed, failures are contained to the batch that hit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    /// Reading pairs recorded by earlier runs
    #[default]
    LoadProcessedPairs,
    /// Reading origins and targets
    FetchCandidates,
    /// Bucketing targets into the grid
    BuildIndex,
    /// Matching origin chunks and saving at the threshold
    ProcessChunks,
    /// Flushing what is still pending
    SaveRemaining,
    /// Finished
    Done,
    /// A prerequisite phase failed
    Failed,
}

impl RunPhase {
    /// Whether the run may move from `self` to `next`.
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (LoadProcessedPairs, FetchCandidates)
                | (FetchCandidates, BuildIndex)
                | (BuildIndex, ProcessChunks)
                | (ProcessChunks, SaveRemaining)
                | (SaveRemaining, Done)
                | (LoadProcessedPairs | FetchCandidates | BuildIndex, Failed)
        )
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }

    /// Short name used in logs and metric keys.
    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::LoadProcessedPairs => "load_processed_pairs",
            RunPhase::FetchCandidates => "fetch_candidates",
            RunPhase::BuildIndex => "build_index",
            RunPhase::ProcessChunks => "process_chunks",
            RunPhase::SaveRemaining => "save_remaining",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
