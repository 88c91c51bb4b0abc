//! Progress hooks and cancellation.

use crate::{RunPhase, RunSummary};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of one save batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Committed
    Saved {
        /// 1-based batch number within the run
        batch: usize,
        /// Rows sent after screening
        rows: usize,
        /// Rows actually inserted
        inserted: u64,
    },
    /// Screened but not written because the run is a dry run
    Skipped {
        /// 1-based batch number within the run
        batch: usize,
        /// Rows that would have been sent
        rows: usize,
    },
    /// Rolled back
    Failed {
        /// 1-based batch number within the run
        batch: usize,
        /// Rows lost from this run
        rows: usize,
        /// Error text
        error: String,
    },
}

/// Receives progress from [`Orchestrator::run`](crate::Orchestrator::run).
///
/// Every method is called on the orchestrator thread and defaults to doing
/// nothing.
pub trait RunObserver {
    /// A new phase started.
    fn phase_started(&self, _phase: RunPhase) {}

    /// The number of chunks is known.
    fn chunks_planned(&self, _total: usize) {}

    /// `done` of `total` chunks have been processed.
    fn chunks_completed(&self, _done: usize, _total: usize) {}

    /// A save batch finished.
    fn batch_finished(&self, _outcome: &BatchOutcome) {}

    /// The run returned a summary.
    fn run_finished(&self, _summary: &RunSummary) {}
}

impl<T: RunObserver + ?Sized> RunObserver for Arc<T> {
    fn phase_started(&self, phase: RunPhase) {
        (**self).phase_started(phase)
    }

    fn chunks_planned(&self, total: usize) {
        (**self).chunks_planned(total)
    }

    fn chunks_completed(&self, done: usize, total: usize) {
        (**self).chunks_completed(done, total)
    }

    fn batch_finished(&self, outcome: &BatchOutcome) {
        (**self).batch_finished(outcome)
    }

    fn run_finished(&self, summary: &RunSummary) {
        (**self).run_finished(summary)
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Cooperative stop signal checked between chunk groups.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());

        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let token = CancellationToken::new();
        let handle = token.clone();
        std::thread::spawn(move || handle.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }
}
