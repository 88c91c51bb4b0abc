//! Progress bar driven by orchestrator callbacks

use indicatif::{ProgressBar, ProgressStyle};
use proximity_join::{BatchOutcome, RunObserver, RunPhase, RunSummary};
use std::time::Duration;

/// Shows chunk progress and reports failed batches above the bar.
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    /// Create an observer with a spinner until the chunk count is known
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.blue} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl RunObserver for ProgressObserver {
    fn phase_started(&self, phase: RunPhase) {
        if phase == RunPhase::Failed {
            self.bar.abandon_with_message("✗ Run failed");
        } else {
            self.bar.set_message(phase_message(phase));
        }
    }

    fn chunks_planned(&self, total: usize) {
        self.bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn chunks_completed(&self, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
    }

    fn batch_finished(&self, outcome: &BatchOutcome) {
        if let BatchOutcome::Failed { batch, rows, error } = outcome {
            self.bar
                .println(format!("✗ Batch {batch} rolled back ({rows} rows): {error}"));
        }
    }

    fn run_finished(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

fn phase_message(phase: RunPhase) -> &'static str {
    match phase {
        RunPhase::LoadProcessedPairs => "Loading recorded pairs",
        RunPhase::FetchCandidates => "Fetching origins and targets",
        RunPhase::BuildIndex => "Building grid index",
        RunPhase::ProcessChunks => "Matching",
        RunPhase::SaveRemaining => "Saving remaining rows",
        RunPhase::Done => "Done",
        RunPhase::Failed => "Failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_tracks_chunks() {
        let observer = ProgressObserver::new();
        observer.phase_started(RunPhase::ProcessChunks);
        observer.chunks_planned(4);
        observer.chunks_completed(3, 4);
        assert_eq!(observer.bar.position(), 3);
        assert_eq!(observer.bar.length(), Some(4));
        observer.run_finished(&RunSummary::default());
        assert!(observer.bar.is_finished());
    }
}
