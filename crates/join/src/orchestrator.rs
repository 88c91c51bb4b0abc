//! Drives one join run from loading recorded pairs to the final save.

use crate::screen::screen_batch;
use crate::{BatchOutcome, CancellationToken, NoopObserver, ProcessedPairSet, RunObserver, RunPhase, RunSummary};
use proximity_core::config::JoinConfig;
use proximity_core::{Error, ErrorCode, Result, ResultExt};
use proximity_geo::{ChunkProcessor, DistanceTriple, GeoError, GeoPoint, GridIndex, ProximityParams};
use proximity_store::DistanceStore;
use proximity_telemetry::{metrics, Event, Timer};
use std::collections::HashSet;
use std::time::Instant;

/// Runs the proximity join against a [`DistanceStore`].
pub struct Orchestrator {
    config: JoinConfig,
    params: ProximityParams,
    observer: Box<dyn RunObserver>,
    cancellation: CancellationToken,
}

impl Orchestrator {
    /// Creates an orchestrator for `config`.
    ///
    /// # Errors
    /// Returns a configuration error if any parameter is unusable. Nothing is
    /// retried.
    pub fn new(config: JoinConfig) -> Result<Self> {
        config.validate().to_result()?;
        let params = ProximityParams {
            max_distance: config.max_distance,
            grid_size: config.grid_size,
            margin_factor: config.filter_margin_factor,
        };
        params.validate().map_err(geo_error)?;

        Ok(Self {
            config,
            params,
            observer: Box::new(NoopObserver),
            cancellation: CancellationToken::new(),
        })
    }

    /// Reports progress to `observer`.
    pub fn with_observer(mut self, observer: impl RunObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Stops between chunk groups once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Token that cancels this orchestrator's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Join parameters.
    pub fn config(&self) -> &JoinConfig {
        &self.config
    }

    /// Runs the join once.
    ///
    /// Failures while loading pairs, fetching points or building the index
    /// fail the run. After that, a failing batch is rolled back, counted in
    /// the summary, and the run continues.
    pub fn run<S>(&self, store: &mut S) -> Result<RunSummary>
    where
        S: DistanceStore + ?Sized,
    {
        let started = Instant::now();
        tracing::info!(
            max_distance = self.config.max_distance,
            grid_size = self.config.grid_size,
            chunk_size = self.config.chunk_size,
            save_batch_threshold = self.config.save_batch_threshold,
            parallelism = self.config.parallelism,
            dry_run = self.config.dry_run,
            "Starting proximity join"
        );

        let mut run = Run {
            orchestrator: self,
            store,
            summary: RunSummary {
                dry_run: self.config.dry_run,
                ..Default::default()
            },
            processed: ProcessedPairSet::new(),
            phase: RunPhase::LoadProcessedPairs,
            phase_timer: None,
            batches: 0,
        };
        let result = run.execute();
        run.phase_timer = None;

        let mut summary = run.summary;
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        summary.final_phase = run.phase;

        match result {
            Ok(()) => {
                record_metrics(&summary);
                Event::new("proximity.run_completed", serde_json::to_value(&summary)?).log();
                tracing::info!(
                    matched = summary.matched,
                    saved = summary.saved,
                    failed_batches = summary.failed_batches,
                    cancelled = summary.cancelled,
                    elapsed_ms = summary.elapsed_ms,
                    "Proximity join finished"
                );
                self.observer.run_finished(&summary);
                Ok(summary)
            }
            Err(err) => {
                metrics().increment("proximity.runs.failed");
                Err(err)
            }
        }
    }

    fn worker_pool(&self) -> Result<Option<rayon::ThreadPool>> {
        if !self.config.is_parallel() {
            return Ok(None);
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.parallelism)
            .thread_name(|i| format!("proximity-worker-{i}"))
            .build()
            .map(Some)
            .map_err(|e| Error::new(ErrorCode::Internal, format!("Failed to start worker pool: {e}")).with_source(e))
    }
}

/// State of one call to [`Orchestrator::run`].
struct Run<'o, 's, S: ?Sized> {
    orchestrator: &'o Orchestrator,
    store: &'s mut S,
    summary: RunSummary,
    processed: ProcessedPairSet,
    phase: RunPhase,
    phase_timer: Option<Timer>,
    batches: usize,
}

impl<S> Run<'_, '_, S>
where
    S: DistanceStore + ?Sized,
{
    fn execute(&mut self) -> Result<()> {
        let orchestrator = self.orchestrator;
        let config = &orchestrator.config;

        self.enter(RunPhase::LoadProcessedPairs);
        let pairs = self.store.load_processed_pairs().map_err(Error::from);
        let pairs = self.prerequisite(pairs, "Loading processed pairs")?;
        self.processed = pairs.into_iter().collect();
        tracing::info!(pairs = self.processed.len(), "Loaded processed pairs");

        self.enter(RunPhase::FetchCandidates);
        let origins = self.store.fetch_origins().map_err(Error::from);
        let origins = self.prerequisite(origins, "Fetching origins")?;
        let targets = self.store.fetch_targets().map_err(Error::from);
        let targets = self.prerequisite(targets, "Fetching targets")?;
        let (origins, duplicate_origins) = dedupe_origins(origins);
        self.summary.origins = origins.len() as u64;
        self.summary.targets = targets.len() as u64;
        self.summary.duplicate_origins = duplicate_origins;
        if duplicate_origins > 0 {
            tracing::warn!(duplicate_origins, "Dropped repeated origin ids");
        }
        tracing::info!(origins = origins.len(), targets = targets.len(), "Fetched candidates");

        self.enter(RunPhase::BuildIndex);
        let grid = GridIndex::build(&targets, config.grid_size).map_err(geo_error);
        let grid = self.prerequisite(grid, "Building grid index")?;
        self.summary.invalid_targets = grid.skipped() as u64;
        let processor = ChunkProcessor::new(&grid, &orchestrator.params).map_err(geo_error);
        let processor = self.prerequisite(processor, "Building grid index")?;
        let pool = self.prerequisite(orchestrator.worker_pool(), "Starting workers")?;
        metrics().gauge("proximity.grid.cells", grid.cell_count() as u64);
        tracing::info!(targets = grid.len(), cells = grid.cell_count(), skipped = grid.skipped(), "Grid index built");

        self.enter(RunPhase::ProcessChunks);
        let chunks: Vec<&[GeoPoint]> = origins.chunks(config.chunk_size).collect();
        let total = chunks.len();
        self.summary.chunks = total as u64;
        orchestrator.observer.chunks_planned(total);

        let group_size = if pool.is_some() { config.parallelism } else { 1 };
        let mut pending: Vec<DistanceTriple> = Vec::new();
        let mut done = 0;

        for group in chunks.chunks(group_size) {
            if orchestrator.cancellation.is_cancelled() {
                self.summary.cancelled = true;
                tracing::warn!(chunks_done = done, chunks_total = total, "Run cancelled; saving pending results");
                break;
            }

            let outputs = {
                let processed = &self.processed;
                let skip = |origin_id: i64, target_id: i64| processed.contains(origin_id, target_id);
                match &pool {
                    Some(pool) => pool.install(|| processor.process_chunks(group, &skip)),
                    None => group.iter().map(|chunk| processor.process_chunk(chunk, &skip)).collect(),
                }
            };
            for output in outputs {
                self.summary.record_chunk(&output.stats);
                pending.extend(output.triples);
            }

            done += group.len();
            orchestrator.observer.chunks_completed(done, total);

            if pending.len() >= config.save_batch_threshold {
                self.flush(&mut pending);
            }
        }

        self.enter(RunPhase::SaveRemaining);
        if !pending.is_empty() {
            self.flush(&mut pending);
        }

        self.enter(RunPhase::Done);
        Ok(())
    }

    fn enter(&mut self, next: RunPhase) {
        debug_assert!(
            self.phase == next || self.phase.can_advance_to(next),
            "illegal phase transition {} -> {}",
            self.phase,
            next
        );
        self.phase = next;
        self.phase_timer = (!next.is_terminal()).then(|| Timer::start(format!("proximity.phase.{}_ms", next)));
        tracing::debug!(phase = %next, "Entering phase");
        self.orchestrator.observer.phase_started(next);
    }

    /// Passes `result` through, moving the run to `FAILED` on error.
    fn prerequisite<T>(&mut self, result: Result<T>, context: &str) -> Result<T> {
        result.context(context).inspect_err(|err| {
            tracing::error!(phase = %self.phase, error = %err, "Run failed");
            self.enter(RunPhase::Failed);
        })
    }

    /// Writes everything in `pending` in slices of at most the threshold.
    fn flush(&mut self, pending: &mut Vec<DistanceTriple>) {
        let threshold = self.orchestrator.config.save_batch_threshold;
        let batch = std::mem::take(pending);
        for slice in batch.chunks(threshold) {
            self.save(slice);
        }
    }

    fn save(&mut self, slice: &[DistanceTriple]) {
        self.batches += 1;
        let batch = self.batches;
        let orchestrator = self.orchestrator;
        let _timer = Timer::start("proximity.save_batch_ms");

        let screened = match screen_batch(slice, &self.processed, orchestrator.config.max_distance, &mut *self.store) {
            Ok(screened) => screened,
            Err(err) => return self.batch_failed(batch, slice.len(), err.to_string()),
        };
        self.summary.duplicates_dropped += screened.duplicates_dropped;
        self.summary.rejected_validation += screened.rejected_validation;
        self.summary.rejected_missing_parent += screened.rejected_missing_parent;

        let rows = screened.rows;
        if rows.is_empty() {
            tracing::debug!(batch, "Nothing left to save after screening");
            return;
        }

        if orchestrator.config.dry_run {
            self.processed.extend(rows.iter().map(|r| (r.origin_id, r.target_id)));
            tracing::info!(batch, rows = rows.len(), "Dry run; batch not written");
            orchestrator
                .observer
                .batch_finished(&BatchOutcome::Skipped { batch, rows: rows.len() });
            return;
        }

        match self.store.insert_batch(&rows) {
            Ok(inserted) => {
                self.summary.saved += inserted;
                self.summary.conflicts += (rows.len() as u64).saturating_sub(inserted);
                self.processed.extend(rows.iter().map(|r| (r.origin_id, r.target_id)));
                tracing::info!(batch, rows = rows.len(), inserted, "Batch saved");
                orchestrator.observer.batch_finished(&BatchOutcome::Saved {
                    batch,
                    rows: rows.len(),
                    inserted,
                });
            }
            Err(err) => self.batch_failed(batch, rows.len(), err.to_string()),
        }
    }

    fn batch_failed(&mut self, batch: usize, rows: usize, error: String) {
        self.summary.failed_batches += 1;
        self.summary.failed_records += rows as u64;
        tracing::error!(batch, rows, error = %error, "Batch rolled back; continuing with the next one");
        self.orchestrator
            .observer
            .batch_finished(&BatchOutcome::Failed { batch, rows, error });
    }
}

/// Keeps the first occurrence of every origin id.
fn dedupe_origins(origins: Vec<GeoPoint>) -> (Vec<GeoPoint>, u64) {
    let before = origins.len();
    let mut seen = HashSet::with_capacity(before);
    let unique: Vec<GeoPoint> = origins.into_iter().filter(|p| seen.insert(p.id)).collect();
    let dropped = (before - unique.len()) as u64;
    (unique, dropped)
}

fn geo_error(err: GeoError) -> Error {
    let code = match err {
        GeoError::NonFiniteCoordinate { .. } => ErrorCode::InvalidCoordinate,
        GeoError::InvalidGridSize(_) => ErrorCode::InvalidGrid,
        GeoError::InvalidParams(_) => ErrorCode::InvalidConfigValue,
    };
    Error::new(code, err.to_string()).with_source(err)
}

fn record_metrics(summary: &RunSummary) {
    let registry = metrics();
    registry.increment("proximity.runs.completed");
    registry.increment_by("proximity.origins", summary.origins);
    registry.increment_by("proximity.pairs.candidates", summary.candidate_pairs);
    registry.increment_by("proximity.pairs.coarse_rejected", summary.coarse_rejected);
    registry.increment_by("proximity.pairs.matched", summary.matched);
    registry.increment_by("proximity.pairs.saved", summary.saved);
    registry.increment_by("proximity.pairs.conflicts", summary.conflicts);
    registry.increment_by("proximity.pairs.rejected", summary.rejected());
    registry.increment_by("proximity.batches.failed", summary.failed_batches);
    registry.histogram("proximity.run_ms", summary.elapsed_ms as f64);
}
