//! Telemetry for the proximity join
//!
//! - Structured logging with tracing (compact text or JSON lines on stderr)
//! - A process-wide registry of run counters, gauges and timings
//! - Drop-recording timers and structured events tagged with the session id

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};
use uuid::Uuid;

static METRICS: Lazy<MetricsRegistry> = Lazy::new(MetricsRegistry::new);

/// One id per process, attached to the first log line and every event
static SESSION_ID: Lazy<String> = Lazy::new(|| Uuid::new_v4().to_string());

/// Install the subscriber with default settings
pub fn init() -> anyhow::Result<()> {
    init_with_config(TelemetryConfig::default())
}

/// Install the subscriber
///
/// `RUST_LOG` wins over `config.log_level` when it is set. Logs go to stderr
/// so stdout stays free for summaries and DDL.
pub fn init_with_config(config: TelemetryConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| anyhow::anyhow!("Invalid log level {:?}: {}", config.log_level, e))?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        fmt::layer()
            .json()
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_writer(std::io::stderr)
            .compact()
            .with_filter(filter)
            .boxed()
    };

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layer))
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    tracing::info!(
        session_id = %session_id(),
        version = env!("CARGO_PKG_VERSION"),
        "Telemetry initialized"
    );

    Ok(())
}

/// Id of this process
pub fn session_id() -> &'static str {
    &SESSION_ID
}

/// Subscriber settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    /// JSON lines instead of compact text
    pub json: bool,
    /// Include the module path of each event
    pub show_target: bool,
    /// Include the emitting thread, useful with a worker pool
    pub show_thread_ids: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            show_target: false,
            show_thread_ids: false,
        }
    }
}

/// Named counters, gauges and timings
///
/// Timings keep a running summary, not every sample.
pub struct MetricsRegistry {
    inner: Mutex<Metrics>,
    started: Instant,
}

#[derive(Default)]
struct Metrics {
    counters: BTreeMap<String, u64>,
    gauges: BTreeMap<String, u64>,
    timings: BTreeMap<String, TimingStats>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
            started: Instant::now(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Metrics) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Add one to a counter
    pub fn increment(&self, name: &str) {
        self.increment_by(name, 1);
    }

    /// Add `value` to a counter
    pub fn increment_by(&self, name: &str, value: u64) {
        self.with(|m| {
            let counter = m.counters.entry(name.to_string()).or_default();
            *counter = counter.saturating_add(value);
        });
    }

    /// Current value of a counter (0 if never incremented)
    pub fn counter(&self, name: &str) -> u64 {
        self.with(|m| m.counters.get(name).copied().unwrap_or(0))
    }

    /// Overwrite a gauge
    pub fn gauge(&self, name: &str, value: u64) {
        self.with(|m| {
            m.gauges.insert(name.to_string(), value);
        });
    }

    /// Last value written to a gauge
    pub fn gauge_value(&self, name: &str) -> Option<u64> {
        self.with(|m| m.gauges.get(name).copied())
    }

    /// Record one timing sample in milliseconds
    pub fn histogram(&self, name: &str, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.with(|m| m.timings.entry(name.to_string()).or_default().observe(value));
    }

    /// Summary of one timing
    pub fn histogram_stats(&self, name: &str) -> Option<TimingStats> {
        self.with(|m| m.timings.get(name).copied())
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.with(|m| MetricsSnapshot {
            session_id: session_id().to_string(),
            uptime_secs: self.started.elapsed().as_secs(),
            counters: m.counters.clone(),
            gauges: m.gauges.clone(),
            timings: m.timings.clone(),
        })
    }
}

/// Running summary of a timing
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    /// Samples seen
    pub count: u64,
    /// Sum of all samples
    pub total: f64,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
}

impl TimingStats {
    fn observe(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.total += value;
    }

    /// Average sample, 0 when empty
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Serializable copy of a [`MetricsRegistry`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Process session id
    pub session_id: String,
    /// Seconds since the registry was created
    pub uptime_secs: u64,
    /// Counter values by name
    pub counters: BTreeMap<String, u64>,
    /// Gauge values by name
    pub gauges: BTreeMap<String, u64>,
    /// Timing summaries by name
    pub timings: BTreeMap<String, TimingStats>,
}

/// The process-wide registry
pub fn metrics() -> &'static MetricsRegistry {
    &METRICS
}

/// Measures one operation
///
/// The duration lands in the `<name>` timing in milliseconds, either on
/// [`Timer::stop`] or when the timer is dropped.
pub struct Timer {
    name: String,
    start: Instant,
    recorded: bool,
}

impl Timer {
    /// Start measuring
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            recorded: false,
        }
    }

    /// Stop and record, returning the elapsed time
    pub fn stop(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if !self.recorded {
            self.recorded = true;
            metrics().histogram(&self.name, elapsed.as_secs_f64() * 1000.0);
            tracing::trace!(metric = %self.name, elapsed_ms = elapsed.as_millis() as u64, "Timer recorded");
        }
        elapsed
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.record();
    }
}

/// Structured event with a timestamp and the session id
#[derive(Debug, Serialize)]
pub struct Event {
    /// When the event was created
    pub timestamp: DateTime<Utc>,
    /// Process session id
    pub session_id: String,
    /// Dotted event name, e.g. `proximity.run_completed`
    pub event_type: String,
    /// Payload
    pub data: serde_json::Value,
}

impl Event {
    /// Create an event stamped now
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id().to_string(),
            event_type: event_type.into(),
            data,
        }
    }

    /// Emit the event at info level
    pub fn log(&self) {
        tracing::info!(
            event_type = %self.event_type,
            session_id = %self.session_id,
            timestamp = %self.timestamp.to_rfc3339(),
            data = %self.data,
            "Event recorded"
        );
    }
}
