//! Configuration schema definitions

use crate::retry::RetryConfig;
use crate::validation::{ValidationResult, Validator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Approximate length of one degree of latitude, in meters
const METERS_PER_DEGREE: f64 = 111_000.0;

/// Root configuration schema
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConfigSchema {
    /// Proximity join parameters
    #[serde(default)]
    pub join: JoinConfig,

    /// Database connection
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Input and output table names
    #[serde(default)]
    pub tables: TableLayout,

    /// Logging
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl ConfigSchema {
    /// Check every section and collect all problems
    pub fn validate(&self) -> ValidationResult {
        let mut result = self.join.validate();
        result.merge(self.tables.validate());
        result.merge(self.database.validate());
        result
    }
}

/// Proximity join parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinConfig {
    /// Maximum distance in meters for a pair to be recorded
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,

    /// Grid cell size in decimal degrees
    #[serde(default = "default_grid_size")]
    pub grid_size: f64,

    /// Origin points per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Pending results that trigger a save
    #[serde(default = "default_save_batch_threshold")]
    pub save_batch_threshold: usize,

    /// Slack applied by the coarse bounding-box filter
    #[serde(default = "default_filter_margin_factor")]
    pub filter_margin_factor: f64,

    /// Worker threads for chunk processing (0 or 1 runs sequentially)
    #[serde(default)]
    pub parallelism: usize,

    /// Compute and screen without writing
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            max_distance: default_max_distance(),
            grid_size: default_grid_size(),
            chunk_size: default_chunk_size(),
            save_batch_threshold: default_save_batch_threshold(),
            filter_margin_factor: default_filter_margin_factor(),
            parallelism: 0,
            dry_run: false,
        }
    }
}

impl JoinConfig {
    /// Validate join parameters
    pub fn validate(&self) -> ValidationResult {
        let grid_extent_m = self.grid_size * METERS_PER_DEGREE;
        Validator::new()
            .positive("join.max_distance", self.max_distance)
            .positive("join.grid_size", self.grid_size)
            .range("join.grid_size", self.grid_size, f64::MIN_POSITIVE, 90.0)
            .non_zero("join.chunk_size", self.chunk_size)
            .non_zero("join.save_batch_threshold", self.save_batch_threshold)
            .at_least("join.filter_margin_factor", self.filter_margin_factor, 1.0)
            .warn_if(
                "join.grid_size",
                grid_extent_m.is_finite() && grid_extent_m < self.max_distance,
                "Grid cells are smaller than max_distance; neighbour lookups will scan more than 3x3 cells",
            )
            .warn_if(
                "join.chunk_size",
                self.chunk_size > 1000,
                "Chunks larger than 1000 origins delay failure detection and progress reporting",
            )
            .validate()
    }

    /// Whether chunks run on a worker pool
    pub fn is_parallel(&self) -> bool {
        self.parallelism > 1
    }
}

fn default_max_distance() -> f64 {
    1000.0
}

fn default_grid_size() -> f64 {
    0.01
}

fn default_chunk_size() -> usize {
    50
}

fn default_save_batch_threshold() -> usize {
    500
}

fn default_filter_margin_factor() -> f64 {
    1.2
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string; `DATABASE_URL` takes precedence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Connection retry policy
    #[serde(default)]
    pub retry: RetrySettings,
}

impl DatabaseConfig {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .range("database.retry.max_attempts", self.retry.max_attempts, 1, 20)
            .at_least("database.retry.backoff_multiplier", self.retry.backoff_multiplier, 1.0)
            .validate()
    }
}

/// Connection retry policy as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySettings {
    /// Attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for any delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between delays
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Randomize delays by up to 25%
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig {
            max_attempts: settings.max_attempts,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
            jitter: settings.jitter,
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

/// Table and column names read and written by the join
///
/// The output table always uses the columns `origin_id`, `target_id`,
/// `distance_meters` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableLayout {
    /// Origin (listing) table
    #[serde(default = "default_origins")]
    pub origins: String,
    /// Origin key column
    #[serde(default = "default_origin_id")]
    pub origin_id: String,
    /// Origin latitude column
    #[serde(default = "default_latitude")]
    pub origin_latitude: String,
    /// Origin longitude column
    #[serde(default = "default_longitude")]
    pub origin_longitude: String,

    /// Target (point-of-interest) table
    #[serde(default = "default_targets")]
    pub targets: String,
    /// Target key column
    #[serde(default = "default_target_id")]
    pub target_id: String,
    /// Target latitude column
    #[serde(default = "default_latitude")]
    pub target_latitude: String,
    /// Target longitude column
    #[serde(default = "default_longitude")]
    pub target_longitude: String,

    /// Output table
    #[serde(default = "default_distances")]
    pub distances: String,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            origins: default_origins(),
            origin_id: default_origin_id(),
            origin_latitude: default_latitude(),
            origin_longitude: default_longitude(),
            targets: default_targets(),
            target_id: default_target_id(),
            target_latitude: default_latitude(),
            target_longitude: default_longitude(),
            distances: default_distances(),
        }
    }
}

impl TableLayout {
    /// Validate that every name is a safe SQL identifier
    pub fn validate(&self) -> ValidationResult {
        Validator::new()
            .sql_identifier("tables.origins", &self.origins)
            .sql_identifier("tables.origin_id", &self.origin_id)
            .sql_identifier("tables.origin_latitude", &self.origin_latitude)
            .sql_identifier("tables.origin_longitude", &self.origin_longitude)
            .sql_identifier("tables.targets", &self.targets)
            .sql_identifier("tables.target_id", &self.target_id)
            .sql_identifier("tables.target_latitude", &self.target_latitude)
            .sql_identifier("tables.target_longitude", &self.target_longitude)
            .sql_identifier("tables.distances", &self.distances)
            .custom("tables.distances", || {
                (self.distances == self.origins || self.distances == self.targets)
                    .then(|| "Output table must differ from the input tables".to_string())
            })
            .validate()
    }

    /// Name used for indexes and constraints, without the schema prefix
    pub fn distances_base_name(&self) -> &str {
        self.distances.rsplit('.').next().unwrap_or(&self.distances)
    }
}

fn default_origins() -> String {
    "realestate.property_locations".to_string()
}

fn default_origin_id() -> String {
    "property_id".to_string()
}

fn default_targets() -> String {
    "realestate.addresses".to_string()
}

fn default_target_id() -> String {
    "id".to_string()
}

fn default_latitude() -> String {
    "latitude".to_string()
}

fn default_longitude() -> String {
    "longitude".to_string()
}

fn default_distances() -> String {
    "realestate.location_distances".to_string()
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySettings {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON lines instead of compact text
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
