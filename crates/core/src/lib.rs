//! Shared foundations for the proximity join workspace
//!
//! This crate provides the pieces every other crate in the workspace leans on:
//!
//! - **Error handling**: coded errors with context and recovery suggestions
//! - **Configuration**: TOML-based join, database, table and telemetry settings
//! - **Validation**: fluent validation of configuration values
//! - **Retry**: bounded exponential backoff for I/O boundaries
//!
//! # Example
//!
//! ```rust,no_run
//! use proximity_core::config::Config;
//!
//! let config = Config::load(None).expect("config should load");
//! let report = config.schema.validate();
//!
//! if !report.is_valid() {
//!     for error in report.errors() {
//!         eprintln!("config error: {}", error);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod retry;
pub mod validation;

pub use error::{Error, ErrorCode, Result, ResultExt};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, ConfigSchema, JoinConfig, TableLayout};
    pub use crate::error::{exit_codes, Error, ErrorCode, Result, ResultExt};
    pub use crate::retry::{retry, retry_operation, RetryConfig};
    pub use crate::validation::{ValidationResult, Validator};
}
