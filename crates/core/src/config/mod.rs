//! Configuration loading and schema definitions
//!
//! One TOML file drives a run: join parameters, database connection, table
//! layout and telemetry.

mod loader;
mod schema;

pub use loader::Config;
pub use schema::*;
