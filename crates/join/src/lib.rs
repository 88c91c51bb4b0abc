//! Batch orchestration for the listing / point-of-interest proximity join.
//!
//! A run walks through fixed phases:
//!
//! 1. load the pairs recorded by earlier runs
//! 2. fetch origins and targets with usable coordinates
//! 3. build the grid index over targets
//! 4. match origins chunk by chunk, sequentially or on a rayon pool,
//!    saving whenever enough results are pending
//! 5. save what is left
//!
//! Saves are screened, written in one transaction per batch, and never
//! overwrite an existing pair, so re-running is safe and only adds what is
//! missing.
//!
//! # Example
//!
//! ```
//! use proximity_core::config::JoinConfig;
//! use proximity_geo::GeoPoint;
//! use proximity_join::Orchestrator;
//! use proximity_store::MemoryStore;
//!
//! let mut store = MemoryStore::new()
//!     .with_origins([GeoPoint::new(1, 37.5000, 127.0000)])
//!     .with_targets([GeoPoint::new(100, 37.5010, 127.0010)]);
//!
//! let summary = Orchestrator::new(JoinConfig::default())?.run(&mut store)?;
//! assert_eq!(summary.saved, 1);
//! # Ok::<(), proximity_core::Error>(())
//! ```

#![warn(missing_docs)]

mod observer;
mod orchestrator;
mod pairs;
mod phase;
pub mod screen;
mod summary;

pub use observer::{BatchOutcome, CancellationToken, NoopObserver, RunObserver};
pub use orchestrator::Orchestrator;
pub use pairs::ProcessedPairSet;
pub use phase::RunPhase;
pub use summary::RunSummary;
