//! Exponential backoff for I/O boundaries
//!
//! Only opening the database connection goes through here. Pair computation
//! and batch saves are not retried: a failed batch is rolled back and
//! reported by the orchestrator, and the next run picks the pairs up again.
//!
//! # Example
//!
//! ```rust,no_run
//! use proximity_core::retry::{retry, RetryConfig};
//!
//! let connected = retry(RetryConfig::patient(), || {
//!     Ok::<_, std::io::Error>("connected")
//! });
//! assert!(connected.is_ok());
//! ```

use crate::error::{Error, ErrorCode, Result};
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Backoff policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts including the first; 0 is treated as 1
    pub max_attempts: u32,
    /// Wait before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single wait, before jitter
    pub max_delay: Duration,
    /// Growth factor between consecutive waits
    pub backoff_multiplier: f64,
    /// Stretch each wait by up to a quarter
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Longer waits for a database that may still be starting next to the
    /// ETL worker
    pub fn patient() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// A single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Wait before attempt number `attempt` (0-based); the first attempt
    /// never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let Some(retries) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };

        let exponent = i32::try_from(retries).unwrap_or(i32::MAX);
        let grown = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = grown.min(self.max_delay.as_secs_f64());
        let stretched = if self.jitter {
            capped * (1.0 + 0.25 * jitter_fraction())
        } else {
            capped
        };

        Duration::try_from_secs_f64(stretched).unwrap_or(self.max_delay)
    }
}

/// A value in [0, 1) from the process hasher's random keys
fn jitter_fraction() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    (RandomState::new().hash_one(nanos) % 1024) as f64 / 1024.0
}

/// Outcome of [`retry`], successful or not
#[derive(Debug)]
pub struct Attempts<V> {
    /// Success value, or the error of the last attempt
    pub value: V,
    /// Attempts made
    pub attempts: u32,
    /// Time from the first attempt to the outcome
    pub elapsed: Duration,
}

/// Runs `f` until it succeeds or the attempts are used up.
///
/// # Errors
/// Returns the last error once every attempt failed.
pub fn retry<F, T, E>(config: RetryConfig, mut f: F) -> std::result::Result<Attempts<T>, Attempts<E>>
where
    F: FnMut() -> std::result::Result<T, E>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        thread::sleep(config.delay_before(attempts));
        attempts += 1;

        match f() {
            Ok(value) => {
                return Ok(Attempts {
                    value,
                    attempts,
                    elapsed: started.elapsed(),
                });
            }
            Err(e) if attempts >= max_attempts => {
                return Err(Attempts {
                    value: e,
                    attempts,
                    elapsed: started.elapsed(),
                });
            }
            Err(e) => {
                tracing::warn!(attempt = attempts, max_attempts, error = %e, "Attempt failed, retrying");
            }
        }
    }
}

/// [`retry`] for operations that already return [`Error`].
///
/// The last error becomes the source and its code is kept, so a connection
/// failure is still a connection failure after the retries run out.
pub fn retry_operation<F, T>(config: RetryConfig, operation: &str, f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    match retry(config, f) {
        Ok(done) => {
            if done.attempts > 1 {
                tracing::info!(
                    operation,
                    attempts = done.attempts,
                    elapsed_ms = done.elapsed.as_millis() as u64,
                    "Succeeded after retrying"
                );
            }
            Ok(done.value)
        }
        Err(failed) => {
            let last = failed.value;
            let code = if last.code == ErrorCode::Unknown {
                ErrorCode::Timeout
            } else {
                last.code
            };
            let message = format!("{} failed after {} attempts: {}", operation, failed.attempts, last.message);
            let suggestion = last.suggestion.clone();

            let mut err = Error::new(code, message).with_source(last);
            err.suggestion = suggestion;
            Err(err)
        }
    }
}
