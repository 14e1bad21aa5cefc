//! Bounded retry for contended storage writes.
//!
//! Store operations run in a single transaction each. When the transaction
//! cannot start or commit because another writer holds the lock, the whole
//! operation is retried from scratch with a fresh transaction:
//!
//! ```text
//! attempt 1 ──busy──> sleep(backoff) ──> attempt 2 ──busy──> ... ──> Busy { attempts }
//!     │                                     │
//!     └──ok / non-busy error──> return      └──ok / non-busy error──> return
//! ```
//!
//! Only [`Error::Busy`] is retried. Domain errors such as
//! [`Error::TemporalConflict`] are returned on the first attempt.

use crate::{Error, Result};
use std::time::Duration;

/// Retry budget for one store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base sleep between attempts; attempt `n` waits `n * backoff_ms`.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy.
    #[must_use]
    pub const fn new(max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_ms,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    /// Total attempts including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Runs `call` until it succeeds, fails with a non-busy error, or the
    /// budget runs out.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or [`Error::Busy`] carrying the
    /// number of attempts once every attempt was busy.
    pub fn run<T>(&self, operation: &'static str, mut call: impl FnMut() -> Result<T>) -> Result<T> {
        let max_attempts = self.max_attempts();
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempts < max_attempts => {
                    metrics::counter!("storage_retries_total", "operation" => operation)
                        .increment(1);
                    tracing::debug!(operation, attempt = attempts, error = %err, "Retrying busy storage operation");
                    if self.backoff_ms > 0 {
                        std::thread::sleep(Duration::from_millis(
                            self.backoff_ms.saturating_mul(u64::from(attempts)),
                        ));
                    }
                },
                Err(err) if err.is_retryable() => break,
                Err(err) => return Err(err),
            }
        }

        metrics::counter!("storage_busy_total", "operation" => operation).increment(1);
        tracing::warn!(operation, attempts, "Storage stayed busy, giving up");
        Err(Error::Busy {
            operation: operation.to_string(),
            attempts,
        })
    }
}
