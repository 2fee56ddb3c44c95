// src/retry.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Bounded retry for store calls that fail with transient errors.

use std::thread;
use std::time::Duration;

use tracing::{debug, error};

use crate::constants::{DEFAULT_RETRY_BACKOFF, DEFAULT_UPLOAD_ATTEMPTS};
use crate::error::{Error, Result, StoreErrorKind, StoreResult};

/// How often, and on which errors, a store call is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of tries, including the first. 0 is treated as 1.
    pub attempts: usize,
    /// Sleep between tries.
    pub backoff: Duration,
    /// Error kinds worth retrying. Everything else fails immediately.
    pub retry_on: Vec<StoreErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_UPLOAD_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
            retry_on: vec![StoreErrorKind::Connection],
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: usize, backoff: Duration) -> Self {
        Self { attempts, backoff, ..Default::default() }
    }

    pub fn retry_on(mut self, kinds: &[StoreErrorKind]) -> Self {
        self.retry_on = kinds.to_vec();
        self
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. `what` names the operation in errors and logs.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> StoreResult<T>,
    {
        let attempts = self.attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match op() {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{what} succeeded on attempt {attempt}");
                    }
                    return Ok(value);
                }
                Err(e) if self.retry_on.contains(&e.kind()) => {
                    let remaining = attempts - attempt;
                    error!("{what}: {e}. Sleeping and retrying {remaining} more times before giving up.");
                    last_err = Some(e);
                    if remaining > 0 {
                        thread::sleep(self.backoff);
                    }
                }
                Err(e) => return Err(Error::store(format!("{what} failed: {e}"), e)),
            }
        }

        error!("{what}: giving up after {attempts} attempts");
        Err(Error::Io {
            message: format!("{what}: unable to connect to the endpoint after {attempts} attempts"),
            source: last_err,
        })
    }
}
