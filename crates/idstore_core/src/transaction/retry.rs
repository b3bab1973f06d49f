//! Retry of whole units of work on transient conflicts.

use super::context::{CommitMode, Transaction};
use super::runner::TransactionalRunner;
use crate::error::{StoreError, StoreResult};
use rand::Rng;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How often and how fast a unit of work is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with `max_attempts` immediate retries.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_backoff.as_secs_f64()).max(0.0);

        let secs = if self.jitter {
            capped + capped * 0.25 * rand::thread_rng().gen::<f64>()
        } else {
            capped
        };
        Duration::from_secs_f64(secs)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Runner decorator that re-executes the whole unit of work on transient
/// conflicts.
///
/// This is the only runner that looks at [`StoreError::is_transient`].
/// Each attempt gets a fresh transaction. Non-transient errors are
/// returned immediately; running out of attempts yields
/// [`StoreError::RetriesExhausted`].
#[derive(Debug, Clone)]
pub struct RetryingRunner<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R: TransactionalRunner> RetryingRunner<R> {
    /// Wraps `inner` with `policy`.
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The wrapped runner.
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: TransactionalRunner> TransactionalRunner for RetryingRunner<R> {
    fn run<T, F>(&self, mode: CommitMode, mut work: F) -> StoreResult<T>
    where
        F: FnMut(&mut Transaction) -> StoreResult<T>,
    {
        let max_attempts = self.policy.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.run(mode, &mut work) {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "transaction succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() => {
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, error = %err, "transaction retries exhausted");
                        return Err(StoreError::RetriesExhausted {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        ?delay,
                        error = %err,
                        "transient conflict, retrying transaction"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}
