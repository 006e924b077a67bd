//! Backoff runner implementation.

use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::attempt::Attempt;
use crate::config::BackoffConfig;
use crate::error::{BoxError, Result, ThrottleError};

/// Default upper bound on accumulated backoff sleep.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(15 * 60);

/// Upper bound (exclusive) of the random jitter, in milliseconds.
const JITTER_MS: u64 = 1000;

/// Runs an operation until it succeeds, fails with a non-retryable error, or
/// the accumulated backoff sleep reaches `max_wait`.
///
/// After the `k`th failed attempt (starting at 0) the runner sleeps
/// `2^k + rand(0..1000)` milliseconds. `max_wait` bounds the sum of those
/// sleeps; time spent inside the operation is not counted.
///
/// Each runner owns its random source, so concurrent runners jitter
/// independently.
#[derive(Debug)]
pub struct BackoffRunner {
    max_wait: Duration,
    rng: StdRng,
}

impl BackoffRunner {
    /// Create a runner with the default max wait and an entropy-seeded RNG.
    pub fn new() -> Self {
        Self {
            max_wait: DEFAULT_MAX_WAIT,
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a runner whose jitter sequence is reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            max_wait: DEFAULT_MAX_WAIT,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create a runner from configuration.
    pub fn from_config(config: &BackoffConfig) -> Self {
        let mut runner = match config.seed {
            Some(seed) => Self::with_seed(seed),
            None => Self::new(),
        };
        runner.set_max_wait(config.max_wait());
        runner
    }

    /// Set the maximum accumulated backoff sleep.
    pub fn set_max_wait(&mut self, max_wait: Duration) {
        self.max_wait = max_wait;
    }

    /// Get the maximum accumulated backoff sleep.
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Run `operation` with exponential backoff.
    ///
    /// Returns the operation's value on success,
    /// [`ThrottleError::NonRetryable`] as soon as it returns
    /// [`Attempt::NonRetryable`], or [`ThrottleError::Exhausted`] with the
    /// last error once the wait budget is spent.
    pub async fn run<T, E, F, Fut>(&mut self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, Attempt<E>>>,
        E: Into<BoxError>,
    {
        let mut waited = Duration::ZERO;
        let mut attempts: u32 = 0;
        let mut last_error: Option<BoxError> = None;

        while waited < self.max_wait {
            let err: BoxError = match operation().await {
                Ok(value) => {
                    debug!(attempts = attempts + 1, "Operation succeeded");
                    return Ok(value);
                }
                Err(Attempt::NonRetryable(err)) => {
                    let err: BoxError = err.into();
                    debug!(
                        attempts = attempts + 1,
                        error = %err,
                        "Operation failed with non-retryable error"
                    );
                    return Err(ThrottleError::NonRetryable(err));
                }
                Err(Attempt::Retryable(err)) => err.into(),
            };

            let delay = self.next_delay(attempts);
            debug!(
                attempt = attempts,
                delay = ?delay,
                error = %err,
                "Operation failed, backing off"
            );

            tokio::time::sleep(delay).await;
            waited = waited.saturating_add(delay);
            attempts += 1;
            last_error = Some(err);
        }

        info!(
            attempts = attempts,
            max_wait = ?self.max_wait,
            "Giving up after max wait"
        );

        Err(ThrottleError::Exhausted {
            max_wait: self.max_wait,
            attempts,
            last_error,
        })
    }

    /// Delay after failed attempt `attempt`: `2^attempt` ms plus jitter.
    fn next_delay(&mut self, attempt: u32) -> Duration {
        let base = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let jitter = self.rng.gen_range(0..JITTER_MS);
        Duration::from_millis(base.saturating_add(jitter))
    }
}

impl Default for BackoffRunner {
    fn default() -> Self {
        Self::new()
    }
}
