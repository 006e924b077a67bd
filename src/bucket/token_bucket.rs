//! Token bucket implementation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::config::BucketConfig;
use crate::error::{Result, ThrottleError};

/// A leaky-bucket token regulator.
///
/// The bucket starts full with `capacity` tokens. A background task owned by
/// the bucket adds one token every `refill_interval` while the bucket is below
/// capacity, so callers get a burst of `capacity` calls followed by a steady
/// rate of one call per interval.
///
/// Tokens are held in a tokio [`Semaphore`], which queues waiters in FIFO
/// order. Share the bucket between tasks behind an `Arc`.
pub struct TokenBucket {
    /// Available tokens
    tokens: Arc<Semaphore>,
    /// Maximum number of tokens held at once
    capacity: usize,
    /// Time between refills
    refill_interval: Duration,
    /// Background refill task, stopped on close or drop
    refiller: JoinHandle<()>,
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("refill_interval", &self.refill_interval)
            .field("available", &self.tokens.available_permits())
            .field("closed", &self.tokens.is_closed())
            .finish()
    }
}

impl TokenBucket {
    /// Create a full bucket and start its refill task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(capacity: usize, refill_interval: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(ThrottleError::Config(
                "bucket capacity must be greater than zero".to_string(),
            ));
        }
        if capacity > Semaphore::MAX_PERMITS || u32::try_from(capacity).is_err() {
            return Err(ThrottleError::Config(format!(
                "bucket capacity {} is too large",
                capacity
            )));
        }
        if refill_interval.is_zero() {
            return Err(ThrottleError::Config(
                "refill interval must be greater than zero".to_string(),
            ));
        }
        let first_refill = Instant::now().checked_add(refill_interval).ok_or_else(|| {
            ThrottleError::Config(format!("refill interval {:?} is too large", refill_interval))
        })?;

        let tokens = Arc::new(Semaphore::new(capacity));
        let refiller = tokio::spawn(refill(
            Arc::clone(&tokens),
            capacity,
            first_refill,
            refill_interval,
        ));

        info!(
            capacity = capacity,
            refill_interval = ?refill_interval,
            "Token bucket created"
        );

        Ok(Self {
            tokens,
            capacity,
            refill_interval,
            refiller,
        })
    }

    /// Create a bucket from configuration.
    pub fn from_config(config: &BucketConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.capacity, config.refill_interval())
    }

    /// Take one token, waiting until one is available.
    ///
    /// Only fails if the bucket has been closed.
    pub async fn take(&self) -> Result<()> {
        let permit = self
            .tokens
            .acquire()
            .await
            .map_err(|_| ThrottleError::Closed)?;
        permit.forget();
        Ok(())
    }

    /// Take `n` tokens at once.
    ///
    /// If fewer than `n` tokens are available, sleeps for the time the refill
    /// rate should need to produce the shortfall and then waits for all `n`.
    /// The sleep is an estimate; the final acquire waits further if the
    /// bucket is still short.
    pub async fn take_n(&self, n: usize) -> Result<()> {
        if n > self.capacity {
            return Err(ThrottleError::InvalidRequest {
                requested: n,
                capacity: self.capacity,
            });
        }
        // capacity was checked to fit in u32 at construction
        let permits = n as u32;

        match self.tokens.try_acquire_many(permits) {
            Ok(permit) => {
                permit.forget();
                return Ok(());
            }
            Err(TryAcquireError::Closed) => return Err(ThrottleError::Closed),
            Err(TryAcquireError::NoPermits) => {}
        }

        let available = self.tokens.available_permits();
        let needed = n.saturating_sub(available) as u32;
        let wait = self.refill_interval.saturating_mul(needed);

        debug!(
            requested = n,
            available = available,
            wait = ?wait,
            "Not enough tokens, waiting for refill"
        );

        time::sleep(wait).await;

        let permit = self
            .tokens
            .acquire_many(permits)
            .await
            .map_err(|_| ThrottleError::Closed)?;
        permit.forget();
        Ok(())
    }

    /// Number of tokens available right now.
    ///
    /// The value can change as soon as it is read.
    pub fn current_size(&self) -> usize {
        self.tokens.available_permits()
    }

    /// Get the maximum number of tokens.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the refill interval.
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Stop refilling and fail every pending and future take with
    /// [`ThrottleError::Closed`].
    pub fn close(&self) {
        if self.tokens.is_closed() {
            return;
        }
        self.tokens.close();
        self.refiller.abort();
        info!(capacity = self.capacity, "Token bucket closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.tokens.is_closed()
    }
}

impl Drop for TokenBucket {
    fn drop(&mut self) {
        self.refiller.abort();
    }
}

/// Add one token per tick while below capacity.
///
/// Ticks that find the bucket full are lost, and ticks missed while the task
/// was not scheduled are skipped rather than replayed.
async fn refill(
    tokens: Arc<Semaphore>,
    capacity: usize,
    first_refill: Instant,
    refill_interval: Duration,
) {
    let mut ticker = time::interval_at(first_refill, refill_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if tokens.is_closed() {
            break;
        }

        // Only this task adds tokens, so the count cannot pass capacity
        // between the check and the add.
        let available = tokens.available_permits();
        if available < capacity {
            tokens.add_permits(1);
            trace!(available = available + 1, capacity = capacity, "Refilled token");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn test_new_bucket_is_full() {
        for capacity in [1, 5, 64] {
            let bucket = TokenBucket::new(capacity, Duration::from_millis(100)).unwrap();
            assert_eq!(bucket.current_size(), capacity);
            assert_eq!(bucket.capacity(), capacity);
            assert_eq!(bucket.refill_interval(), Duration::from_millis(100));
        }
    }

    #[tokio::test]
    async fn test_new_rejects_zero_capacity() {
        let result = TokenBucket::new(0, Duration::from_secs(1));
        assert!(matches!(result, Err(ThrottleError::Config(_))));
    }

    #[tokio::test]
    async fn test_new_rejects_zero_interval() {
        let result = TokenBucket::new(5, Duration::ZERO);
        assert!(matches!(result, Err(ThrottleError::Config(_))));
    }

    #[tokio::test]
    async fn test_new_rejects_unrepresentable_interval() {
        let result = TokenBucket::new(1, Duration::MAX);
        assert!(matches!(result, Err(ThrottleError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_accepts_long_interval() {
        let bucket = TokenBucket::new(1, Duration::from_secs(365 * 86400)).unwrap();
        bucket.take().await.unwrap();

        time::sleep(Duration::from_millis(10)).await;

        assert_eq!(bucket.current_size(), 0);
        assert!(!bucket.is_closed());
        assert!(!bucket.refiller.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_decrements() {
        let bucket = TokenBucket::new(5, HOUR).unwrap();

        for taken in 1..=5 {
            bucket.take().await.unwrap();
            assert_eq!(bucket.current_size(), 5 - taken);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_n_over_capacity_is_invalid() {
        let bucket = TokenBucket::new(5, HOUR).unwrap();
        bucket.take().await.unwrap();

        let result = bucket.take_n(6).await;

        assert!(matches!(
            result,
            Err(ThrottleError::InvalidRequest {
                requested: 6,
                capacity: 5
            })
        ));
        assert_eq!(bucket.current_size(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_n_fast_path() {
        let bucket = TokenBucket::new(5, HOUR).unwrap();
        let start = Instant::now();

        bucket.take_n(3).await.unwrap();

        assert_eq!(bucket.current_size(), 2);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_n_zero_is_noop() {
        let bucket = TokenBucket::new(2, HOUR).unwrap();
        bucket.take_n(0).await.unwrap();
        assert_eq!(bucket.current_size(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_n_slow_path_waits_for_refill() {
        let bucket = TokenBucket::new(5, Duration::from_millis(100)).unwrap();
        bucket.take_n(5).await.unwrap();
        let start = Instant::now();

        bucket.take_n(3).await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(400), "elapsed {:?}", elapsed);
        assert_eq!(bucket.current_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_after_drain() {
        let bucket = TokenBucket::new(5, Duration::from_millis(100)).unwrap();
        bucket.take_n(5).await.unwrap();
        assert_eq!(bucket.current_size(), 0);

        time::sleep(Duration::from_millis(350)).await;

        assert_eq!(bucket.current_size(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_never_exceeds_capacity() {
        let bucket = TokenBucket::new(3, Duration::from_millis(10)).unwrap();
        bucket.take().await.unwrap();

        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(bucket.current_size(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_takes_grant_capacity_only() {
        let bucket = Arc::new(TokenBucket::new(3, HOUR).unwrap());
        let completed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                let completed = Arc::clone(&completed);
                tokio::spawn(async move {
                    let result = bucket.take().await;
                    if result.is_ok() {
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                    result
                })
            })
            .collect();

        time::sleep(Duration::from_millis(10)).await;

        assert_eq!(completed.load(Ordering::SeqCst), 3);
        assert_eq!(bucket.current_size(), 0);

        bucket.close();

        let mut closed = 0;
        for handle in handles {
            if let Err(ThrottleError::Closed) = handle.await.unwrap() {
                closed += 1;
            }
        }
        assert_eq!(closed, 2);
        assert_eq!(completed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_take_resumes_on_refill() {
        let bucket = TokenBucket::new(1, Duration::from_millis(100)).unwrap();
        bucket.take().await.unwrap();
        let start = Instant::now();

        bucket.take().await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_refill_and_takes() {
        let bucket = TokenBucket::new(2, Duration::from_millis(10)).unwrap();
        bucket.take_n(2).await.unwrap();

        bucket.close();
        bucket.close();
        time::sleep(Duration::from_secs(1)).await;

        assert!(bucket.is_closed());
        assert_eq!(bucket.current_size(), 0);
        assert!(matches!(bucket.take().await, Err(ThrottleError::Closed)));
        assert!(matches!(bucket.take_n(1).await, Err(ThrottleError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_refiller() {
        let bucket = TokenBucket::new(2, Duration::from_millis(10)).unwrap();
        let tokens = Arc::clone(&bucket.tokens);
        assert_eq!(Arc::strong_count(&tokens), 3);

        drop(bucket);
        time::sleep(Duration::from_millis(50)).await;

        assert_eq!(Arc::strong_count(&tokens), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config() {
        let config = BucketConfig {
            capacity: 5,
            requests_per_unit: 15,
            unit: crate::bucket::TimeUnit::Minute,
        };

        let bucket = TokenBucket::from_config(&config).unwrap();

        assert_eq!(bucket.capacity(), 5);
        assert_eq!(bucket.refill_interval(), Duration::from_secs(4));
    }
}
