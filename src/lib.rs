//! Throttle - client-side rate limiting primitives
//!
//! This crate provides two independent tools for calling rate-limited remote
//! APIs from a single process:
//!
//! - [`TokenBucket`], a leaky-bucket regulator that allows a burst of
//!   `capacity` calls and then one call per refill interval.
//! - [`BackoffRunner`], which retries a fallible operation with randomized
//!   exponential backoff until it succeeds, fails with a
//!   [non-retryable](non_retryable) error, or runs out of wait budget.
//!
//! ```no_run
//! use std::time::Duration;
//! use throttle::{compute_rate, non_retryable, BackoffRunner, TokenBucket};
//!
//! # async fn call_api() -> Result<u16, std::io::Error> { Ok(200) }
//! # async fn example() -> throttle::Result<()> {
//! // Bursts of 5, then 15 calls a minute.
//! let bucket = TokenBucket::new(5, compute_rate(15, Duration::from_secs(60)))?;
//! let mut runner = BackoffRunner::new();
//! let bucket = &bucket;
//!
//! let status = runner
//!     .run(|| async move {
//!         if bucket.take().await.is_err() {
//!             return Err(non_retryable(std::io::Error::other("bucket closed")));
//!         }
//!         match call_api().await? {
//!             401 => Err(non_retryable(std::io::Error::other("unauthorized"))),
//!             status => Ok(status),
//!         }
//!     })
//!     .await?;
//! # let _: u16 = status;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod bucket;
pub mod config;
pub mod error;

pub use backoff::{non_retryable, Attempt, BackoffRunner, DEFAULT_MAX_WAIT};
pub use bucket::{compute_rate, TimeUnit, TokenBucket};
pub use config::{BackoffConfig, BucketConfig, ThrottleConfig};
pub use error::{BoxError, Result, ThrottleError};
