//! Error types for the throttling primitives.

use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by a caller-supplied operation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for throttle operations.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// More tokens were requested than the bucket can ever hold
    #[error("requested {requested} tokens but bucket capacity is {capacity}")]
    InvalidRequest { requested: usize, capacity: usize },

    /// The bucket was closed and grants no more tokens
    #[error("token bucket is closed")]
    Closed,

    /// The operation marked its error as not worth retrying
    #[error("hit non-retryable error: {0}")]
    NonRetryable(#[source] BoxError),

    /// The accumulated backoff wait reached the configured maximum
    #[error("max wait of {max_wait:?} exceeded after {attempts} attempts")]
    Exhausted {
        max_wait: Duration,
        attempts: u32,
        #[source]
        last_error: Option<BoxError>,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ThrottleError {
    /// Whether this error means the backoff budget ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ThrottleError::Exhausted { .. })
    }

    /// Whether this error came from an operation marked non-retryable.
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, ThrottleError::NonRetryable(_))
    }
}

/// Result type alias for throttle operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;
