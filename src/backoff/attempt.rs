//! Retryable and non-retryable operation failures.

use std::fmt;

/// A failed attempt of an operation driven by [`BackoffRunner`](super::BackoffRunner).
///
/// Any error converts into [`Attempt::Retryable`], so `?` inside an operation
/// retries by default. Wrap an error with [`non_retryable`] to stop retrying.
#[derive(Debug)]
pub enum Attempt<E> {
    /// Worth another try after backing off
    Retryable(E),
    /// Retrying will not help, e.g. bad credentials or a malformed request
    NonRetryable(E),
}

impl<E> Attempt<E> {
    /// Mark an error as retryable.
    pub fn retryable(err: E) -> Self {
        Attempt::Retryable(err)
    }

    /// Mark an error as not worth retrying.
    pub fn non_retryable(err: E) -> Self {
        Attempt::NonRetryable(err)
    }

    /// Whether the runner should try again after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Attempt::Retryable(_))
    }

    /// Unwrap the underlying error.
    pub fn into_inner(self) -> E {
        match self {
            Attempt::Retryable(err) | Attempt::NonRetryable(err) => err,
        }
    }
}

impl<E> From<E> for Attempt<E> {
    fn from(err: E) -> Self {
        Attempt::Retryable(err)
    }
}

impl<E: fmt::Display> fmt::Display for Attempt<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attempt::Retryable(err) => write!(f, "{}", err),
            Attempt::NonRetryable(err) => write!(f, "non-retryable: {}", err),
        }
    }
}

/// Wrap `err` so the backoff runner gives up immediately.
pub fn non_retryable<E>(err: E) -> Attempt<E> {
    Attempt::NonRetryable(err)
}
