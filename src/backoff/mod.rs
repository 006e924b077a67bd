//! Exponential backoff with jitter.

mod attempt;
mod runner;

pub use attempt::{non_retryable, Attempt};
pub use runner::{BackoffRunner, DEFAULT_MAX_WAIT};
