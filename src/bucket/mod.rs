//! Leaky-bucket token regulation.

mod rate;
mod token_bucket;

pub use rate::{compute_rate, TimeUnit};
pub use token_bucket::TokenBucket;
