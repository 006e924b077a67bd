//! Refill rate helpers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Time unit a call quota is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Per-second quota
    Second,
    /// Per-minute quota
    Minute,
    /// Per-hour quota
    Hour,
    /// Per-day quota
    Day,
}

impl TimeUnit {
    /// Get the duration of this time unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// Compute the refill interval that sustains `calls` operations per `window`.
///
/// A quota of 15 calls a minute yields one token every 4 seconds.
///
/// # Panics
///
/// Panics if `calls` is zero. Callers validate the quota first.
pub fn compute_rate(calls: u32, window: Duration) -> Duration {
    window / calls
}
