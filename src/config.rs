//! Configuration for the throttling primitives.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::backoff::DEFAULT_MAX_WAIT;
use crate::bucket::{compute_rate, TimeUnit};
use crate::error::{Result, ThrottleError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Token bucket configuration
    #[serde(default)]
    pub bucket: BucketConfig,

    /// Backoff runner configuration
    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Token bucket configuration.
///
/// The refill interval is derived from the quota, so `requests_per_unit: 15`
/// with `unit: minute` refills one token every 4 seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Burst size
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Sustained number of requests allowed per unit of time
    #[serde(default = "default_requests_per_unit")]
    pub requests_per_unit: u32,

    /// The time unit
    #[serde(default = "default_unit")]
    pub unit: TimeUnit,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            requests_per_unit: default_requests_per_unit(),
            unit: default_unit(),
        }
    }
}

fn default_capacity() -> usize {
    5
}

fn default_requests_per_unit() -> u32 {
    15
}

fn default_unit() -> TimeUnit {
    TimeUnit::Minute
}

impl BucketConfig {
    /// Reject configurations no bucket can be built from.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ThrottleError::Config(
                "bucket.capacity must be greater than zero".to_string(),
            ));
        }
        if self.requests_per_unit == 0 {
            return Err(ThrottleError::Config(
                "bucket.requests_per_unit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Refill interval sustaining the configured quota.
    ///
    /// Call [`validate`](Self::validate) first; a zero quota panics.
    pub fn refill_interval(&self) -> Duration {
        compute_rate(self.requests_per_unit, self.unit.duration())
    }
}

/// Backoff runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Maximum accumulated backoff sleep in milliseconds
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Fixed jitter seed, for reproducible retry timing
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: default_max_wait_ms(),
            seed: None,
        }
    }
}

fn default_max_wait_ms() -> u64 {
    DEFAULT_MAX_WAIT.as_millis() as u64
}

impl BackoffConfig {
    /// Get the maximum wait as a duration.
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl ThrottleConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading throttle configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ThrottleConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ThrottleError::Config(format!("Failed to parse throttle config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.bucket.validate()
    }
}
