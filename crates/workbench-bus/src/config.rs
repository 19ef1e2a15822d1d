//! # Bus Configuration
//!
//! Retry, backoff and log-retention settings. All limits have sane defaults
//! with environment overrides.

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_LOG_CAPACITY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DISPATCH_DEPTH,
};

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("log_capacity must be at least 1")]
    ZeroLogCapacity,

    #[error("max_dispatch_depth must be at least 1")]
    ZeroDispatchDepth,

    #[error("backoff_max ({max:?}) is smaller than backoff_base ({base:?})")]
    BackoffInverted { base: Duration, max: Duration },

    #[error("{var} = {value:?} is not a valid number")]
    InvalidNumber { var: &'static str, value: String },
}

/// Bus configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Delivery attempts before a message is dead-lettered.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub backoff_base: Duration,
    /// Upper bound on any single backoff delay.
    pub backoff_max: Duration,
    /// Entries kept in the observability log.
    pub log_capacity: usize,
    /// Nested deliveries allowed on one thread before a pass is deferred.
    pub max_dispatch_depth: u32,
    /// Prefix for the bus metrics.
    pub metrics_namespace: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            log_capacity: DEFAULT_LOG_CAPACITY,
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
            metrics_namespace: "workbench".to_string(),
        }
    }
}

impl BusConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `WB_BUS_MAX_ATTEMPTS` (default: 3)
    /// - `WB_BUS_BACKOFF_BASE_MS` (default: 100)
    /// - `WB_BUS_BACKOFF_MAX_MS` (default: 2000)
    /// - `WB_BUS_LOG_CAPACITY` (default: 100)
    /// - `WB_BUS_MAX_DEPTH` (default: 16)
    /// - `WB_METRICS_NAMESPACE` (default: workbench)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            max_attempts: read_number("WB_BUS_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            backoff_base: read_number("WB_BUS_BACKOFF_BASE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
            backoff_max: read_number("WB_BUS_BACKOFF_MAX_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_max),
            log_capacity: read_number("WB_BUS_LOG_CAPACITY")?.unwrap_or(defaults.log_capacity),
            max_dispatch_depth: read_number("WB_BUS_MAX_DEPTH")?
                .unwrap_or(defaults.max_dispatch_depth),
            metrics_namespace: env::var("WB_METRICS_NAMESPACE")
                .unwrap_or(defaults.metrics_namespace),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the limits are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::ZeroLogCapacity);
        }
        if self.max_dispatch_depth == 0 {
            return Err(ConfigError::ZeroDispatchDepth);
        }
        if self.backoff_max < self.backoff_base {
            return Err(ConfigError::BackoffInverted {
                base: self.backoff_base,
                max: self.backoff_max,
            });
        }
        Ok(())
    }
}

fn read_number<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(None),
    }
}
