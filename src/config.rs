//! Circuit breaker configuration.

use std::time::Duration;

use thiserror::Error;

/// Configuration for a circuit breaker.
///
/// Immutable once the breaker is constructed. All fields have defaults;
/// override individual fields with the `with_*` builders.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures while closed before the circuit opens.
    pub failure_threshold: usize,
    /// Period of the recurring timer that zeroes the failure counter.
    pub failure_interval: Duration,
    /// Consecutive successful probes while half-open before the circuit closes.
    pub success_threshold: usize,
    /// Period of the recurring timer that zeroes the success counter.
    pub success_interval: Duration,
    /// Cooldown after the circuit opens before it becomes half-open.
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 20,
            failure_interval: Duration::from_secs(60),
            success_threshold: 20,
            success_interval: Duration::from_secs(60),
            open_timeout: Duration::from_secs(15),
        }
    }
}

impl BreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_failure_interval(mut self, interval: Duration) -> Self {
        self.failure_interval = interval;
        self
    }

    pub fn with_success_threshold(mut self, threshold: usize) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_success_interval(mut self, interval: Duration) -> Self {
        self.success_interval = interval;
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Rejects configurations that would produce undefined runtime behavior.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroThreshold("failure_threshold"));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::ZeroThreshold("success_threshold"));
        }
        if self.failure_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("failure_interval"));
        }
        if self.success_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("success_interval"));
        }
        if self.open_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("open_timeout"));
        }
        Ok(())
    }
}

/// Construction-time configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    ZeroThreshold(&'static str),

    #[error("{0} must be a non-zero duration")]
    ZeroDuration(&'static str),
}
