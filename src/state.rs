//! Circuit breaker state.

use std::fmt;

/// Circuit breaker phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; calls execute and failures are counted.
    Closed,
    /// Tripped; calls are rejected without execution.
    Open,
    /// Probation; a random minority of calls run as recovery probes.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Mutable breaker state.
///
/// Only ever touched under the breaker's state mutex, which serializes
/// caller turns and timer events into a single logical thread of control.
#[derive(Debug)]
pub(crate) struct BreakerState {
    pub(crate) phase: CircuitState,
    /// Consecutive failures observed while closed. Zeroed by the periodic
    /// failure-interval timer and on every transition into `Open`.
    pub(crate) consecutive_failures: usize,
    /// Consecutive successful probes observed while half-open. Zeroed by the
    /// periodic success-interval timer and on the transition into `Closed`.
    pub(crate) consecutive_successes: usize,
}

impl BreakerState {
    pub(crate) fn new() -> Self {
        Self {
            phase: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }
}
