//! Errors surfaced by [`crate::CircuitBreaker::perform`].

use thiserror::Error;

/// Outcome of a rejected or failed guarded call.
///
/// Generic over the upstream error type so the guarded operation's own
/// failure is propagated verbatim, programmatically distinguishable from the
/// breaker's two rejection signals.
#[derive(Debug, Clone, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was not attempted.
    #[error("circuit breaker '{name}' is open")]
    Tripped { name: String },

    /// The circuit is half-open and this call was not admitted as a probe.
    #[error("circuit breaker '{name}' is half-open, probe not admitted")]
    HalfOpenBusy { name: String },

    /// The guarded operation itself failed.
    #[error("operation failed: {0}")]
    Upstream(E),
}

impl<E> BreakerError<E> {
    /// True when the breaker rejected the call without running the operation.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BreakerError::Tripped { .. } | BreakerError::HalfOpenBusy { .. }
        )
    }

    /// Unwraps the upstream error, if the operation actually ran and failed.
    pub fn into_upstream(self) -> Option<E> {
        match self {
            BreakerError::Upstream(e) => Some(e),
            _ => None,
        }
    }
}
