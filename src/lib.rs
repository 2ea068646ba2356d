//! A circuit-breaker primitive for async Rust.
//!
//! A [`CircuitBreaker`] is a guarded call gate: callers route operations
//! through [`CircuitBreaker::perform`], and the breaker decides per call
//! whether the operation runs at all. Consecutive failures trip the circuit
//! open, open circuits reject calls without running them, and after a
//! cooldown the breaker probes a random minority of calls to detect
//! recovery.
//!
//! # States
//!
//! - **Closed**: normal operation; calls execute and failures count toward
//!   tripping the breaker
//! - **Open**: tripped; calls are rejected without execution until the
//!   cooldown elapses
//! - **HalfOpen**: probation; each call has a 1-in-3 chance of being
//!   admitted as a recovery probe
//!
//! # Example
//!
//! ```no_run
//! use tripswitch::{BreakerConfig, CircuitBreaker};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BreakerConfig::default()
//!     .with_failure_threshold(5)
//!     .with_open_timeout(Duration::from_secs(30));
//!
//! let breaker = CircuitBreaker::new("upstream_api", config)?;
//!
//! match breaker.perform(|| async { Ok::<_, std::io::Error>(42) }).await {
//!     Ok(value) => println!("success: {value}"),
//!     Err(e) => eprintln!("error: {e}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! All callers sharing a breaker (handles are cheap clones) are serialized:
//! state check, operation execution, and state update form one atomic turn
//! per call. A slow operation therefore stalls every other caller and every
//! timer-driven transition for its duration — this is the primary latency
//! risk of the design, and callers wanting a deadline must wrap their
//! operation in their own timeout.

pub mod breaker;
pub mod config;
pub mod error;
pub mod state;

pub use breaker::{BreakerStats, CircuitBreaker};
pub use config::{BreakerConfig, ConfigError};
pub use error::BreakerError;
pub use state::CircuitState;
