//! The circuit breaker call gate.
//!
//! One [`CircuitBreaker`] guards one downstream dependency. Handles are
//! cheap clones of a shared inner, so any number of concurrent callers can
//! route operations through the same breaker; the breaker serializes their
//! turns (see [`CircuitBreaker::perform`]).

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{BreakerConfig, ConfigError};
use crate::error::BreakerError;
use crate::state::{BreakerState, CircuitState};

/// Lifetime counters, kept out of the serialized state so reads never
/// contend with in-flight calls.
#[derive(Debug, Default)]
struct BreakerCounters {
    successes: AtomicU64,
    failures: AtomicU64,
    opened: AtomicU64,
    closed: AtomicU64,
    rejected: AtomicU64,
}

/// Snapshot of a breaker's lifetime counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStats {
    /// Guarded operations that ran and returned Ok.
    pub successes: u64,
    /// Guarded operations that ran and returned Err.
    pub failures: u64,
    /// Transitions into the open phase.
    pub opened: u64,
    /// Transitions from half-open back to closed.
    pub closed: u64,
    /// Calls rejected without running the operation.
    pub rejected: u64,
}

#[derive(Debug)]
struct Inner {
    name: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
    counters: BreakerCounters,
}

/// A named, shareable circuit breaker.
///
/// Starts closed with zero counters. Construction spawns two recurring
/// counter-reset timers that live as long as any handle does; both run
/// regardless of the current phase, so a counter can be zeroed even while
/// it is irrelevant to the active phase. That is deliberate: changing it
/// would alter observable timing for breakers that cycle phases faster
/// than the reset interval.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

impl CircuitBreaker {
    /// Creates a breaker named `name` and starts its counter-reset timers.
    ///
    /// Must be called from within a tokio runtime. Malformed configuration
    /// (zero thresholds or zero durations) is rejected here rather than
    /// surfacing as undefined behavior later.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let name = name.into();
        info!(breaker = %name, ?config, "creating circuit breaker");

        let inner = Arc::new(Inner {
            name,
            state: Mutex::new(BreakerState::new()),
            counters: BreakerCounters::default(),
            config,
        });

        spawn_counter_reset(
            Arc::downgrade(&inner),
            inner.config.failure_interval,
            |state| state.consecutive_failures = 0,
        );
        spawn_counter_reset(
            Arc::downgrade(&inner),
            inner.config.success_interval,
            |state| state.consecutive_successes = 0,
        );

        Ok(Self { inner })
    }

    /// The breaker's stable identifier.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The configuration the breaker was constructed with.
    pub fn config(&self) -> &BreakerConfig {
        &self.inner.config
    }

    /// Current phase.
    pub async fn state(&self) -> CircuitState {
        self.inner.state.lock().await.phase
    }

    /// Snapshot of the lifetime counters.
    pub fn stats(&self) -> BreakerStats {
        let c = &self.inner.counters;
        BreakerStats {
            successes: c.successes.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            opened: c.opened.load(Ordering::Relaxed),
            closed: c.closed.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
        }
    }

    /// Routes one guarded operation through the breaker.
    ///
    /// The state check, the operation's execution, and the state update form
    /// a single serialized turn: the state mutex is held across all three,
    /// so concurrent callers are processed strictly one at a time and timer
    /// events queue behind an in-flight call. A slow operation stalls the
    /// whole breaker for its duration; the breaker imposes no deadline of
    /// its own, so wrap the operation in a caller-side timeout if one is
    /// needed.
    ///
    /// Dispatch by phase:
    ///
    /// - **Closed**: the operation runs. Ok passes through untouched. Err is
    ///   propagated verbatim; the failure that crosses
    ///   [`failure_threshold`](BreakerConfig::failure_threshold) opens the
    ///   circuit on that same call (the caller still sees the real error,
    ///   not a rejection).
    /// - **Open**: the operation does not run;
    ///   [`BreakerError::Tripped`] is returned immediately.
    /// - **HalfOpen**: each call independently has a 1-in-3 chance of being
    ///   admitted as a probe. Rejected calls get
    ///   [`BreakerError::HalfOpenBusy`]. An admitted probe's Ok counts
    ///   toward [`success_threshold`](BreakerConfig::success_threshold)
    ///   (crossing it closes the circuit); an admitted probe's Err re-opens
    ///   the circuit and re-arms the cooldown.
    pub async fn perform<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut state = self.inner.state.lock().await;

        match state.phase {
            CircuitState::Closed => match operation().await {
                Ok(value) => {
                    self.inner.counters.successes.fetch_add(1, Ordering::Relaxed);
                    Ok(value)
                }
                Err(err) => {
                    self.inner.counters.failures.fetch_add(1, Ordering::Relaxed);
                    if state.consecutive_failures + 1 >= self.inner.config.failure_threshold {
                        self.trip_open(&mut state);
                    } else {
                        state.consecutive_failures += 1;
                    }
                    Err(BreakerError::Upstream(err))
                }
            },
            CircuitState::Open => {
                self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(breaker = %self.inner.name, "rejecting call: circuit open");
                Err(BreakerError::Tripped {
                    name: self.inner.name.clone(),
                })
            }
            CircuitState::HalfOpen => {
                if !admit_probe() {
                    self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    debug!(breaker = %self.inner.name, "rejecting call: probe not admitted");
                    return Err(BreakerError::HalfOpenBusy {
                        name: self.inner.name.clone(),
                    });
                }
                match operation().await {
                    Ok(value) => {
                        self.inner.counters.successes.fetch_add(1, Ordering::Relaxed);
                        if state.consecutive_successes + 1 >= self.inner.config.success_threshold {
                            state.phase = CircuitState::Closed;
                            state.consecutive_successes = 0;
                            self.inner.counters.closed.fetch_add(1, Ordering::Relaxed);
                            info!(breaker = %self.inner.name, "circuit closed after successful probes");
                        } else {
                            state.consecutive_successes += 1;
                        }
                        Ok(value)
                    }
                    Err(err) => {
                        self.inner.counters.failures.fetch_add(1, Ordering::Relaxed);
                        self.trip_open(&mut state);
                        Err(BreakerError::Upstream(err))
                    }
                }
            }
        }
    }

    /// Forces the breaker back to closed with zeroed counters.
    pub async fn reset(&self) {
        let mut state = self.inner.state.lock().await;
        info!(breaker = %self.inner.name, "manually resetting circuit breaker");
        state.phase = CircuitState::Closed;
        state.consecutive_failures = 0;
        state.consecutive_successes = 0;
    }

    /// Moves to `Open`, zeroes the failure counter, and arms the one-shot
    /// cooldown. Called with the state mutex held.
    fn trip_open(&self, state: &mut BreakerState) {
        state.phase = CircuitState::Open;
        state.consecutive_failures = 0;
        self.inner.counters.opened.fetch_add(1, Ordering::Relaxed);
        warn!(
            breaker = %self.inner.name,
            cooldown = ?self.inner.config.open_timeout,
            "circuit opened"
        );

        // One one-shot per entry into Open. Rapid open/half-open cycling can
        // leave several in flight; a stale shot firing while the phase is no
        // longer Open does nothing.
        let weak = Arc::downgrade(&self.inner);
        let deadline = Instant::now() + self.inner.config.open_timeout;
        tokio::spawn(async move {
            time::sleep_until(deadline).await;
            let Some(inner) = weak.upgrade() else { return };
            let mut state = inner.state.lock().await;
            if state.phase == CircuitState::Open {
                state.phase = CircuitState::HalfOpen;
                info!(breaker = %inner.name, "circuit half-open: admitting probes");
            }
        });
    }
}

/// Bernoulli(1/3) draw for half-open admission.
///
/// Each call is admitted independently at random rather than letting the
/// first caller through, which spreads probe load across many concurrent
/// callers while still throttling a recovering dependency.
fn admit_probe() -> bool {
    rand::thread_rng().gen_range(0..3) == 0
}

/// Recurring counter reset, running for the breaker's lifetime regardless
/// of phase. Holds only a weak reference so dropping the last handle stops
/// the timer.
fn spawn_counter_reset<F>(inner: Weak<Inner>, period: Duration, reset: F)
where
    F: Fn(&mut BreakerState) + Send + Sync + 'static,
{
    let start = Instant::now() + period;
    tokio::spawn(async move {
        let mut ticker = time::interval_at(start, period);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else { break };
            reset(&mut *inner.state.lock().await);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio_test::assert_ok;

    fn counting_op(
        calls: &Arc<AtomicUsize>,
        result: Result<u32, &'static str>,
    ) -> impl Future<Output = Result<u32, &'static str>> {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            result
        }
    }

    #[tokio::test]
    async fn starts_closed_with_zero_counters() {
        let breaker = CircuitBreaker::new("test", BreakerConfig::default()).unwrap();
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert_eq!(breaker.stats().successes, 0);
        assert_eq!(breaker.stats().failures, 0);
    }

    #[tokio::test]
    async fn invalid_config_fails_construction() {
        let config = BreakerConfig::default().with_failure_threshold(0);
        assert!(CircuitBreaker::new("test", config).is_err());
    }

    #[tokio::test]
    async fn ok_results_pass_through_unchanged() {
        let breaker = CircuitBreaker::new("test", BreakerConfig::default()).unwrap();
        for _ in 0..10 {
            let value = assert_ok!(breaker.perform(|| async { Ok::<_, ()>(42) }).await);
            assert_eq!(value, 42);
            assert_eq!(breaker.state().await, CircuitState::Closed);
        }
        assert_eq!(breaker.stats().successes, 10);
    }

    #[tokio::test]
    async fn failures_below_threshold_keep_circuit_closed() {
        let config = BreakerConfig::default().with_failure_threshold(5);
        let breaker = CircuitBreaker::new("test", config).unwrap();

        for _ in 0..4 {
            let err = breaker
                .perform(|| async { Err::<u32, _>("boom") })
                .await
                .unwrap_err();
            assert!(matches!(err, BreakerError::Upstream("boom")));
            assert_eq!(breaker.state().await, CircuitState::Closed);
        }
    }

    #[tokio::test]
    async fn threshold_crossing_failure_opens_on_that_same_call() {
        let config = BreakerConfig::default().with_failure_threshold(3);
        let breaker = CircuitBreaker::new("test", config).unwrap();

        for _ in 0..2 {
            let _ = breaker.perform(|| async { Err::<u32, _>("boom") }).await;
        }
        assert_eq!(breaker.state().await, CircuitState::Closed);

        // The tripping call still surfaces the real upstream error.
        let err = breaker
            .perform(|| async { Err::<u32, _>("boom") })
            .await
            .unwrap_err();
        assert!(matches!(err, BreakerError::Upstream("boom")));
        assert_eq!(breaker.state().await, CircuitState::Open);
        assert_eq!(breaker.stats().opened, 1);
    }

    #[tokio::test]
    async fn success_does_not_reset_the_failure_count() {
        let config = BreakerConfig::default().with_failure_threshold(3);
        let breaker = CircuitBreaker::new("test", config).unwrap();

        let _ = breaker.perform(|| async { Err::<u32, _>("boom") }).await;
        let _ = breaker.perform(|| async { Err::<u32, _>("boom") }).await;
        assert_ok!(breaker.perform(|| async { Ok::<_, &str>(1) }).await);

        // Two failures already counted; an interleaved success changes
        // nothing, so this third failure trips the circuit.
        let _ = breaker.perform(|| async { Err::<u32, _>("boom") }).await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_invoking_the_operation() {
        let config = BreakerConfig::default().with_failure_threshold(1);
        let breaker = CircuitBreaker::new("test", config).unwrap();
        let _ = breaker.perform(|| async { Err::<u32, _>("boom") }).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let err = breaker
                .perform(|| counting_op(&calls, Ok(42)))
                .await
                .unwrap_err();
            assert!(matches!(err, BreakerError::Tripped { .. }));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().rejected, 5);
    }

    #[tokio::test]
    async fn cloned_handles_share_one_breaker() {
        let config = BreakerConfig::default().with_failure_threshold(2);
        let breaker = CircuitBreaker::new("shared", config).unwrap();
        let other = breaker.clone();

        let _ = breaker.perform(|| async { Err::<u32, _>("boom") }).await;
        let _ = other.perform(|| async { Err::<u32, _>("boom") }).await;

        assert_eq!(breaker.state().await, CircuitState::Open);
        assert_eq!(other.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn manual_reset_returns_to_closed() {
        let config = BreakerConfig::default().with_failure_threshold(1);
        let breaker = CircuitBreaker::new("test", config).unwrap();
        let _ = breaker.perform(|| async { Err::<u32, _>("boom") }).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        breaker.reset().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert_ok!(breaker.perform(|| async { Ok::<_, &str>(7) }).await);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_cooldown_shot_is_a_noop_once_closed() {
        let config = BreakerConfig::default()
            .with_failure_threshold(1)
            .with_open_timeout(Duration::from_secs(15));
        let breaker = CircuitBreaker::new("test", config).unwrap();

        let _ = breaker.perform(|| async { Err::<u32, _>("boom") }).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        // Reset before the cooldown fires; the in-flight one-shot must not
        // drag a closed circuit into half-open.
        breaker.reset().await;
        time::advance(Duration::from_secs(16)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }
}
