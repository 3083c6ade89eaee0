//! Per-channel circuit breaker.
//!
//! All state lives under one mutex so concurrent senders on the same
//! channel observe each transition exactly once. Time comes from
//! `tokio::time::Instant`, which lets tests drive the reset timeout with
//! a paused clock.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected until the reset timeout elapses.
    Open,
    /// One trial request is allowed to probe the channel.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub max_failures: u32,
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Asks permission for one call. Returns `None` when the call must
    /// fail fast. An open circuit whose timeout has elapsed turns half-open
    /// and grants exactly one trial; further callers are refused until the
    /// trial reports back or its permit is dropped.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.lock();
        let granted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    tracing::info!(channel = %self.name, "Circuit half-open, sending trial");
                }
                elapsed
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        };
        granted.then(|| Permit {
            breaker: self,
            settled: false,
        })
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(channel = %self.name, "Circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.max_failures {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        channel = %self.name,
                        failures = inner.failures,
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
                tracing::warn!(channel = %self.name, "Trial failed, circuit reopened");
            }
            CircuitState::Open => {}
        }
    }

    fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Admission for one call. Settle it with [`Permit::success`] or
/// [`Permit::failure`]; a permit dropped unsettled (cancelled, timed out or
/// aborted caller) hands the half-open trial back to the next caller.
#[must_use = "an unsettled permit is released on drop"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Permit<'_> {
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "pager",
            BreakerConfig {
                max_failures: 3,
                reset_timeout: Duration::from_secs(60),
            },
        )
    }

    fn fail(cb: &CircuitBreaker) {
        if let Some(permit) = cb.try_acquire() {
            permit.failure();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_consecutive_failures() {
        let cb = breaker();
        for _ in 0..2 {
            cb.try_acquire().unwrap().failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        // A success resets the count
        cb.try_acquire().unwrap().success();
        assert_eq!(cb.failure_count(), 0);

        for _ in 0..3 {
            cb.try_acquire().unwrap().failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_a_single_trial() {
        let cb = breaker();
        for _ in 0..3 {
            fail(&cb);
        }
        tokio::time::advance(Duration::from_secs(61)).await;

        let trial = cb.try_acquire().unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_none());
        assert!(cb.try_acquire().is_none());

        trial.success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens() {
        let cb = breaker();
        for _ in 0..3 {
            fail(&cb);
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        cb.try_acquire().unwrap().failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_none());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cb.try_acquire().is_none());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cb.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_can_be_retaken() {
        let cb = breaker();
        for _ in 0..3 {
            fail(&cb);
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        let trial = cb.try_acquire().unwrap();
        assert!(cb.try_acquire().is_none());
        drop(trial);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_closed_permit_changes_nothing() {
        let cb = breaker();
        fail(&cb);
        drop(cb.try_acquire());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 1);
    }
}
