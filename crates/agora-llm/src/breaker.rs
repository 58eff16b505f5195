//! A small circuit breaker guarding the response cache.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
    /// Set while the half-open trial call has not reported back.
    trial_in_flight: bool,
}

/// Opens after `failure_threshold` consecutive failures and lets a single
/// trial call through once `recovery_timeout` has passed.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Whether a call may go through now. An open breaker moves to
    /// half-open once the recovery timeout has elapsed; while half-open only
    /// one caller is let through until it records its outcome.
    pub fn allow(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    return false;
                }
                inner.trial_in_flight = true;
                true
            }
            BreakerState::Open => {
                let recovered = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.recovery_timeout);
                if recovered {
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!("Circuit breaker half-open, allowing a trial call");
                }
                recovered
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            info!("Circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures += 1;
        inner.trial_in_flight = false;
        let trip = inner.state == BreakerState::HalfOpen || inner.failures >= self.failure_threshold;
        if trip && inner.state != BreakerState::Open {
            warn!(failures = inner.failures, "Circuit breaker opened");
        }
        if trip {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_success_resets_failures() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_trial() {
        let breaker = CircuitBreaker::new(1, Duration::ZERO);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        assert!(breaker.allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        // A failed trial reopens immediately.
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        assert!(breaker.allow());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_admits_one_caller() {
        let breaker = CircuitBreaker::new(1, Duration::ZERO);
        breaker.record_failure();

        assert!(breaker.allow());
        assert!(!breaker.allow());
        assert!(!breaker.allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert!(breaker.allow());
        assert!(breaker.allow());
    }
}
