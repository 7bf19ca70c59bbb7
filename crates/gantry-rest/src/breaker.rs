use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{RestError, RestResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in `Closed` before the circuit opens.
    pub failure_threshold: u32,
    /// Consecutive successes in `HalfOpen` before the circuit closes.
    pub success_threshold: u32,
    /// Concurrent probes admitted while `HalfOpen`.
    pub max_half_open: u32,
    /// Open interval before probing resumes.
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            max_half_open: 1,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    half_open_inflight: u32,
    opened_at: Option<Instant>,
}

/// Three-state circuit breaker. All state lives behind one mutex; both
/// `can_execute` and `record` take it for the whole transition.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                half_open_inflight: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Admission check. `Open` rejects until the open interval elapses, then
    /// flips to `HalfOpen` and admits the caller as the first probe.
    pub fn can_execute(&self) -> RestResult<()> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed < self.config.timeout {
                    return Err(RestError::CircuitOpen);
                }
                tracing::debug!("circuit breaker half-open");
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes = 0;
                inner.half_open_inflight = 1;
                Ok(())
            }
            CircuitState::HalfOpen => {
                if inner.half_open_inflight >= self.config.max_half_open {
                    return Err(RestError::CircuitOpen);
                }
                inner.half_open_inflight += 1;
                Ok(())
            }
        }
    }

    /// Report the outcome of an admitted call.
    pub fn record(&self, success: bool) {
        let mut inner = self.lock();
        match (inner.state, success) {
            (CircuitState::Closed, true) => {
                inner.consecutive_failures = 0;
            }
            (CircuitState::Closed, false) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    tracing::debug!(
                        failures = inner.consecutive_failures,
                        "circuit breaker open"
                    );
                    Self::trip(&mut inner);
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    tracing::debug!("circuit breaker closed");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.half_open_inflight = 0;
                    inner.opened_at = None;
                } else {
                    inner.half_open_inflight = inner.half_open_inflight.saturating_sub(1);
                }
            }
            (CircuitState::HalfOpen, false) => {
                tracing::debug!("circuit breaker re-open after failed probe");
                Self::trip(&mut inner);
            }
            // A call admitted before the circuit re-opened may report late.
            (CircuitState::Open, _) => {}
        }
    }

    fn trip(inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.half_open_inflight = 0;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            max_half_open: 1,
            timeout,
        })
    }

    #[test]
    fn opens_after_failure_threshold() {
        let cb = breaker(Duration::from_secs(30));
        for _ in 0..3 {
            cb.can_execute().unwrap();
            cb.record(false);
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(cb.can_execute(), Err(RestError::CircuitOpen)));
    }

    #[test]
    fn success_resets_failure_count_while_closed() {
        let cb = breaker(Duration::from_secs(30));
        cb.record(false);
        cb.record(false);
        cb.record(true);
        cb.record(false);
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_then_close() {
        let cb = breaker(Duration::from_millis(40));
        for _ in 0..3 {
            cb.record(false);
        }
        assert!(matches!(cb.can_execute(), Err(RestError::CircuitOpen)));

        std::thread::sleep(Duration::from_millis(60));
        cb.can_execute().unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // Only one probe admitted.
        assert!(matches!(cb.can_execute(), Err(RestError::CircuitOpen)));

        cb.record(true);
        cb.can_execute().unwrap();
        cb.record(true);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = breaker(Duration::from_millis(20));
        for _ in 0..3 {
            cb.record(false);
        }
        std::thread::sleep(Duration::from_millis(40));
        cb.can_execute().unwrap();
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(cb.can_execute(), Err(RestError::CircuitOpen)));
    }
}
