//! Per-backend circuit breaker.
//!
//! State machine:
//! - `Closed → Open` after `failure_threshold` consecutive failures
//! - `Open → HalfOpen` once `recovery_timeout` has elapsed since the last
//!   failure
//! - `HalfOpen → Closed` after `success_threshold` consecutive successes
//! - `HalfOpen → Open` on any failure
//!
//! While open and inside the recovery window, `guard` fails fast without
//! invoking the call. Health state is private to one backend and never
//! shared across backends.

use std::sync::Mutex;
use std::time::Instant;

use thiserror::Error;

use crate::config::BreakerConfig;

/// Breaker health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Fail-fast signal: the breaker is open, no call was made.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Circuit breaker is open")]
pub struct CircuitOpen;

struct BreakerHealth {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker guarding one backend.
pub struct CircuitBreaker {
    config: BreakerConfig,
    health: Mutex<BreakerHealth>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            health: Mutex::new(BreakerHealth {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                last_failure: None,
            }),
        }
    }

    /// Run `call` through the breaker.
    ///
    /// Returns `Err(CircuitOpen)` without invoking `call` when the breaker
    /// is open and the recovery timeout has not elapsed. Otherwise invokes
    /// the call and records its result against the breaker's counters.
    pub fn guard<T, E>(
        &self,
        call: impl FnOnce() -> Result<T, E>,
    ) -> Result<Result<T, E>, CircuitOpen> {
        self.check()?;
        let result = call();
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        Ok(result)
    }

    /// Admission check. Transitions `Open → HalfOpen` when the recovery
    /// timeout has elapsed; otherwise fails fast while open.
    pub fn check(&self) -> Result<(), CircuitOpen> {
        let mut health = match self.health.lock() {
            Ok(h) => h,
            Err(_) => return Err(CircuitOpen),
        };

        if health.state == BreakerState::Open {
            let recovered = health
                .last_failure
                .map(|at| at.elapsed() >= self.config.recovery_timeout())
                .unwrap_or(true);
            if !recovered {
                return Err(CircuitOpen);
            }
            health.state = BreakerState::HalfOpen;
            health.half_open_successes = 0;
            tracing::debug!("Breaker half-open, allowing probe call");
        }

        Ok(())
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let Ok(mut health) = self.health.lock() else {
            return;
        };
        match health.state {
            BreakerState::Closed => {
                health.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                health.half_open_successes += 1;
                if health.half_open_successes >= self.config.success_threshold {
                    health.state = BreakerState::Closed;
                    health.consecutive_failures = 0;
                    health.half_open_successes = 0;
                    tracing::info!("Breaker closed after successful probes");
                }
            }
            BreakerState::Open => {
                // No calls are admitted while fully open; nothing to count.
            }
        }
    }

    /// Record a failed (or timed-out) call.
    pub fn record_failure(&self) {
        let Ok(mut health) = self.health.lock() else {
            return;
        };
        health.last_failure = Some(Instant::now());
        match health.state {
            BreakerState::Closed => {
                health.consecutive_failures += 1;
                if health.consecutive_failures >= self.config.failure_threshold {
                    health.state = BreakerState::Open;
                    tracing::warn!(
                        failures = health.consecutive_failures,
                        "Breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                health.state = BreakerState::Open;
                health.half_open_successes = 0;
                tracing::warn!("Probe call failed, breaker re-opened");
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.health
            .lock()
            .map(|h| h.state)
            .unwrap_or(BreakerState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(failure_threshold: u32, recovery_ms: u64, success_threshold: u32) -> BreakerConfig {
        BreakerConfig {
            failure_threshold,
            recovery_timeout_ms: recovery_ms,
            success_threshold,
        }
    }

    fn fail(breaker: &CircuitBreaker) {
        let _ = breaker.guard(|| Err::<(), &str>("down"));
    }

    fn succeed(breaker: &CircuitBreaker) {
        let _ = breaker.guard(|| Ok::<_, &str>(()));
    }

    #[test]
    fn starts_closed() {
        let breaker = CircuitBreaker::new(config(3, 50, 1));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(config(3, 10_000, 1));
        fail(&breaker);
        fail(&breaker);
        assert_eq!(breaker.state(), BreakerState::Closed);
        fail(&breaker);
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn success_resets_failure_streak() {
        let breaker = CircuitBreaker::new(config(3, 10_000, 1));
        fail(&breaker);
        fail(&breaker);
        succeed(&breaker);
        fail(&breaker);
        fail(&breaker);
        // Streak restarted after the success; still closed
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn open_breaker_short_circuits_without_calling() {
        let breaker = CircuitBreaker::new(config(1, 10_000, 1));
        fail(&breaker);
        assert_eq!(breaker.state(), BreakerState::Open);

        let calls = AtomicUsize::new(0);
        let result = breaker.guard(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>(())
        });
        assert_eq!(result, Err(CircuitOpen));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn half_open_after_recovery_timeout() {
        let breaker = CircuitBreaker::new(config(1, 30, 1));
        fail(&breaker);
        assert_eq!(breaker.state(), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(60));
        assert!(breaker.check().is_ok());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new(config(1, 30, 2));
        fail(&breaker);
        std::thread::sleep(Duration::from_millis(60));

        succeed(&breaker);
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        succeed(&breaker);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_reopens_on_any_failure() {
        let breaker = CircuitBreaker::new(config(1, 30, 3));
        fail(&breaker);
        std::thread::sleep(Duration::from_millis(60));

        succeed(&breaker);
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        fail(&breaker);
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn guard_passes_through_call_result() {
        let breaker = CircuitBreaker::new(config(5, 50, 1));
        let ok = breaker.guard(|| Ok::<_, &str>(42));
        assert_eq!(ok, Ok(Ok(42)));
        let err = breaker.guard(|| Err::<i32, _>("boom"));
        assert_eq!(err, Ok(Err("boom")));
    }

    #[test]
    fn concurrent_failures_do_not_corrupt_counts() {
        use std::sync::Arc;

        let breaker = Arc::new(CircuitBreaker::new(config(100, 10_000, 1)));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let b = Arc::clone(&breaker);
            handles.push(std::thread::spawn(move || {
                for _ in 0..20 {
                    let _ = b.guard(|| Err::<(), &str>("down"));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // 80 failures exactly at threshold 100: still closed
        assert_eq!(breaker.state(), BreakerState::Closed);
        for _ in 0..20 {
            fail(&breaker);
        }
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
