//! Per-host circuit breaker guarding the `static_http` fetcher against
//! hammering a host that is already failing. Not part of the routing
//! decision itself (that's the Routing Engine's job) — this sits in front
//! of the actual network call and turns "host is down" into a fast
//! `FETCHER_INTERNAL` instead of N more timeouts.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Minimum number of requests observed before the failure rate is
    /// evaluated at all (avoids tripping on one unlucky request).
    pub min_requests: u64,
    /// Failure percentage (0-100) at or above which the breaker opens.
    pub failure_threshold_pct: u8,
    /// How long the breaker stays open before allowing a half-open probe.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            min_requests: 10,
            failure_threshold_pct: 50,
            open_timeout: Duration::from_secs(30),
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
struct Inner {
    failure_count: u64,
    success_count: u64,
    opened_at: Option<Instant>,
    half_open_probe_in_flight: bool,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            failure_count: 0,
            success_count: 0,
            opened_at: None,
            half_open_probe_in_flight: false,
        }
    }
}

/// A single-host circuit breaker. One instance per `effective_host`, owned
/// by whatever keeps the per-host connection pool (see
/// [`crate::static_http::StaticHttpFetcher`]).
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Called before issuing a request. Returns `false` if the request
    /// should be rejected outright (circuit open and not yet eligible for a
    /// half-open probe).
    pub fn allow_request(&self) -> bool {
        let mut guard = self.inner.lock().unwrap();
        match guard.opened_at {
            None => true,
            Some(opened_at) => {
                if opened_at.elapsed() >= self.config.open_timeout {
                    if guard.half_open_probe_in_flight {
                        false
                    } else {
                        guard.half_open_probe_in_flight = true;
                        true
                    }
                } else {
                    false
                }
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        let guard = self.inner.lock().unwrap();
        match guard.opened_at {
            None => CircuitState::Closed,
            Some(opened_at) => {
                if opened_at.elapsed() >= self.config.open_timeout {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut guard = self.inner.lock().unwrap();
        if guard.opened_at.is_some() {
            tracing::info!("circuit breaker closing after successful half-open probe");
        }
        guard.failure_count = 0;
        guard.success_count = guard.success_count.saturating_add(1);
        guard.opened_at = None;
        guard.half_open_probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.half_open_probe_in_flight = false;
        if guard.opened_at.is_some() {
            // Half-open probe failed: re-open immediately.
            guard.opened_at = Some(Instant::now());
            return;
        }

        guard.failure_count = guard.failure_count.saturating_add(1);
        let total = guard.failure_count + guard.success_count;
        if total >= self.config.min_requests {
            let failure_rate = (guard.failure_count as f64 / total as f64) * 100.0;
            if failure_rate >= self.config.failure_threshold_pct as f64 {
                warn!(failure_rate, threshold = self.config.failure_threshold_pct, "circuit breaker opened");
                guard.opened_at = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_closed_below_min_requests() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            min_requests: 10,
            failure_threshold_pct: 50,
            open_timeout: Duration::from_millis(50),
        });
        for _ in 0..5 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn opens_once_threshold_and_min_requests_met() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            min_requests: 4,
            failure_threshold_pct: 50,
            open_timeout: Duration::from_millis(50),
        });
        cb.record_success();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn transitions_to_half_open_after_timeout_then_closes_on_success() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            min_requests: 2,
            failure_threshold_pct: 50,
            open_timeout: Duration::from_millis(10),
        });
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.allow_request());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
