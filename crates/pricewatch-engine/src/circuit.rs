//! Process-wide breaker that pauses all fetching when blocking is systemic.
//!
//! State lives in atomics only. The open deadline doubles as the state flag
//! (`0` = closed), so the closed-to-open transition is a single
//! compare-and-set and the cool-down starts exactly once however many
//! workers cross the threshold together.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    Closed,
    Open,
}

/// Point-in-time view for the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub trips: u64,
    /// Seconds until the breaker closes, when open.
    pub resumes_in_secs: Option<u64>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failures: AtomicU32,
    /// Millis since `epoch` at which the breaker closes; `0` while closed.
    open_until_ms: AtomicU64,
    trips: AtomicU64,
    threshold: u32,
    cooldown: Duration,
    epoch: Instant,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            open_until_ms: AtomicU64::new(0),
            trips: AtomicU64::new(0),
            threshold: threshold.max(1),
            cooldown,
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// `true` while cooling down. Closes the breaker (and resets the failure
    /// count) once the deadline has passed.
    pub fn is_open(&self) -> bool {
        let deadline = self.open_until_ms.load(Ordering::Acquire);
        if deadline == 0 {
            return false;
        }
        if self.now_ms() < deadline {
            return true;
        }
        if self
            .open_until_ms
            .compare_exchange(deadline, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.failures.store(0, Ordering::Release);
            tracing::info!("circuit breaker closed, resuming fetches");
        }
        false
    }

    /// Time left in the cool-down, or `None` when closed.
    pub fn remaining(&self) -> Option<Duration> {
        if !self.is_open() {
            return None;
        }
        let deadline = self.open_until_ms.load(Ordering::Acquire);
        Some(Duration::from_millis(deadline.saturating_sub(self.now_ms())))
    }

    /// Counts `items` failed items; trips the breaker at the threshold.
    /// Returns `true` if this call opened it.
    pub fn record_failures(&self, items: u32) -> bool {
        if items == 0 {
            return false;
        }
        let count = self
            .failures
            .fetch_add(items, Ordering::AcqRel)
            .saturating_add(items);
        if count < self.threshold {
            return false;
        }

        let cooldown_ms = u64::try_from(self.cooldown.as_millis()).unwrap_or(u64::MAX);
        let deadline = self.now_ms().saturating_add(cooldown_ms).max(1);
        let opened = self
            .open_until_ms
            .compare_exchange(0, deadline, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if opened {
            let trips = self.trips.fetch_add(1, Ordering::AcqRel) + 1;
            tracing::error!(
                consecutive_failures = count,
                threshold = self.threshold,
                cooldown_secs = self.cooldown.as_secs(),
                trips,
                "systemic blocking detected, circuit breaker opened"
            );
        }
        opened
    }

    pub fn record_failure(&self) -> bool {
        self.record_failures(1)
    }

    /// A successful item resets the consecutive-failure count.
    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    pub fn trips(&self) -> u64 {
        self.trips.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let remaining = self.remaining();
        CircuitSnapshot {
            state: if remaining.is_some() {
                CircuitState::Open
            } else {
                CircuitState::Closed
            },
            consecutive_failures: self.consecutive_failures(),
            trips: self.trips(),
            resumes_in_secs: remaining.map(|d| d.as_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn opens_exactly_at_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(1200));
        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        assert!(!breaker.is_open());
        assert!(breaker.record_failure());
        assert!(breaker.is_open());
        assert_eq!(breaker.trips(), 1);
        assert_eq!(breaker.snapshot().state, CircuitState::Open);
    }

    #[test]
    fn success_resets_the_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(1200));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[test]
    fn further_failures_while_open_do_not_restart_the_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(1200));
        assert!(breaker.record_failure());
        assert!(!breaker.record_failure());
        assert!(!breaker.record_failures(5));
        assert_eq!(breaker.trips(), 1);
    }

    #[test]
    fn closes_after_cooldown_and_resets() {
        let breaker = CircuitBreaker::new(2, Duration::ZERO);
        breaker.record_failures(2);
        assert_eq!(breaker.trips(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!breaker.is_open());
        assert_eq!(breaker.consecutive_failures(), 0);
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    #[test]
    fn concurrent_trips_start_one_cooldown() {
        let breaker = Arc::new(CircuitBreaker::new(3, Duration::from_secs(1200)));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let b = Arc::clone(&breaker);
                std::thread::spawn(move || b.record_failure())
            })
            .collect();
        let opened = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|opened| *opened)
            .count();
        assert_eq!(opened, 1);
        assert_eq!(breaker.trips(), 1);
        assert!(breaker.is_open());
    }
}
