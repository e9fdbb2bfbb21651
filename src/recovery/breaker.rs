//! Per-node circuit breaker.
//!
//! Counts HIGH/CRITICAL failures in a trailing time window. Once the count
//! reaches the threshold the breaker opens and auto-recovery for that node
//! is suspended. After the open timeout a single trial is allowed
//! (half-open); a success closes the breaker, a failure reopens it.
//!
//! All methods take `now` explicitly so transitions are deterministic and
//! tests never have to sleep.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Breaker state, reported through registry-style copy-out queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation, recovery attempts allowed.
    Closed,
    /// Too many recent failures, recovery suspended.
    Open,
    /// Open timeout elapsed, one trial attempt allowed.
    HalfOpen,
}

impl BreakerState {
    pub fn as_label(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Trailing-window failure breaker for one node.
#[derive(Debug)]
pub struct CircuitBreaker {
    failures: VecDeque<Instant>,
    window: Duration,
    threshold: u32,
    open_timeout: Duration,
    state: BreakerState,
    opened_at: Option<Instant>,
    trial_taken: bool,
}

impl CircuitBreaker {
    pub fn new(window: Duration, threshold: u32, open_timeout: Duration) -> Self {
        Self {
            failures: VecDeque::new(),
            window,
            threshold: threshold.max(1),
            open_timeout,
            state: BreakerState::Closed,
            opened_at: None,
            trial_taken: false,
        }
    }

    /// Records a severe failure at `now`.
    ///
    /// Closed trips to open once the windowed count reaches the threshold.
    /// A failure during the half-open trial reopens immediately. A failure
    /// while open is counted but does not move the open timeout, so the
    /// half-open trial stays reachable under a continuous failure stream.
    pub fn record_failure(&mut self, now: Instant) {
        self.prune(now);
        self.failures.push_back(now);
        match self.state {
            BreakerState::Closed => {
                if self.failures.len() as u32 >= self.threshold {
                    self.state = BreakerState::Open;
                    self.opened_at = Some(now);
                }
            }
            BreakerState::HalfOpen => {
                self.state = BreakerState::Open;
                self.opened_at = Some(now);
                self.trial_taken = false;
            }
            BreakerState::Open => {}
        }
    }

    /// Records a recovery success at `now`.
    ///
    /// A successful half-open trial closes the breaker and clears the
    /// failure window.
    pub fn record_success(&mut self, now: Instant) {
        self.prune(now);
        if self.state == BreakerState::HalfOpen {
            self.state = BreakerState::Closed;
            self.failures.clear();
            self.opened_at = None;
            self.trial_taken = false;
        }
    }

    /// Returns whether a recovery attempt is allowed at `now`.
    ///
    /// Advances open to half-open once the open timeout elapses. Half-open
    /// admits exactly one trial until its outcome is recorded.
    pub fn allows(&mut self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| now.saturating_duration_since(at) >= self.open_timeout)
                    .unwrap_or(true);
                if elapsed {
                    self.state = BreakerState::HalfOpen;
                    self.trial_taken = true;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if self.trial_taken {
                    false
                } else {
                    self.trial_taken = true;
                    true
                }
            }
        }
    }

    /// Like [`allows`](Self::allows), but read-only: neither advances the
    /// state machine nor consumes the half-open trial. For status queries.
    pub fn would_allow(&self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => self
                .opened_at
                .map(|at| now.saturating_duration_since(at) >= self.open_timeout)
                .unwrap_or(true),
            BreakerState::HalfOpen => !self.trial_taken,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Failure count inside the trailing window as of `now`.
    pub fn failure_count(&mut self, now: Instant) -> u32 {
        self.prune(now);
        self.failures.len() as u32
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.failures.front() {
            if now.saturating_duration_since(*oldest) > self.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            Duration::from_secs(3600),
            3,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn starts_closed_and_allows() {
        let mut b = breaker();
        let now = Instant::now();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.allows(now));
        assert_eq!(b.failure_count(now), 0);
    }

    #[test]
    fn opens_at_threshold() {
        let mut b = breaker();
        let now = Instant::now();
        b.record_failure(now);
        b.record_failure(now);
        assert_eq!(b.state(), BreakerState::Closed);
        b.record_failure(now);
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allows(now));
    }

    #[test]
    fn open_admits_single_trial_after_timeout() {
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.record_failure(t0);
        }
        assert!(!b.allows(t0 + Duration::from_secs(59)));

        let later = t0 + Duration::from_secs(61);
        assert!(b.allows(later));
        assert_eq!(b.state(), BreakerState::HalfOpen);
        // Second attempt before the trial outcome is recorded is refused.
        assert!(!b.allows(later));
    }

    #[test]
    fn trial_success_closes_and_clears() {
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.record_failure(t0);
        }
        let later = t0 + Duration::from_secs(61);
        assert!(b.allows(later));
        b.record_success(later);
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.failure_count(later), 0);
        assert!(b.allows(later));
    }

    #[test]
    fn trial_failure_reopens() {
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.record_failure(t0);
        }
        let later = t0 + Duration::from_secs(61);
        assert!(b.allows(later));
        b.record_failure(later);
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allows(later + Duration::from_secs(59)));
        assert!(b.allows(later + Duration::from_secs(61)));
    }

    #[test]
    fn failure_while_open_does_not_extend_the_timeout() {
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.record_failure(t0);
        }
        // A later failure while open must not push the trial further out.
        b.record_failure(t0 + Duration::from_secs(30));
        assert!(!b.allows(t0 + Duration::from_secs(59)));
        assert!(b.allows(t0 + Duration::from_secs(61)));
        assert_eq!(b.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn would_allow_is_a_pure_peek() {
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.record_failure(t0);
        }
        let later = t0 + Duration::from_secs(61);
        assert!(b.would_allow(later));
        assert!(b.would_allow(later));
        assert_eq!(b.state(), BreakerState::Open);

        // Claiming the trial flips the peek until the outcome is recorded.
        assert!(b.allows(later));
        assert!(!b.would_allow(later));
        b.record_success(later);
        assert!(b.would_allow(later));
    }

    #[test]
    fn window_expiry_drops_stale_failures() {
        let mut b = CircuitBreaker::new(
            Duration::from_secs(10),
            3,
            Duration::from_secs(60),
        );
        let t0 = Instant::now();
        b.record_failure(t0);
        b.record_failure(t0 + Duration::from_secs(1));
        // Both failures have aged out by t0+12s; a third does not trip.
        b.record_failure(t0 + Duration::from_secs(12));
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.failure_count(t0 + Duration::from_secs(12)), 1);
    }
}
