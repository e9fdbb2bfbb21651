//! Jitter policy for retry delays.
//!
//! [`JitterPolicy`] adds randomness to backoff delays so that many nodes
//! recovering from the same outage do not retry in lockstep.
//!
//! - [`JitterPolicy::None`] — no randomization, predictable delays
//! - [`JitterPolicy::Full`] — random delay in `[0, base]`
//! - [`JitterPolicy::Equal`] — `base/2 + random[0, base/2]`
//! - [`JitterPolicy::Decorrelated`] — grows from the previous delay, capped

use rand::Rng;
use std::time::Duration;

/// Policy controlling randomization of retry delays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter: use the exact backoff delay. Predictable; fine when only
    /// one node is retrying or in tests.
    #[default]
    None,

    /// Full jitter: random delay in `[0, base]`. Maximum load spreading.
    Full,

    /// Equal jitter: `base/2 + random[0, base/2]`. Preserves most of the
    /// backoff while still decorrelating retries.
    Equal,

    /// Decorrelated jitter: `random[floor, prev × 3]`, capped at max.
    /// Needs context, so it is applied through
    /// [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    ///
    /// `Decorrelated` returns the input unchanged here; use
    /// [`apply_decorrelated`](Self::apply_decorrelated) for it.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => full_jitter(delay),
            JitterPolicy::Equal => equal_jitter(delay),
        }
    }

    /// Applies decorrelated jitter with full context (floor, previous base,
    /// cap). Falls back to `apply(prev)` for other variants.
    pub fn apply_decorrelated(&self, floor: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }

        let floor_ms = floor.as_millis() as u64;
        let prev_ms = prev.as_millis() as u64;
        let max_ms = max.as_millis() as u64;

        let upper = prev_ms.saturating_mul(3).min(max_ms).max(floor_ms);
        if floor_ms >= upper {
            return floor;
        }
        let ms = rand::rng().random_range(floor_ms..=upper);
        Duration::from_millis(ms)
    }
}

fn full_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

fn equal_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let half = ms / 2;
    let jitter = if half == 0 {
        0
    } else {
        rand::rng().random_range(0..=half)
    };
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let d = Duration::from_millis(250);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn full_jitter_zero_stays_zero() {
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn decorrelated_respects_floor_and_cap() {
        let policy = JitterPolicy::Decorrelated;
        for _ in 0..100 {
            let d = policy.apply_decorrelated(
                Duration::from_millis(100),
                Duration::from_secs(2),
                Duration::from_secs(5),
            );
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_secs(5));
        }
    }
}
