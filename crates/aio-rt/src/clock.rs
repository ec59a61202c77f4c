// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Monotonic time sources.
//!
//! All deadline arithmetic goes through [`Clock`] so the scheduler never
//! touches wall-clock time. Tests swap in [`ManualClock`] to drive timers
//! deterministically.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Source of monotonic timestamps.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// `std::time::Instant` backed clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Cell::new(Instant::now()),
        }
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Convert a signed delay in seconds into a `Duration`.
///
/// Zero, negative and NaN delays mean "as soon as possible" and clamp to
/// zero. Delays too large to represent saturate.
pub fn delay_from_secs(secs: f64) -> Duration {
    if !(secs > 0.0) {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_on_advance() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(250));
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn non_positive_delays_clamp_to_zero() {
        assert_eq!(delay_from_secs(0.0), Duration::ZERO);
        assert_eq!(delay_from_secs(-3.5), Duration::ZERO);
        assert_eq!(delay_from_secs(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn positive_delays_convert() {
        let d = delay_from_secs(0.05);
        assert!((d.as_secs_f64() - 0.05).abs() < 1e-9);
        assert_eq!(delay_from_secs(f64::INFINITY), Duration::MAX);
    }
}
