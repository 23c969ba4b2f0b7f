//! Periodic clocks for the frame and update cadences.

use std::time::{Duration, Instant};

/// A restartable period measured from a start instant.
///
/// Used both as the frame clock (`1/FPS`) and the update clock (`1/UPS`).
#[derive(Debug, Clone, Copy)]
pub struct PeriodicClock {
    start: Instant,
    period: Duration,
}

impl PeriodicClock {
    /// Start a clock at `now`. A zero period is treated as one nanosecond.
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            start: now,
            period: period.max(Duration::from_nanos(1)),
        }
    }

    /// Clock period.
    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time elapsed since the last restart (zero if `now` precedes it).
    #[inline]
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    /// Fraction of the period elapsed. Unbounded above 1 between ticks.
    #[inline]
    pub fn progress(&self, now: Instant) -> f64 {
        self.elapsed(now).as_secs_f64() / self.period.as_secs_f64()
    }

    /// True once a full period has elapsed.
    #[inline]
    pub fn is_due(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.period
    }

    /// Restart the period at `now`.
    #[inline]
    pub fn restart(&mut self, now: Instant) {
        self.start = now;
    }
}
