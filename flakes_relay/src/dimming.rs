//! Dimming engine: leading-edge time-proportioning over the channel bank.
//!
//! Every scheduler tick the engine computes the frame progress
//! `p = elapsed / frame_period` and evaluates each channel that is still
//! `On` against its *current* level:
//!
//! ```text
//!   ON ──(p > 0, floor(p·255) ≥ level)──► OFF
//!   OFF ──(p ≥ 1, frame boundary)──────► ON   (frame clock restarts)
//! ```
//!
//! A channel at level 255 is never switched off inside a frame; a channel at
//! level 0 is switched off on the first tick after the frame starts. Levels
//! written mid-frame take effect on the next tick. Each transition produces
//! exactly one `OutputDriver::set_level` call.

use crate::channel::{ChannelBank, OutputState};
use crate::clock::PeriodicClock;
use flakes_common::consts::MAX_LEVEL;
use flakes_common::driver::{DriverError, OutputDriver};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Transitions produced by one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Channels switched ON → OFF.
    pub switched_off: usize,
    /// Channels switched OFF → ON at a frame boundary.
    pub switched_on: usize,
    /// True if this tick closed a frame and restarted the frame clock.
    pub frame_completed: bool,
}

impl TickOutcome {
    /// Total driver writes issued by the tick.
    #[inline]
    pub fn transitions(&self) -> usize {
        self.switched_off + self.switched_on
    }
}

/// Running counters for the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    /// Completed frames.
    pub frames: u64,
    /// Driver writes since initialization.
    pub transitions: u64,
}

/// Frame-clocked output shaper.
#[derive(Debug)]
pub struct DimmingEngine {
    frame: PeriodicClock,
    stats: FrameStats,
}

impl DimmingEngine {
    /// Create an engine whose first frame starts at `now`.
    pub fn new(frame_period: Duration, now: Instant) -> Self {
        Self {
            frame: PeriodicClock::new(frame_period, now),
            stats: FrameStats::default(),
        }
    }

    /// Configure every channel as an output and drive it high.
    ///
    /// All channels start `On` so outputs are visible before the first frame.
    /// The frame clock restarts at `now`.
    ///
    /// # Errors
    /// Propagates the first `configure_as_output` failure.
    pub fn initialize(
        &mut self,
        bank: &mut ChannelBank,
        driver: &mut dyn OutputDriver,
        now: Instant,
    ) -> Result<(), DriverError> {
        for (idx, channel) in bank.channels_mut().iter_mut().enumerate() {
            driver.configure_as_output(idx)?;
            driver.set_level(idx, true);
            channel.state = OutputState::On;
        }
        self.frame.restart(now);
        info!(
            "Dimming engine initialized: {} channels, frame={}us",
            bank.len(),
            self.frame.period().as_micros()
        );
        Ok(())
    }

    /// Evaluate all channels at `now` and emit transitions.
    pub fn tick(
        &mut self,
        now: Instant,
        bank: &mut ChannelBank,
        driver: &mut dyn OutputDriver,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let progress = self.frame.progress(now);

        if progress >= 1.0 {
            for (idx, channel) in bank.channels_mut().iter_mut().enumerate() {
                if channel.state == OutputState::Off {
                    channel.state = OutputState::On;
                    driver.set_level(idx, true);
                    outcome.switched_on += 1;
                }
            }
            self.frame.restart(now);
            self.stats.frames += 1;
            outcome.frame_completed = true;

            if self.stats.frames % 3600 == 0 {
                debug!(
                    "Dimming: {} frames, {} transitions",
                    self.stats.frames, self.stats.transitions
                );
            }
        } else if progress > 0.0 {
            let step = frame_step(progress);
            for (idx, channel) in bank.channels_mut().iter_mut().enumerate() {
                if channel.state == OutputState::On && should_switch_off(step, channel.level) {
                    channel.state = OutputState::Off;
                    driver.set_level(idx, false);
                    outcome.switched_off += 1;
                }
            }
        }

        self.stats.transitions += outcome.transitions() as u64;
        outcome
    }

    /// Frame period.
    pub fn frame_period(&self) -> Duration {
        self.frame.period()
    }

    /// Progress through the current frame.
    pub fn frame_progress(&self, now: Instant) -> f64 {
        self.frame.progress(now)
    }

    /// Engine counters.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

/// Frame progress quantized to the 0..=255 level scale.
#[inline]
pub fn frame_step(progress: f64) -> u32 {
    (progress * f64::from(MAX_LEVEL)).floor() as u32
}

/// ON → OFF predicate for a channel at `level` once the frame reached `step`.
///
/// Keeps the channel on for `level / 255` of the frame.
#[inline]
pub fn should_switch_off(step: u32, level: u8) -> bool {
    step >= u32::from(level)
}
