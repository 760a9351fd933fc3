/// Frame clock for the cooperative scheduler
///
/// All fades, crossfades, ducking and beat tracking advance once per tick.
/// A tick carries two deltas: the unscaled (wall-clock) delta used by sound
/// effect fades so they keep moving while game time is paused, and the scaled
/// (game-time) delta used by music fades and beat scheduling so they match
/// gameplay pacing.
use std::time::Instant;

/// Per-frame time deltas, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    /// Game-time delta (affected by the host's time scale)
    pub scaled_dt: f32,

    /// Wall-clock delta (unaffected by time scaling or pausing)
    pub unscaled_dt: f32,
}

impl FrameTick {
    /// A tick where scaled and unscaled time advance equally.
    /// Useful for deterministic tests and hosts without time scaling.
    pub fn uniform(dt: f32) -> Self {
        Self {
            scaled_dt: dt,
            unscaled_dt: dt,
        }
    }
}

/// Produces `FrameTick`s from real elapsed time
pub struct FrameClock {
    last: Instant,
    time_scale: f32,
}

impl FrameClock {
    /// Create a clock starting now with a time scale of 1.0
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
            time_scale: 1.0,
        }
    }

    /// Set the game-time scale (0.0 pauses scaled time entirely)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }

    /// Get the current time scale
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Measure the time since the previous tick and produce the deltas
    pub fn tick(&mut self) -> FrameTick {
        let now = Instant::now();
        let unscaled_dt = now.duration_since(self.last).as_secs_f32();
        self.last = now;

        FrameTick {
            scaled_dt: unscaled_dt * self.time_scale,
            unscaled_dt,
        }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
