/// Fade and crossfade timelines
///
/// Fades are expressed as a volume *factor* in [0, 1] multiplied into a
/// session's effective volume, so global volume or ducking changes mid-fade
/// compose correctly instead of being baked into absolute targets. A new
/// fade on the same session replaces the in-flight one (last-writer-wins).

/// Direction of a fade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadeKind {
    In,
    Out,
}

/// Linear fade of a session's volume factor over a duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    kind: FadeKind,
    start_factor: f32,
    elapsed: f32,
    duration: f32,
}

impl Fade {
    /// Fade the factor from `from_factor` up to 1.0 over `duration` seconds
    pub fn fade_in(from_factor: f32, duration: f32) -> Self {
        Self {
            kind: FadeKind::In,
            start_factor: from_factor.clamp(0.0, 1.0),
            elapsed: 0.0,
            duration: duration.max(0.0),
        }
    }

    /// Fade the factor from `from_factor` down to 0.0 over `duration` seconds
    pub fn fade_out(from_factor: f32, duration: f32) -> Self {
        Self {
            kind: FadeKind::Out,
            start_factor: from_factor.clamp(0.0, 1.0),
            elapsed: 0.0,
            duration: duration.max(0.0),
        }
    }

    /// Advance the timeline by `dt` seconds and return the new factor
    pub fn advance(&mut self, dt: f32) -> f32 {
        self.elapsed += dt.max(0.0);
        self.factor()
    }

    /// Current factor on the fade's linear timeline
    pub fn factor(&self) -> f32 {
        let t = self.progress();
        let target = match self.kind {
            FadeKind::In => 1.0,
            FadeKind::Out => 0.0,
        };
        self.start_factor + (target - self.start_factor) * t
    }

    /// Whether the fade reached its end
    pub fn is_complete(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Whether this fade ends in a stop
    pub fn is_fade_out(&self) -> bool {
        self.kind == FadeKind::Out
    }

    fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }
}

/// Shared timeline for a crossfade between two music sessions.
///
/// The outgoing factor lerps from its captured start down to 0, the
/// incoming factor lerps 0 up to 1, both over the same duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossfade {
    out_start: f32,
    elapsed: f32,
    duration: f32,
}

impl Crossfade {
    pub fn new(out_start_factor: f32, duration: f32) -> Self {
        Self {
            out_start: out_start_factor.clamp(0.0, 1.0),
            elapsed: 0.0,
            duration: duration.max(0.0),
        }
    }

    /// Advance the shared timeline by `dt` seconds
    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt.max(0.0);
    }

    /// Factor for the outgoing session
    pub fn out_factor(&self) -> f32 {
        self.out_start * (1.0 - self.progress())
    }

    /// Factor for the incoming session
    pub fn in_factor(&self) -> f32 {
        self.progress()
    }

    pub fn is_complete(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Seconds left on the shared timeline
    pub fn remaining(&self) -> f32 {
        (self.duration - self.elapsed).max(0.0)
    }

    fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }
}
