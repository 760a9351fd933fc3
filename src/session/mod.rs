/// Playback sessions
///
/// A session is the live, mutable state of one logical sound or music
/// playback instance bound to one or more channels. Sessions own their fade
/// and beat-tracking state; the services advance them once per scheduler
/// tick and translate the results into channel mutations and events.
pub mod fade;
pub mod music;
pub mod sound;

// Re-export commonly used types
pub use fade::{Crossfade, Fade};
pub use music::{BeatTick, BeatTracker, MusicHandle, MusicSession};
pub use sound::{SoundHandle, SoundSession};

/// Lifecycle of a session.
///
/// One-shot sounds move `Playing → (FadingOut) → Stopped`; music sessions
/// additionally start in `IntroPlaying` when the definition has an intro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The intro clip is playing; main and layer channels are armed but idle
    IntroPlaying,

    /// Normal playback
    Playing,

    /// A fade-out-and-stop is in flight
    FadingOut,

    /// Terminal; the session is detached from its channels
    Stopped,
}

impl SessionState {
    /// Whether the session still occupies channels
    pub fn is_live(&self) -> bool {
        !matches!(self, SessionState::Stopped)
    }

    /// Whether a user-initiated stop is in progress or done; natural
    /// completion detection is suppressed in these states
    pub fn is_stopping(&self) -> bool {
        matches!(self, SessionState::FadingOut | SessionState::Stopped)
    }
}
