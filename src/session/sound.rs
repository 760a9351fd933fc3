/// One-shot sound sessions
use super::fade::Fade;
use super::SessionState;
use crate::channel::ChannelId;

/// Opaque identity of one playing sound instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundHandle(u64);

impl SoundHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Live state of one playing sound instance.
///
/// Invariant: once `channel` is None the session is terminal and is never
/// rebound.
#[derive(Debug)]
pub struct SoundSession {
    pub handle: SoundHandle,
    pub definition_id: String,

    /// Loaned channel; None once the session is terminal
    pub channel: Option<ChannelId>,

    /// Definition base volume × per-call multiplier, before global volume
    pub base_volume: f32,

    pub state: SessionState,
    pub fade: Option<Fade>,

    /// Current fade factor (1.0 when no fade has run)
    pub factor: f32,

    pub paused: bool,
}

impl SoundSession {
    pub fn new(
        handle: SoundHandle,
        definition_id: String,
        channel: ChannelId,
        base_volume: f32,
    ) -> Self {
        Self {
            handle,
            definition_id,
            channel: Some(channel),
            base_volume,
            state: SessionState::Playing,
            fade: None,
            factor: 1.0,
            paused: false,
        }
    }

    /// Start or replace the in-flight fade (last-writer-wins)
    pub fn begin_fade(&mut self, fade: Fade) {
        self.factor = fade.factor();
        self.fade = Some(fade);
    }

    /// Detach from the channel; the session becomes terminal
    pub fn finalize(&mut self) -> Option<ChannelId> {
        self.state = SessionState::Stopped;
        self.fade = None;
        self.channel.take()
    }

    pub fn is_terminal(&self) -> bool {
        self.channel.is_none()
    }
}
