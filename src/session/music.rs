/// Music sessions and beat tracking
use super::fade::Fade;
use super::SessionState;
use crate::channel::ChannelId;

/// Opaque identity of one playing music instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MusicHandle(u64);

impl MusicHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// One beat elapsed; `bar` is set when the beat closed a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatTick {
    pub beat: u32,
    pub bar: Option<u32>,
}

/// Accumulates scheduler time into beat and bar counts.
///
/// Timing derives from the definition's static BPM only; runtime pitch
/// changes do not retime beats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatTracker {
    beat_duration: f32,
    beats_per_bar: u32,
    accumulator: f32,
    beats: u32,
    bars: u32,
}

impl BeatTracker {
    pub fn new(beat_duration: f32, beats_per_bar: u32) -> Self {
        Self {
            beat_duration: beat_duration.max(1e-3),
            beats_per_bar: beats_per_bar.max(1),
            accumulator: 0.0,
            beats: 0,
            bars: 0,
        }
    }

    /// Advance by `dt` seconds, yielding one tick per elapsed beat
    pub fn advance(&mut self, dt: f32) -> Vec<BeatTick> {
        let mut ticks = Vec::new();
        self.accumulator += dt.max(0.0);

        while self.accumulator >= self.beat_duration {
            self.accumulator -= self.beat_duration;
            self.beats += 1;

            let bar = (self.beats % self.beats_per_bar == 0).then(|| {
                self.bars += 1;
                self.bars
            });

            ticks.push(BeatTick {
                beat: self.beats,
                bar,
            });
        }

        ticks
    }

    pub fn beats(&self) -> u32 {
        self.beats
    }

    pub fn bars(&self) -> u32 {
        self.bars
    }
}

/// Live state of one playing music instance.
///
/// Effective volume is `base volume × ducking × service volume`, applied
/// uniformly to the main, intro and layer channels; layer channels are
/// additionally scaled by their per-layer base volume.
#[derive(Debug)]
pub struct MusicSession {
    pub handle: MusicHandle,
    pub definition_id: String,

    pub main: ChannelId,
    pub intro: Option<ChannelId>,

    /// (channel, per-layer base volume) pairs
    pub layers: Vec<(ChannelId, f32)>,

    /// Definition base volume × per-call multiplier
    pub base_volume: f32,

    pub state: SessionState,
    pub fade: Option<Fade>,

    /// Current fade/crossfade factor (1.0 when idle)
    pub factor: f32,

    pub beat: Option<BeatTracker>,
    pub looping: bool,
    pub paused: bool,
}

impl MusicSession {
    pub fn new(
        handle: MusicHandle,
        definition_id: String,
        main: ChannelId,
        intro: Option<ChannelId>,
        layers: Vec<(ChannelId, f32)>,
        base_volume: f32,
        looping: bool,
    ) -> Self {
        let state = if intro.is_some() {
            SessionState::IntroPlaying
        } else {
            SessionState::Playing
        };

        Self {
            handle,
            definition_id,
            main,
            intro,
            layers,
            base_volume,
            state,
            fade: None,
            factor: 1.0,
            beat: None,
            looping,
            paused: false,
        }
    }

    /// Every channel this session currently holds
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut all = Vec::with_capacity(2 + self.layers.len());
        all.push(self.main);
        if let Some(intro) = self.intro {
            all.push(intro);
        }
        all.extend(self.layers.iter().map(|(id, _)| *id));
        all
    }

    /// Whether this session references the given channel
    pub fn uses_channel(&self, id: ChannelId) -> bool {
        self.main == id
            || self.intro == Some(id)
            || self.layers.iter().any(|(layer, _)| *layer == id)
    }

    /// Drop a channel stolen by the rack's soft-limit reuse. Returns true
    /// if the stolen channel was the main channel (session unusable).
    pub fn surrender_channel(&mut self, id: ChannelId) -> bool {
        if self.intro == Some(id) {
            self.intro = None;
        }
        self.layers.retain(|(layer, _)| *layer != id);
        self.main == id
    }

    /// Start or replace the in-flight fade (last-writer-wins)
    pub fn begin_fade(&mut self, fade: Fade) {
        self.factor = fade.factor();
        self.fade = Some(fade);
    }
}
