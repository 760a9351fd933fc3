/// Sound and music definitions
///
/// Immutable descriptions of playable assets, supplied by an external asset
/// system. The core reads them and never mutates them. Both kinds derive
/// serde so hosts can ship definition banks as JSON next to the config file.
use serde::{Deserialize, Serialize};

use crate::channel::ClipId;

/// Spatialization parameters copied verbatim onto the channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialParams {
    /// 0.0 = fully 2D, 1.0 = fully 3D
    pub spatial_blend: f32,

    /// Distance at which attenuation begins
    pub min_distance: f32,

    /// Distance at which the sound is fully attenuated
    pub max_distance: f32,
}

impl Default for SpatialParams {
    fn default() -> Self {
        Self {
            spatial_blend: 0.0,
            min_distance: 1.0,
            max_distance: 500.0,
        }
    }
}

/// Immutable description of a one-shot sound
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundDefinition {
    /// Unique identifier used by `SoundService::play`
    pub id: String,

    /// Interchangeable clips; one is picked at random per play
    pub clips: Vec<ClipId>,

    /// Base volume (0.0-1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Base pitch multiplier
    #[serde(default = "default_pitch")]
    pub pitch: f32,

    /// Random pitch variance, applied as pitch ± variance
    #[serde(default)]
    pub pitch_variance: f32,

    /// Whether the sound loops until stopped
    #[serde(default)]
    pub looping: bool,

    /// Fade in duration in seconds (0 = no fade)
    #[serde(default)]
    pub fade_in: f32,

    /// Fade out duration in seconds, used by stop unless overridden
    #[serde(default)]
    pub fade_out: f32,

    /// Spatialization parameters
    #[serde(default)]
    pub spatial: SpatialParams,

    /// Eviction priority; lowest playing priority is evicted first
    #[serde(default)]
    pub priority: i32,

    /// Optional output routing group (mixer bus name)
    #[serde(default)]
    pub output_group: Option<String>,
}

impl SoundDefinition {
    /// Create a minimal definition with a single clip and defaults elsewhere
    pub fn new(id: impl Into<String>, clip: ClipId) -> Self {
        Self {
            id: id.into(),
            clips: vec![clip],
            volume: 1.0,
            pitch: 1.0,
            pitch_variance: 0.0,
            looping: false,
            fade_in: 0.0,
            fade_out: 0.0,
            spatial: SpatialParams::default(),
            priority: 0,
            output_group: None,
        }
    }
}

/// One synchronized stem mixed under a music track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicLayer {
    pub clip: ClipId,

    /// Per-layer base volume, multiplied into the track's effective volume
    #[serde(default = "default_volume")]
    pub volume: f32,
}

/// Immutable description of a music track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicDefinition {
    /// Unique identifier used by `MusicService::play`
    pub id: String,

    /// Main (looping) clip
    pub clip: ClipId,

    /// Optional intro clip played once before the main clip starts
    #[serde(default)]
    pub intro_clip: Option<ClipId>,

    /// Additional synchronized stems, one channel each
    #[serde(default)]
    pub layers: Vec<MusicLayer>,

    /// Beats per minute; 0 disables beat/bar scheduling
    #[serde(default)]
    pub bpm: f32,

    /// Beats per bar (time signature numerator)
    #[serde(default = "default_beats_per_bar")]
    pub beats_per_bar: u32,

    /// Base volume (0.0-1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Fade in duration in seconds
    #[serde(default)]
    pub fade_in: f32,

    /// Fade out duration in seconds
    #[serde(default)]
    pub fade_out: f32,

    /// Whether the main clip loops
    #[serde(default = "default_true")]
    pub looping: bool,
}

impl MusicDefinition {
    /// Create a minimal definition with defaults elsewhere
    pub fn new(id: impl Into<String>, clip: ClipId) -> Self {
        Self {
            id: id.into(),
            clip,
            intro_clip: None,
            layers: Vec::new(),
            bpm: 0.0,
            beats_per_bar: 4,
            volume: 1.0,
            fade_in: 0.0,
            fade_out: 0.0,
            looping: true,
        }
    }

    /// Duration of one beat in seconds (60 / BPM), or None if BPM is unset.
    ///
    /// Always derived from the static BPM field: runtime pitch changes do
    /// not retime beats.
    pub fn beat_duration(&self) -> Option<f32> {
        (self.bpm > 0.0).then(|| 60.0 / self.bpm)
    }

    /// Duration of one bar in seconds (beat duration × beats per bar)
    pub fn bar_duration(&self) -> Option<f32> {
        self.beat_duration()
            .map(|beat| beat * self.beats_per_bar as f32)
    }
}

fn default_volume() -> f32 {
    1.0
}

fn default_pitch() -> f32 {
    1.0
}

fn default_beats_per_bar() -> u32 {
    4
}

fn default_true() -> bool {
    true
}
