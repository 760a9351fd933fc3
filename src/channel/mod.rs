/// Playback channel abstraction
///
/// A channel is one physical playback unit capable of rendering one clip at
/// a time. The core depends only on this contract; concrete backends (rodio,
/// null, or a host engine's own voices) live behind it.
pub mod null;
pub mod pool;

#[cfg(feature = "rodio-backend")]
pub mod rodio;

use serde::{Deserialize, Serialize};

use crate::definitions::SpatialParams;

// Re-export commonly used types
pub use null::{NullBackend, NullChannel, NullController};
pub use pool::{Acquisition, ChannelPool};

/// Reference to a decodable audio clip, resolved by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl From<&str> for ClipId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClipId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one channel within its owning pool or rack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

/// Identity of a host-side object a channel can be attached to (3D follow)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u64);

/// How a one-shot sound is positioned in space.
///
/// The three modes are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Positioning {
    /// Leave the channel's transform untouched
    #[default]
    Unset,

    /// Set a world position once at start
    At([f32; 3]),

    /// Attach to a moving target with zero local offset
    Follow(TargetId),
}

/// One physical playback unit.
///
/// Backends are free to approximate capabilities they cannot render (e.g. a
/// non-spatial backend may record positions without applying them), but the
/// get/set pairs must stay consistent so the orchestration layer can reason
/// about channel state.
pub trait PlaybackChannel: Send {
    /// Assign a clip to this channel (does not start playback)
    fn load(&mut self, clip: &ClipId);

    /// Clear the assigned clip
    fn unload(&mut self);

    /// Start or restart playback of the assigned clip
    fn play(&mut self);

    /// Pause playback, retaining position
    fn pause(&mut self);

    /// Resume paused playback
    fn unpause(&mut self);

    /// Stop playback and rewind
    fn stop(&mut self);

    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);

    fn pitch(&self) -> f32;
    fn set_pitch(&mut self, pitch: f32);

    fn looping(&self) -> bool;
    fn set_looping(&mut self, looping: bool);

    /// Elapsed playback time in seconds
    fn elapsed(&self) -> f32;

    /// Whether the channel is actively rendering (false while paused)
    fn is_playing(&self) -> bool;

    fn position(&self) -> [f32; 3];
    fn set_position(&mut self, position: [f32; 3]);

    fn parent(&self) -> Option<TargetId>;
    fn set_parent(&mut self, parent: Option<TargetId>);

    fn priority(&self) -> i32;
    fn set_priority(&mut self, priority: i32);

    /// Copy spatialization parameters onto the channel
    fn set_spatial(&mut self, spatial: SpatialParams);

    /// Route output to a named mixer group (None = default routing)
    fn set_output_group(&mut self, group: Option<&str>);
}

/// Creates channels on demand for a pool or rack.
///
/// Fallible because real backends can fail to open an output voice; the
/// pool logs the failure and treats it as exhaustion.
pub type ChannelFactory = Box<dyn FnMut() -> anyhow::Result<Box<dyn PlaybackChannel>> + Send>;
