/// Pluggable audio extension modules
///
/// Modules extend the audio system without touching its core: they are
/// registered explicitly at assembly time, initialized in priority order
/// with dependency checking, and driven once per scheduler tick. Every
/// lifecycle callback failure is isolated to the failing module.
pub mod registry;

pub use registry::ModuleRegistry;

use semver::Version;

use crate::clock::FrameTick;
use crate::messaging::{MusicEvent, SoundEvent};
use crate::services::{MusicService, SoundService};

/// Lifecycle state of a registered module.
///
/// Transitions are strictly ordered:
/// `Registered → Initialized → Enabled ⇄ Disabled → Destroyed`.
/// A module whose dependencies or compatibility check fail stays
/// `Registered` and is never enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Registered,
    Initialized,
    Enabled,
    Disabled,
    Destroyed,
}

/// Static metadata a module declares about itself
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    /// Unique module id; duplicate registrations are rejected (first wins)
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Module version
    pub version: Version,

    /// Ids of modules that must be registered before this one initializes
    pub dependencies: Vec<String>,

    /// Enable immediately after successful initialization
    pub auto_enable: bool,

    /// Initialization order: higher priority initializes first
    pub priority: i32,

    /// Oldest host version this module accepts, if it cares
    pub min_host_version: Option<Version>,
}

impl ModuleDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: Version::new(0, 1, 0),
            dependencies: Vec::new(),
            auto_enable: false,
            priority: 0,
            min_host_version: None,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = String>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    pub fn with_auto_enable(mut self, auto_enable: bool) -> Self {
        self.auto_enable = auto_enable;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_min_host_version(mut self, version: Version) -> Self {
        self.min_host_version = Some(version);
        self
    }
}

/// Mutable view of the playback services handed to module callbacks
pub struct ModuleContext<'a> {
    pub sound: &'a mut SoundService,
    pub music: &'a mut MusicService,
}

/// Contract for an audio extension module.
///
/// All lifecycle methods return `Result`; a failure is caught by the
/// registry, logged and reported via a module event, and never prevents
/// other modules from running. Capability queries (`wants_sound_events`,
/// `wants_music_events`) replace per-variant base classes: the registry
/// bridges the corresponding service event streams only to modules that
/// ask for them.
#[allow(unused_variables)]
pub trait AudioModule: Send {
    /// The module's static metadata
    fn descriptor(&self) -> ModuleDescriptor;

    /// Whether this module accepts the given host version. Rejection
    /// aborts initialization quietly; it is not an error.
    fn compatible_with(&self, host_version: &Version) -> bool {
        match self.descriptor().min_host_version {
            Some(min) => *host_version >= min,
            None => true,
        }
    }

    /// Receive one-shot sound lifecycle events while enabled
    fn wants_sound_events(&self) -> bool {
        false
    }

    /// Receive music lifecycle and beat events while enabled
    fn wants_music_events(&self) -> bool {
        false
    }

    fn initialize(&mut self, ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn enable(&mut self, ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn disable(&mut self, ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once per scheduler tick while the module is enabled
    fn update(&mut self, ctx: &mut ModuleContext, tick: &FrameTick) -> anyhow::Result<()> {
        Ok(())
    }

    fn destroy(&mut self, ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Bridged sound event delivery (see `wants_sound_events`)
    fn on_sound_event(&mut self, ctx: &mut ModuleContext, event: &SoundEvent) {}

    /// Bridged music event delivery (see `wants_music_events`)
    fn on_music_event(&mut self, ctx: &mut ModuleContext, event: &MusicEvent) {}
}
