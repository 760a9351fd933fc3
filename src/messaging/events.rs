/// Event types for playback and module lifecycles
///
/// Events represent things that have happened (past tense).
/// They are broadcast to all subscribers of the owning bus.
use crate::session::{MusicHandle, SoundHandle};

/// One-shot sound lifecycle events
#[derive(Debug, Clone)]
pub enum SoundEvent {
    /// A sound instance started playing
    Started {
        handle: SoundHandle,
        definition: String,
    },

    /// A sound instance reached the end of its clip
    Completed {
        handle: SoundHandle,
        definition: String,
    },

    /// A sound instance was stopped (user stop, stop-all or eviction)
    Stopped {
        handle: SoundHandle,
        definition: String,
    },
}

/// Music lifecycle and timing events
#[derive(Debug, Clone)]
pub enum MusicEvent {
    /// A music track started playing
    Started {
        handle: MusicHandle,
        definition: String,
    },

    /// A music track stopped (user stop, crossfade end or natural end)
    Stopped {
        handle: MusicHandle,
        definition: String,
    },

    /// The intro clip finished and the main/layer channels took over
    IntroCompleted {
        handle: MusicHandle,
        definition: String,
    },

    /// A crossfade between two tracks began
    CrossfadeStarted {
        from: MusicHandle,
        to: MusicHandle,
    },

    /// A crossfade finished; the outgoing track was hard-stopped
    CrossfadeCompleted {
        from: MusicHandle,
        to: MusicHandle,
    },

    /// A beat elapsed (derived from the definition's static BPM)
    Beat { handle: MusicHandle, beat: u32 },

    /// A bar elapsed (every `beats_per_bar` beats)
    Bar { handle: MusicHandle, bar: u32 },
}

/// Module system lifecycle events
#[derive(Debug, Clone)]
pub enum ModuleEvent {
    /// A module was registered with the registry
    Discovered { id: String },

    /// A module finished initialization
    Initialized { id: String },

    /// A module's initialize call failed or was rejected
    InitFailed { id: String, reason: String },

    /// A module was enabled
    Enabled { id: String },

    /// A module was disabled
    Disabled { id: String },

    /// All declared dependencies of a module were present at init time
    DependenciesResolved { id: String },

    /// One or more declared dependencies were missing at init time
    DependenciesFailed { id: String, missing: Vec<String> },

    /// A module was destroyed and unsubscribed from all event streams
    Destroyed { id: String },

    /// An enable/disable/destroy callback failed (isolated, non-fatal)
    LifecycleFailed {
        id: String,
        phase: &'static str,
        reason: String,
    },
}

impl SoundEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SoundEvent::Started { definition, .. } => format!("Sound started: {}", definition),
            SoundEvent::Completed { definition, .. } => format!("Sound completed: {}", definition),
            SoundEvent::Stopped { definition, .. } => format!("Sound stopped: {}", definition),
        }
    }
}

impl MusicEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            MusicEvent::Started { definition, .. } => format!("Music started: {}", definition),
            MusicEvent::Stopped { definition, .. } => format!("Music stopped: {}", definition),
            MusicEvent::IntroCompleted { definition, .. } => {
                format!("Intro completed: {}", definition)
            }
            MusicEvent::CrossfadeStarted { .. } => "Crossfade started".to_string(),
            MusicEvent::CrossfadeCompleted { .. } => "Crossfade completed".to_string(),
            MusicEvent::Beat { beat, .. } => format!("Beat {}", beat),
            MusicEvent::Bar { bar, .. } => format!("Bar {}", bar),
        }
    }
}

impl ModuleEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ModuleEvent::Discovered { id } => format!("Module discovered: {}", id),
            ModuleEvent::Initialized { id } => format!("Module initialized: {}", id),
            ModuleEvent::InitFailed { id, reason } => {
                format!("Module init failed: {} ({})", id, reason)
            }
            ModuleEvent::Enabled { id } => format!("Module enabled: {}", id),
            ModuleEvent::Disabled { id } => format!("Module disabled: {}", id),
            ModuleEvent::DependenciesResolved { id } => {
                format!("Module dependencies resolved: {}", id)
            }
            ModuleEvent::DependenciesFailed { id, missing } => {
                format!("Module dependencies failed: {} (missing {:?})", id, missing)
            }
            ModuleEvent::Destroyed { id } => format!("Module destroyed: {}", id),
            ModuleEvent::LifecycleFailed { id, phase, reason } => {
                format!("Module {} failed during {}: {}", id, phase, reason)
            }
        }
    }
}
