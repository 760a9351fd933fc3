//! Audio playback orchestration: channel pooling, one-shot and music
//! playback sessions, and a dependency-ordered extension module system.
//!
//! The crate sits between game code and an audio backend. Backends are
//! anything implementing [`channel::PlaybackChannel`]; a headless
//! [`channel::NullBackend`] ships for tests and servers, and a rodio
//! backend is available behind the `rodio-backend` feature.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────── AudioSystem ───────────────────────┐
//! │  FrameClock ── tick ──> SoundService ──> MusicService      │
//! │                              │                │            │
//! │                         ChannelPool      channel rack      │
//! │                              │                │            │
//! │                        PlaybackChannel backends            │
//! │                                                            │
//! │  ModuleRegistry <── bridged SoundEvent / MusicEvent ───────│
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything advances cooperatively once per tick; no internal threads.
//! Sound effect fades run on wall time, music fades and beat scheduling on
//! scaled game time.

pub mod channel;
pub mod clock;
pub mod config;
pub mod definitions;
pub mod error;
pub mod messaging;
pub mod modules;
pub mod services;
pub mod session;
pub mod system;

pub use channel::{ChannelFactory, ChannelId, ClipId, PlaybackChannel, Positioning, TargetId};
pub use clock::{FrameClock, FrameTick};
pub use config::AudioConfig;
pub use definitions::{MusicDefinition, SoundDefinition, SpatialParams};
pub use error::{BackendError, ConfigError, ModuleError};
pub use messaging::{EventBus, ModuleEvent, MusicEvent, SoundEvent};
pub use modules::{AudioModule, ModuleContext, ModuleDescriptor, ModuleRegistry, ModuleState};
pub use services::{MusicParams, MusicService, PlayParams, SoundService};
pub use session::{MusicHandle, SoundHandle};
pub use system::AudioSystem;
