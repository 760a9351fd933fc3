/// Messaging module for lifecycle event broadcasting
///
/// Each service owns its own event bus; modules and host code subscribe to
/// the streams they care about. Events are notifications of things that
/// happened (past tense, broadcast to every subscriber).
///
/// ## Architecture
///
/// ```text
/// ┌───────────────┐   SoundEvent   ┌─────────────────────┐
/// │ Sound Service │ ─────────────> │ EventBus<SoundEvent> │──┐
/// └───────────────┘                └─────────────────────┘  │
/// ┌───────────────┐   MusicEvent   ┌─────────────────────┐  │ drained per tick
/// │ Music Service │ ─────────────> │ EventBus<MusicEvent> │──┤
/// └───────────────┘                └─────────────────────┘  ▼
/// ┌───────────────┐   ModuleEvent  ┌──────────────────────┐ ┌─────────┐
/// │ Module System │ ─────────────> │ EventBus<ModuleEvent> │ │ Modules │
/// └───────────────┘                └──────────────────────┘ └─────────┘
/// ```
///
/// Delivery is non-blocking: a stalled or dropped subscriber never blocks
/// or panics the emitting component.
pub mod bus;
pub mod events;

// Re-export commonly used types
pub use bus::{EventBus, SubscriberId};
pub use events::{ModuleEvent, MusicEvent, SoundEvent};
