/// Playback services
///
/// The sound service runs one-shot effects on top of the bounded channel
/// pool; the music service manages long-running tracks on its own channel
/// rack. Both are advanced once per scheduler tick by the audio system.
pub mod music;
pub mod sound;

pub use music::{MusicParams, MusicService};
pub use sound::{PlayParams, SoundService};
