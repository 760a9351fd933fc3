/// Top-level audio system facade
///
/// Owns the frame clock, both playback services and the module registry,
/// and drives them in a fixed per-tick order: sounds, then music, then
/// module updates, so modules always observe the playback state produced
/// earlier in the same tick.
use semver::Version;

use crate::channel::{ChannelFactory, ChannelPool};
use crate::clock::{FrameClock, FrameTick};
use crate::config::AudioConfig;
use crate::error::ModuleError;
use crate::modules::{AudioModule, ModuleContext, ModuleRegistry};
use crate::services::{MusicService, SoundService};

pub struct AudioSystem {
    clock: FrameClock,
    sound: SoundService,
    music: MusicService,
    modules: ModuleRegistry,
}

impl AudioSystem {
    /// Assemble a system from a config and two channel factories (one per
    /// service; each service owns a disjoint set of channels).
    pub fn new(
        config: &AudioConfig,
        sound_factory: ChannelFactory,
        music_factory: ChannelFactory,
    ) -> Self {
        let mut pool = ChannelPool::new(config.max_sound_channels, sound_factory);
        pool.prewarm(config.initial_sound_channels);

        let mut sound = SoundService::new(pool);
        sound.set_global_volume(config.sound_volume);
        sound.register_definitions(config.sounds.iter().cloned());

        let mut music = MusicService::new(config.max_concurrent_music, music_factory);
        music.set_volume(config.music_volume);
        music.register_definitions(config.music.iter().cloned());

        let host_version =
            Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or_else(|_| Version::new(0, 1, 0));

        Self {
            clock: FrameClock::new(),
            sound,
            music,
            modules: ModuleRegistry::new(host_version),
        }
    }

    pub fn sound(&self) -> &SoundService {
        &self.sound
    }

    pub fn sound_mut(&mut self) -> &mut SoundService {
        &mut self.sound
    }

    pub fn music(&self) -> &MusicService {
        &self.music
    }

    pub fn music_mut(&mut self) -> &mut MusicService {
        &mut self.music
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Scale game time for music fades and beat scheduling (sound effect
    /// fades keep running on wall time)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.clock.set_time_scale(scale);
    }

    /// Register a module; see [`ModuleRegistry::register`]
    pub fn register_module(&mut self, module: Box<dyn AudioModule>) -> bool {
        self.modules.register(module)
    }

    /// Initialize all registered modules (priority-descending, with
    /// dependency and host-version gating)
    pub fn initialize_modules(&mut self) {
        let mut ctx = ModuleContext {
            sound: &mut self.sound,
            music: &mut self.music,
        };
        self.modules.initialize_all(&mut ctx);
    }

    pub fn enable_module(&mut self, id: &str) -> Result<(), ModuleError> {
        let mut ctx = ModuleContext {
            sound: &mut self.sound,
            music: &mut self.music,
        };
        self.modules.enable(id, &mut ctx)
    }

    pub fn disable_module(&mut self, id: &str) -> Result<(), ModuleError> {
        let mut ctx = ModuleContext {
            sound: &mut self.sound,
            music: &mut self.music,
        };
        self.modules.disable(id, &mut ctx)
    }

    pub fn destroy_module(&mut self, id: &str) -> Result<(), ModuleError> {
        let mut ctx = ModuleContext {
            sound: &mut self.sound,
            music: &mut self.music,
        };
        self.modules.destroy(id, &mut ctx)
    }

    /// Measure elapsed time and advance everything by one tick
    pub fn tick(&mut self) -> FrameTick {
        let tick = self.clock.tick();
        self.advance(&tick);
        tick
    }

    /// Advance everything by an externally supplied tick (host-driven
    /// frame loops and deterministic tests)
    pub fn advance(&mut self, tick: &FrameTick) {
        self.sound.advance(tick);
        self.music.advance(tick);

        let mut ctx = ModuleContext {
            sound: &mut self.sound,
            music: &mut self.music,
        };
        self.modules.update_all(&mut ctx, tick);
    }

    /// Tear down: destroy every module (reverse init order), then stop all
    /// playback. Must leave no module subscribed to any event stream.
    pub fn shutdown(&mut self) {
        let mut ctx = ModuleContext {
            sound: &mut self.sound,
            music: &mut self.music,
        };
        self.modules.shutdown(&mut ctx);

        self.sound.stop_all(0.0);
        self.music.stop_all(0.0);
        tracing::info!("Audio system shut down");
    }
}
