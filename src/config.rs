/// Audio system configuration
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::definitions::{MusicDefinition, SoundDefinition};
use crate::error::ConfigError;

fn default_max_sound_channels() -> usize {
    32
}

fn default_initial_sound_channels() -> usize {
    8
}

fn default_max_concurrent_music() -> usize {
    4
}

fn default_volume() -> f32 {
    1.0
}

/// Tunables and definition banks for one audio system instance.
///
/// Definitions are plain data supplied by the asset pipeline; the config
/// file doubles as a definition bank for hosts without one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Hard cap on one-shot sound channels (pool eviction beyond this)
    #[serde(default = "default_max_sound_channels")]
    pub max_sound_channels: usize,

    /// Channels created up-front when the system starts
    #[serde(default = "default_initial_sound_channels")]
    pub initial_sound_channels: usize,

    /// Soft cap on music channels (first channel reused beyond this)
    #[serde(default = "default_max_concurrent_music")]
    pub max_concurrent_music: usize,

    /// Master volume for one-shot sounds
    #[serde(default = "default_volume")]
    pub sound_volume: f32,

    /// Master volume for music
    #[serde(default = "default_volume")]
    pub music_volume: f32,

    /// Sound definitions registered at startup
    #[serde(default)]
    pub sounds: Vec<SoundDefinition>,

    /// Music definitions registered at startup
    #[serde(default)]
    pub music: Vec<MusicDefinition>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_sound_channels: default_max_sound_channels(),
            initial_sound_channels: default_initial_sound_channels(),
            max_concurrent_music: default_max_concurrent_music(),
            sound_volume: default_volume(),
            music_volume: default_volume(),
            sounds: Vec::new(),
            music: Vec::new(),
        }
    }
}

impl AudioConfig {
    /// Load configuration from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        let config: AudioConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })?;
        config.validate()?;

        tracing::info!("Loaded audio config from {}", path.display());
        Ok(config)
    }

    /// Save configuration as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        fs::write(path, json).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        Ok(())
    }

    /// Check structural invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sound_channels == 0 {
            return Err(ConfigError::Invalid(
                "max_sound_channels must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_music == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_music must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sound_volume) || !(0.0..=1.0).contains(&self.music_volume) {
            return Err(ConfigError::Invalid(
                "volumes must be within 0.0..=1.0".to_string(),
            ));
        }
        for sound in &self.sounds {
            if sound.clips.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "sound definition '{}' has no clips",
                    sound.id
                )));
            }
        }
        Ok(())
    }
}
