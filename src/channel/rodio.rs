/// Rodio playback backend
///
/// Real channels over `rodio::Sink` with clips preloaded into memory.
/// Requires audio hardware, so the whole module sits behind the
/// `rodio-backend` feature. This backend is non-spatial: position, parent
/// and spatial parameters are recorded but not rendered.
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use super::{ChannelFactory, ClipId, PlaybackChannel, TargetId};
use crate::definitions::SpatialParams;
use crate::error::BackendError;

/// Shared rodio output stream plus the in-memory clip store
pub struct RodioBackend {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    clips: Arc<RwLock<HashMap<ClipId, Arc<Vec<u8>>>>>,
}

impl RodioBackend {
    /// Open the default output device
    pub fn new() -> Result<Self, BackendError> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| BackendError::StreamInitFailed(Box::new(e)))?;

        Ok(Self {
            _stream: stream,
            handle,
            clips: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Register decoded-format audio bytes (mp3, wav, ...) under a clip id.
    /// The data is decoded once up front so malformed clips fail here, not
    /// in the middle of playback.
    pub fn register_clip(&self, id: ClipId, data: Vec<u8>) -> Result<(), BackendError> {
        let cursor = Cursor::new(data.clone());
        let decoder = Decoder::new(cursor).map_err(|e| BackendError::DecodeFailed {
            clip: id.to_string(),
            source: Box::new(e),
        })?;
        drop(decoder);

        tracing::debug!("Registered clip '{}' ({} bytes)", id, data.len());
        self.clips.write().insert(id, Arc::new(data));
        Ok(())
    }

    /// Build a channel factory; each channel gets its own sink on the
    /// shared output stream
    pub fn factory(&self) -> ChannelFactory {
        let handle = self.handle.clone();
        let clips = Arc::clone(&self.clips);
        Box::new(move || {
            let sink = Sink::try_new(&handle)
                .map_err(|e| BackendError::StreamInitFailed(Box::new(e)))?;
            Ok(Box::new(RodioChannel::new(sink, Arc::clone(&clips))) as Box<dyn PlaybackChannel>)
        })
    }
}

/// One playback channel backed by a rodio sink
pub struct RodioChannel {
    sink: Sink,
    clips: Arc<RwLock<HashMap<ClipId, Arc<Vec<u8>>>>>,
    clip: Option<ClipId>,
    volume: f32,
    pitch: f32,
    looping: bool,
    priority: i32,
    position: [f32; 3],
    parent: Option<TargetId>,
    spatial: SpatialParams,
    output_group: Option<String>,
    /// Wall-clock bookkeeping for `elapsed`; rodio has no position query
    /// that survives speed changes, so we track it ourselves
    started_at: Option<Instant>,
    accumulated: f32,
}

impl RodioChannel {
    fn new(sink: Sink, clips: Arc<RwLock<HashMap<ClipId, Arc<Vec<u8>>>>>) -> Self {
        Self {
            sink,
            clips,
            clip: None,
            volume: 1.0,
            pitch: 1.0,
            looping: false,
            priority: 0,
            position: [0.0; 3],
            parent: None,
            spatial: SpatialParams::default(),
            output_group: None,
            started_at: None,
            accumulated: 0.0,
        }
    }
}

impl PlaybackChannel for RodioChannel {
    fn load(&mut self, clip: &ClipId) {
        self.clip = Some(clip.clone());
    }

    fn unload(&mut self) {
        self.clip = None;
        self.sink.stop();
        self.started_at = None;
        self.accumulated = 0.0;
    }

    fn play(&mut self) {
        let Some(clip) = self.clip.clone() else {
            return;
        };
        let Some(data) = self.clips.read().get(&clip).cloned() else {
            tracing::warn!("No clip data registered for '{}'", clip);
            return;
        };

        // Replace whatever the sink was rendering
        self.sink.stop();

        let cursor = Cursor::new((*data).clone());
        match Decoder::new(cursor) {
            Ok(decoder) => {
                if self.looping {
                    self.sink.append(decoder.repeat_infinite());
                } else {
                    self.sink.append(decoder);
                }
                self.sink.set_volume(self.volume);
                self.sink.set_speed(self.pitch);
                self.sink.play();
                self.started_at = Some(Instant::now());
                self.accumulated = 0.0;
            }
            Err(e) => {
                tracing::error!("Failed to decode clip '{}': {}", clip, e);
            }
        }
    }

    fn pause(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.accumulated += started.elapsed().as_secs_f32();
        }
        self.sink.pause();
    }

    fn unpause(&mut self) {
        if !self.sink.empty() {
            self.started_at = Some(Instant::now());
        }
        self.sink.play();
    }

    fn stop(&mut self) {
        self.sink.stop();
        self.started_at = None;
        self.accumulated = 0.0;
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.sink.set_volume(self.volume);
    }

    fn pitch(&self) -> f32 {
        self.pitch
    }

    fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.max(0.01);
        self.sink.set_speed(self.pitch);
    }

    fn looping(&self) -> bool {
        self.looping
    }

    fn set_looping(&mut self, looping: bool) {
        // Takes effect on the next play(); rodio cannot retarget an
        // already-appended source
        self.looping = looping;
    }

    fn elapsed(&self) -> f32 {
        let running = self
            .started_at
            .map(|s| s.elapsed().as_secs_f32())
            .unwrap_or(0.0);
        self.accumulated + running
    }

    fn is_playing(&self) -> bool {
        !self.sink.empty() && !self.sink.is_paused()
    }

    fn position(&self) -> [f32; 3] {
        self.position
    }

    fn set_position(&mut self, position: [f32; 3]) {
        self.position = position;
    }

    fn parent(&self) -> Option<TargetId> {
        self.parent
    }

    fn set_parent(&mut self, parent: Option<TargetId>) {
        self.parent = parent;
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    fn set_spatial(&mut self, spatial: SpatialParams) {
        self.spatial = spatial;
    }

    fn set_output_group(&mut self, group: Option<&str>) {
        self.output_group = group.map(|g| g.to_string());
    }
}

// Note: no unit tests here because rodio requires actual audio hardware.
// Orchestration behavior is covered against the null backend.
