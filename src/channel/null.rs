/// Null playback backend
///
/// A headless channel implementation that records every mutation without
/// touching audio hardware. Used by tests and by hosts that want the
/// orchestration behavior (events, module updates, beat scheduling) with
/// rendering disabled.
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ChannelFactory, ClipId, PlaybackChannel, TargetId};
use crate::definitions::SpatialParams;

#[derive(Debug)]
struct NullState {
    clip: Option<ClipId>,
    playing: bool,
    paused: bool,
    volume: f32,
    pitch: f32,
    looping: bool,
    elapsed: f32,
    position: [f32; 3],
    parent: Option<TargetId>,
    priority: i32,
    spatial: SpatialParams,
    output_group: Option<String>,
}

impl Default for NullState {
    fn default() -> Self {
        Self {
            clip: None,
            playing: false,
            paused: false,
            volume: 1.0,
            pitch: 1.0,
            looping: false,
            elapsed: 0.0,
            position: [0.0; 3],
            parent: None,
            priority: 0,
            spatial: SpatialParams::default(),
            output_group: None,
        }
    }
}

/// Channel that records state without rendering audio
pub struct NullChannel {
    state: Arc<Mutex<NullState>>,
}

impl NullChannel {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(NullState::default())),
        }
    }

    /// Get a controller sharing this channel's state
    pub fn controller(&self) -> NullController {
        NullController {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for NullChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackChannel for NullChannel {
    fn load(&mut self, clip: &ClipId) {
        self.state.lock().clip = Some(clip.clone());
    }

    fn unload(&mut self) {
        self.state.lock().clip = None;
    }

    fn play(&mut self) {
        let mut state = self.state.lock();
        if state.clip.is_some() {
            state.playing = true;
            state.paused = false;
            state.elapsed = 0.0;
        }
    }

    fn pause(&mut self) {
        self.state.lock().paused = true;
    }

    fn unpause(&mut self) {
        self.state.lock().paused = false;
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.paused = false;
        state.elapsed = 0.0;
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.lock().volume = volume.clamp(0.0, 1.0);
    }

    fn pitch(&self) -> f32 {
        self.state.lock().pitch
    }

    fn set_pitch(&mut self, pitch: f32) {
        self.state.lock().pitch = pitch;
    }

    fn looping(&self) -> bool {
        self.state.lock().looping
    }

    fn set_looping(&mut self, looping: bool) {
        self.state.lock().looping = looping;
    }

    fn elapsed(&self) -> f32 {
        self.state.lock().elapsed
    }

    fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.playing && !state.paused
    }

    fn position(&self) -> [f32; 3] {
        self.state.lock().position
    }

    fn set_position(&mut self, position: [f32; 3]) {
        self.state.lock().position = position;
    }

    fn parent(&self) -> Option<TargetId> {
        self.state.lock().parent
    }

    fn set_parent(&mut self, parent: Option<TargetId>) {
        self.state.lock().parent = parent;
    }

    fn priority(&self) -> i32 {
        self.state.lock().priority
    }

    fn set_priority(&mut self, priority: i32) {
        self.state.lock().priority = priority;
    }

    fn set_spatial(&mut self, spatial: SpatialParams) {
        self.state.lock().spatial = spatial;
    }

    fn set_output_group(&mut self, group: Option<&str>) {
        self.state.lock().output_group = group.map(|g| g.to_string());
    }
}

/// Inspection and simulation handle for a `NullChannel`
#[derive(Clone)]
pub struct NullController {
    state: Arc<Mutex<NullState>>,
}

impl NullController {
    /// Simulate the clip reaching its natural end
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.paused = false;
    }

    /// Advance simulated playback time
    pub fn advance(&self, dt: f32) {
        let mut state = self.state.lock();
        if state.playing && !state.paused {
            state.elapsed += dt;
        }
    }

    pub fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.playing && !state.paused
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn pitch(&self) -> f32 {
        self.state.lock().pitch
    }

    pub fn looping(&self) -> bool {
        self.state.lock().looping
    }

    pub fn clip(&self) -> Option<ClipId> {
        self.state.lock().clip.clone()
    }

    pub fn position(&self) -> [f32; 3] {
        self.state.lock().position
    }

    pub fn parent(&self) -> Option<TargetId> {
        self.state.lock().parent
    }

    pub fn output_group(&self) -> Option<String> {
        self.state.lock().output_group.clone()
    }
}

/// Factory for null channels that keeps controllers for every channel built.
///
/// Controllers are indexed in creation order, which matches pool channel
/// creation order.
#[derive(Clone, Default)]
pub struct NullBackend {
    controllers: Arc<Mutex<Vec<NullController>>>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a channel factory producing null channels
    pub fn factory(&self) -> ChannelFactory {
        let controllers = Arc::clone(&self.controllers);
        Box::new(move || {
            let channel = NullChannel::new();
            controllers.lock().push(channel.controller());
            Ok(Box::new(channel))
        })
    }

    /// Controller for the n-th channel created by this backend
    pub fn controller(&self, index: usize) -> Option<NullController> {
        self.controllers.lock().get(index).cloned()
    }

    /// Number of channels created so far
    pub fn created_count(&self) -> usize {
        self.controllers.lock().len()
    }
}
