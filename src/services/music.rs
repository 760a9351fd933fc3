/// Music playback service
///
/// Manages up to N concurrent music channels (main, optional intro,
/// optional layers), automatic fade-out of the previous track when new
/// music starts, explicit crossfades on a shared timeline, global ducking,
/// and beat/bar scheduling derived from the definition's static BPM.
///
/// Music timelines run on scaled (game) time so fades and beats match
/// gameplay pacing, unlike sound effect fades which run on wall time.
use std::collections::{HashMap, HashSet};

use crate::channel::{ChannelFactory, ChannelId, PlaybackChannel};
use crate::clock::FrameTick;
use crate::definitions::MusicDefinition;
use crate::messaging::{EventBus, MusicEvent};
use crate::session::{BeatTracker, Crossfade, Fade, MusicHandle, MusicSession, SessionState};

/// Per-call music playback parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicParams {
    /// Volume multiplier on top of the definition's base volume
    pub volume: f32,

    /// Skip the definition's intro clip and start on the main clip
    pub skip_intro: bool,

    /// Fade-in override in seconds (None = definition default)
    pub fade_in: Option<f32>,

    /// Emit beat/bar events when the definition declares a BPM
    pub track_beats: bool,
}

impl Default for MusicParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            skip_intro: false,
            fade_in: None,
            track_beats: true,
        }
    }
}

/// Global ducking state: a single multiplier interpolated toward a target.
///
/// Setting a new target cancels any in-flight interpolation.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Ducking {
    level: f32,
    target: f32,
    remaining: f32,
}

impl Ducking {
    fn new() -> Self {
        Self {
            level: 1.0,
            target: 1.0,
            remaining: 0.0,
        }
    }

    fn set(&mut self, target: f32, time: f32) {
        self.target = target.clamp(0.0, 1.0);
        if time <= 0.0 {
            self.level = self.target;
            self.remaining = 0.0;
        } else {
            self.remaining = time;
        }
    }

    fn advance(&mut self, dt: f32) {
        if self.remaining <= 0.0 {
            return;
        }
        if dt >= self.remaining {
            self.level = self.target;
            self.remaining = 0.0;
        } else {
            self.level += (self.target - self.level) * (dt / self.remaining);
            self.remaining -= dt;
        }
    }
}

/// A crossfade in flight between two tracked sessions
#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveCrossfade {
    outgoing: MusicHandle,
    incoming: MusicHandle,
    timeline: Crossfade,
}

#[derive(Clone, Copy)]
enum StartMode {
    /// Normal play: fade out whatever is current first
    Replace,

    /// Incoming half of a crossfade: start silent, timeline drives volume
    CrossfadeIncoming,
}

/// Music orchestration service
pub struct MusicService {
    definitions: HashMap<String, MusicDefinition>,

    /// Channel rack: grows up to `max_channels`, then reuses the first
    /// tracked channel regardless of its state (a deliberate soft limit)
    channels: HashMap<ChannelId, Box<dyn PlaybackChannel>>,
    order: Vec<ChannelId>,
    factory: ChannelFactory,
    max_channels: usize,
    next_channel: u32,

    sessions: HashMap<MusicHandle, MusicSession>,
    current: Option<MusicHandle>,
    crossfade: Option<ActiveCrossfade>,
    ducking: Ducking,
    volume: f32,
    next_handle: u64,
    events: EventBus<MusicEvent>,
}

impl MusicService {
    /// Create a service with its own channel factory and soft channel limit
    pub fn new(max_channels: usize, factory: ChannelFactory) -> Self {
        Self {
            definitions: HashMap::new(),
            channels: HashMap::new(),
            order: Vec::new(),
            factory,
            max_channels: max_channels.max(1),
            next_channel: 0,
            sessions: HashMap::new(),
            current: None,
            crossfade: None,
            ducking: Ducking::new(),
            volume: 1.0,
            next_handle: 0,
            events: EventBus::new(),
        }
    }

    /// Register a music definition; replaces any previous one with the same id
    pub fn register_definition(&mut self, definition: MusicDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    /// Register a batch of definitions
    pub fn register_definitions(&mut self, definitions: impl IntoIterator<Item = MusicDefinition>) {
        for definition in definitions {
            self.register_definition(definition);
        }
    }

    /// The service's lifecycle and beat event stream
    pub fn events(&self) -> &EventBus<MusicEvent> {
        &self.events
    }

    /// Start playing a music track.
    ///
    /// If other music is active it fades out automatically over the NEW
    /// definition's fade-out duration. Returns None (after logging) for
    /// unknown ids or when no channel can be created.
    pub fn play(&mut self, id: &str, params: MusicParams) -> Option<MusicHandle> {
        self.start(id, params, StartMode::Replace)
    }

    /// Stop a music handle (or the current track when `handle` is None),
    /// optionally fading out. A new stop supersedes an in-flight fade.
    pub fn stop(&mut self, handle: Option<MusicHandle>, fade_out: f32) {
        let Some(handle) = handle.or(self.current) else {
            return;
        };
        self.stop_handle(handle, fade_out);
    }

    /// Stop every music session, including tracks still fading out
    pub fn stop_all(&mut self, fade_out: f32) {
        let handles: Vec<MusicHandle> = self.sessions.keys().copied().collect();
        for handle in handles {
            self.stop_handle(handle, fade_out);
        }
    }

    /// Crossfade from the current track to another over `duration` seconds.
    ///
    /// With nothing playing this degenerates to a plain fade-in.
    pub fn crossfade_to(
        &mut self,
        id: &str,
        duration: f32,
        params: MusicParams,
    ) -> Option<MusicHandle> {
        let Some(outgoing) = self.current else {
            let mut params = params;
            params.fade_in = Some(duration);
            return self.play(id, params);
        };

        // A superseding crossfade settles the previous one: its outgoing
        // track stops now and its incoming (the current track) becomes the
        // new outgoing. This also frees the stopped track's channels for
        // the incoming session to reuse.
        if let Some(previous) = self.crossfade.take() {
            if previous.outgoing != outgoing {
                self.finish_session(previous.outgoing);
            }
        }

        let incoming = self.start(id, params, StartMode::CrossfadeIncoming)?;

        // Cancel any fade on the outgoing session; the crossfade timeline
        // owns both factors from here on
        let out_start = match self.sessions.get_mut(&outgoing) {
            Some(session) => {
                session.fade = None;
                session.factor
            }
            None => 1.0,
        };

        self.crossfade = Some(ActiveCrossfade {
            outgoing,
            incoming,
            timeline: Crossfade::new(out_start, duration),
        });
        self.current = Some(incoming);

        tracing::debug!("Crossfade started: {:?} -> {:?}", outgoing, incoming);
        self.events.publish(MusicEvent::CrossfadeStarted {
            from: outgoing,
            to: incoming,
        });

        Some(incoming)
    }

    /// Pause all music playback
    pub fn pause(&mut self) {
        for session in self.sessions.values_mut() {
            session.paused = true;
            for id in session.channels() {
                if let Some(channel) = self.channels.get_mut(&id) {
                    channel.pause();
                }
            }
        }
    }

    /// Resume paused music playback
    pub fn resume(&mut self) {
        for session in self.sessions.values_mut() {
            session.paused = false;
            for id in session.channels() {
                if let Some(channel) = self.channels.get_mut(&id) {
                    channel.unpause();
                }
            }
        }
    }

    /// Set the music master volume
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.apply_volumes();
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Smoothly interpolate the global ducking multiplier toward `level`
    /// over `time` seconds; a new target cancels the previous interpolation
    pub fn set_ducking(&mut self, level: f32, time: f32) {
        self.ducking.set(level, time);
        if time <= 0.0 {
            self.apply_volumes();
        }
    }

    pub fn ducking_level(&self) -> f32 {
        self.ducking.level
    }

    /// Whether any music (or a specific definition) is currently live
    pub fn is_playing(&self, id: Option<&str>) -> bool {
        match id {
            Some(id) => self.sessions.values().any(|s| s.definition_id == id),
            None => !self.sessions.is_empty(),
        }
    }

    /// The currently tracked music handle
    pub fn get_current(&self) -> Option<MusicHandle> {
        self.current
    }

    /// Number of live music sessions (includes tracks still fading out)
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Advance ducking, crossfades, fades, intro handoff, beat tracking and
    /// completion polling by one scheduler tick (scaled time).
    pub fn advance(&mut self, tick: &FrameTick) {
        let dt = tick.scaled_dt;

        self.ducking.advance(dt);
        self.advance_crossfade(dt);

        let handles: Vec<MusicHandle> = self.sessions.keys().copied().collect();
        for handle in handles {
            self.advance_session(handle, dt);
        }

        // Ducking and fades both feed effective volume; one uniform pass
        // keeps every channel consistent within the tick
        self.apply_volumes();
    }

    fn advance_crossfade(&mut self, dt: f32) {
        let Some(mut active) = self.crossfade else {
            return;
        };

        active.timeline.advance(dt);
        if let Some(session) = self.sessions.get_mut(&active.outgoing) {
            session.factor = active.timeline.out_factor();
        }
        if let Some(session) = self.sessions.get_mut(&active.incoming) {
            session.factor = active.timeline.in_factor();
        }

        if active.timeline.is_complete() {
            self.crossfade = None;
            self.finish_session(active.outgoing);
            self.events.publish(MusicEvent::CrossfadeCompleted {
                from: active.outgoing,
                to: active.incoming,
            });
        } else {
            self.crossfade = Some(active);
        }
    }

    fn advance_session(&mut self, handle: MusicHandle, dt: f32) {
        let in_crossfade = self
            .crossfade
            .map(|cf| cf.outgoing == handle || cf.incoming == handle)
            .unwrap_or(false);

        let Some(session) = self.sessions.get_mut(&handle) else {
            return;
        };
        if session.paused {
            return;
        }

        // Fade timeline (suppressed while a crossfade owns the factor)
        let mut fade_out_done = false;
        if !in_crossfade {
            if let Some(fade) = session.fade.as_mut() {
                session.factor = fade.advance(dt);
                if fade.is_complete() {
                    fade_out_done = fade.is_fade_out();
                    session.fade = None;
                }
            }
        }
        if fade_out_done {
            self.finish_session(handle);
            return;
        }

        // Intro -> main handoff: poll the intro channel, then start the
        // main and layer channels and only then report completion
        if session.state == SessionState::IntroPlaying {
            let intro_done = session
                .intro
                .and_then(|id| self.channels.get(&id))
                .map(|c| !c.is_playing())
                .unwrap_or(true);

            if intro_done {
                if let Some(intro) = session.intro.take() {
                    if let Some(channel) = self.channels.get_mut(&intro) {
                        channel.stop();
                        channel.unload();
                    }
                }
                if let Some(channel) = self.channels.get_mut(&session.main) {
                    channel.play();
                }
                for (layer, _) in &session.layers {
                    if let Some(channel) = self.channels.get_mut(layer) {
                        channel.play();
                    }
                }
                session.state = SessionState::Playing;

                let definition = session.definition_id.clone();
                tracing::debug!("Intro completed for '{}'", definition);
                self.events
                    .publish(MusicEvent::IntroCompleted { handle, definition });
            }
            return;
        }

        if session.state != SessionState::Playing {
            return;
        }

        // Beat/bar scheduling from the static BPM
        if let Some(tracker) = session.beat.as_mut() {
            for beat_tick in tracker.advance(dt) {
                self.events.publish(MusicEvent::Beat {
                    handle,
                    beat: beat_tick.beat,
                });
                if let Some(bar) = beat_tick.bar {
                    self.events.publish(MusicEvent::Bar { handle, bar });
                }
            }
        }

        // Natural completion of a non-looping track
        if !session.looping && !in_crossfade {
            let main_playing = self
                .channels
                .get(&session.main)
                .map(|c| c.is_playing())
                .unwrap_or(false);
            if !main_playing {
                self.finish_session(handle);
            }
        }
    }

    fn start(&mut self, id: &str, params: MusicParams, mode: StartMode) -> Option<MusicHandle> {
        let Some(definition) = self.definitions.get(id).cloned() else {
            tracing::warn!("Unknown music id '{}', dropping play request", id);
            return None;
        };

        if matches!(mode, StartMode::Replace) {
            if let Some(previous) = self.current.take() {
                self.stop_handle(previous, definition.fade_out);
            }
        }

        let use_intro = definition.intro_clip.is_some() && !params.skip_intro;

        let Some(main) = self.acquire_channel(&[]) else {
            tracing::warn!("No music channel available for '{}'", id);
            return None;
        };
        let mut reserved = vec![main];
        let intro = if use_intro {
            let channel = self.acquire_channel(&reserved);
            reserved.extend(channel);
            channel
        } else {
            None
        };
        let mut layers = Vec::with_capacity(definition.layers.len());
        for layer in &definition.layers {
            match self.acquire_channel(&reserved) {
                Some(channel) => {
                    reserved.push(channel);
                    layers.push((channel, layer, channel_volume(layer.volume)));
                }
                None => tracing::warn!("No channel for layer '{}', skipping", layer.clip),
            }
        }

        let handle = MusicHandle::from_raw(self.next_handle);
        self.next_handle += 1;

        let base_volume = (definition.volume * params.volume).clamp(0.0, 1.0);

        // Arm the main channel; playback starts now or after the intro
        if let Some(channel) = self.channels.get_mut(&main) {
            channel.load(&definition.clip);
            channel.set_looping(definition.looping);
            channel.set_volume(0.0);
        }
        let mut layer_bindings = Vec::with_capacity(layers.len());
        for (channel_id, layer, layer_volume) in layers {
            if let Some(channel) = self.channels.get_mut(&channel_id) {
                channel.load(&layer.clip);
                channel.set_looping(definition.looping);
                channel.set_volume(0.0);
            }
            layer_bindings.push((channel_id, layer_volume));
        }

        if let Some(intro_id) = intro {
            if let Some(channel) = self.channels.get_mut(&intro_id) {
                if let Some(clip) = &definition.intro_clip {
                    channel.load(clip);
                }
                channel.set_looping(false);
                channel.set_volume(0.0);
                channel.play();
            }
        } else {
            if let Some(channel) = self.channels.get_mut(&main) {
                channel.play();
            }
            for (channel_id, _) in &layer_bindings {
                if let Some(channel) = self.channels.get_mut(channel_id) {
                    channel.play();
                }
            }
        }

        let mut session = MusicSession::new(
            handle,
            definition.id.clone(),
            main,
            intro,
            layer_bindings,
            base_volume,
            definition.looping,
        );

        match mode {
            StartMode::Replace => {
                let fade_in = params.fade_in.unwrap_or(definition.fade_in);
                if fade_in > 0.0 {
                    session.begin_fade(Fade::fade_in(0.0, fade_in));
                }
            }
            StartMode::CrossfadeIncoming => {
                session.factor = 0.0;
            }
        }

        if params.track_beats {
            if let Some(beat_duration) = definition.beat_duration() {
                session.beat = Some(BeatTracker::new(beat_duration, definition.beats_per_bar));
            }
        }

        self.sessions.insert(handle, session);
        if matches!(mode, StartMode::Replace) {
            self.current = Some(handle);
        }
        self.apply_volumes();

        tracing::debug!("Music '{}' started as {:?}", id, handle);
        self.events.publish(MusicEvent::Started {
            handle,
            definition: definition.id,
        });

        Some(handle)
    }

    fn stop_handle(&mut self, handle: MusicHandle, fade_out: f32) {
        self.detach_from_crossfade(handle);

        let Some(session) = self.sessions.get_mut(&handle) else {
            tracing::debug!("Stop for unknown {:?} ignored", handle);
            return;
        };

        if self.current == Some(handle) {
            self.current = None;
        }

        if fade_out > 0.0 && !session.paused {
            session.state = SessionState::FadingOut;
            let fade = Fade::fade_out(session.factor, fade_out);
            session.begin_fade(fade);
            return;
        }

        self.finish_session(handle);
    }

    /// Stopping a crossfade participant aborts the crossfade. The surviving
    /// side gets a plain fade over the timeline's remaining span so it
    /// still lands where the crossfade would have taken it.
    fn detach_from_crossfade(&mut self, handle: MusicHandle) {
        let Some(active) = self.crossfade else {
            return;
        };
        if active.outgoing != handle && active.incoming != handle {
            return;
        }
        self.crossfade = None;

        let survivor = if active.outgoing == handle {
            active.incoming
        } else {
            active.outgoing
        };
        let remaining = active.timeline.remaining();
        if let Some(session) = self.sessions.get_mut(&survivor) {
            if survivor == active.incoming {
                session.begin_fade(Fade::fade_in(session.factor, remaining));
            } else {
                session.state = SessionState::FadingOut;
                session.begin_fade(Fade::fade_out(session.factor, remaining));
            }
        }
    }

    /// Hard-stop a session: cancel its timers, free its channels, emit
    /// the stopped event. Channels return to the rack as idle.
    fn finish_session(&mut self, handle: MusicHandle) {
        let Some(session) = self.sessions.remove(&handle) else {
            return;
        };

        for id in session.channels() {
            if let Some(channel) = self.channels.get_mut(&id) {
                channel.stop();
                channel.unload();
            }
        }

        if self.current == Some(handle) {
            self.current = None;
        }
        if let Some(active) = self.crossfade {
            if active.outgoing == handle || active.incoming == handle {
                self.crossfade = None;
            }
        }

        tracing::debug!("Music '{}' stopped", session.definition_id);
        self.events.publish(MusicEvent::Stopped {
            handle,
            definition: session.definition_id,
        });
    }

    /// Reuse an idle rack channel, grow up to the limit, or fall back to
    /// stealing the first tracked channel regardless of its state.
    ///
    /// `reserved` holds channels already claimed by the in-progress start
    /// whose session is not inserted yet; they are neither reused nor stolen.
    fn acquire_channel(&mut self, reserved: &[ChannelId]) -> Option<ChannelId> {
        let mut in_use: HashSet<ChannelId> = self
            .sessions
            .values()
            .flat_map(|s| s.channels())
            .collect();
        in_use.extend(reserved.iter().copied());

        if let Some(id) = self.order.iter().copied().find(|id| !in_use.contains(id)) {
            return Some(id);
        }

        if self.order.len() < self.max_channels {
            match (self.factory)() {
                Ok(channel) => {
                    let id = ChannelId(self.next_channel);
                    self.next_channel += 1;
                    self.channels.insert(id, channel);
                    self.order.push(id);
                    tracing::debug!(
                        "Created music {} ({}/{})",
                        id,
                        self.order.len(),
                        self.max_channels
                    );
                    return Some(id);
                }
                Err(e) => {
                    tracing::error!("Music channel factory failed: {e:#}");
                    return None;
                }
            }
        }

        let first = self
            .order
            .iter()
            .copied()
            .find(|id| !reserved.contains(id))?;
        tracing::warn!("Music channel soft limit reached, reusing {}", first);
        self.steal_channel(first);
        Some(first)
    }

    /// Detach a channel from whichever sessions hold it; sessions that lose
    /// their main channel are finished outright
    fn steal_channel(&mut self, id: ChannelId) {
        let affected: Vec<MusicHandle> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.uses_channel(id))
            .map(|(h, _)| *h)
            .collect();

        for handle in affected {
            let main_lost = self
                .sessions
                .get_mut(&handle)
                .map(|s| s.surrender_channel(id))
                .unwrap_or(false);
            if main_lost {
                self.finish_session(handle);
            }
        }

        if let Some(channel) = self.channels.get_mut(&id) {
            channel.stop();
            channel.unload();
        }
    }

    /// Reapply `base × master × ducking × factor` to every session's
    /// channels; layers additionally scaled by their per-layer volume
    fn apply_volumes(&mut self) {
        let duck = self.ducking.level;
        for session in self.sessions.values() {
            let effective =
                (session.base_volume * self.volume * duck * session.factor).clamp(0.0, 1.0);

            if let Some(channel) = self.channels.get_mut(&session.main) {
                channel.set_volume(effective);
            }
            if let Some(intro) = session.intro {
                if let Some(channel) = self.channels.get_mut(&intro) {
                    channel.set_volume(effective);
                }
            }
            for (layer, layer_volume) in &session.layers {
                if let Some(channel) = self.channels.get_mut(layer) {
                    channel.set_volume((effective * layer_volume).clamp(0.0, 1.0));
                }
            }
        }
    }
}

fn channel_volume(volume: f32) -> f32 {
    volume.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ClipId, NullBackend};
    use crate::definitions::{MusicDefinition, MusicLayer};

    fn service_with_backend(max_channels: usize) -> (MusicService, NullBackend) {
        let backend = NullBackend::new();
        (MusicService::new(max_channels, backend.factory()), backend)
    }

    fn simple_def(id: &str) -> MusicDefinition {
        MusicDefinition::new(id, ClipId::from(id))
    }

    #[test]
    fn test_play_unknown_id_returns_none() {
        let (mut service, _backend) = service_with_backend(4);
        assert!(service.play("missing", MusicParams::default()).is_none());
    }

    #[test]
    fn test_play_starts_main_channel() {
        let (mut service, backend) = service_with_backend(4);
        let mut def = simple_def("theme");
        def.volume = 0.6;
        service.register_definition(def);

        let handle = service.play("theme", MusicParams::default());
        assert!(handle.is_some());
        assert_eq!(service.get_current(), handle);

        let main = backend.controller(0).unwrap();
        assert!(main.is_playing());
        assert!(main.looping());
        assert!((main.volume() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_new_track_fades_out_previous() {
        let (mut service, backend) = service_with_backend(4);
        service.register_definition(simple_def("first"));
        let mut second = simple_def("second");
        second.fade_out = 1.0; // Applied to the OUTGOING track
        service.register_definition(second);
        let (events, _id) = service.events().subscribe();

        let first = service.play("first", MusicParams::default()).unwrap();
        let second = service.play("second", MusicParams::default()).unwrap();
        assert_eq!(service.get_current(), Some(second));
        assert_eq!(service.active_count(), 2);

        service.advance(&FrameTick::uniform(0.5));
        assert!((backend.controller(0).unwrap().volume() - 0.5).abs() < 1e-5);

        service.advance(&FrameTick::uniform(0.5));
        assert_eq!(service.active_count(), 1);

        let collected: Vec<MusicEvent> = events.try_iter().collect();
        assert!(collected.iter().any(|e| matches!(
            e,
            MusicEvent::Stopped { handle, .. } if *handle == first
        )));
    }

    #[test]
    fn test_intro_handoff() {
        let (mut service, backend) = service_with_backend(4);
        let mut def = simple_def("battle");
        def.intro_clip = Some(ClipId::from("battle_intro"));
        def.layers.push(MusicLayer {
            clip: ClipId::from("battle_drums"),
            volume: 0.5,
        });
        service.register_definition(def);
        let (events, _id) = service.events().subscribe();

        let handle = service.play("battle", MusicParams::default()).unwrap();

        // main=0, intro=1, layer=2 (rack creation order)
        let main = backend.controller(0).unwrap();
        let intro = backend.controller(1).unwrap();
        let layer = backend.controller(2).unwrap();
        assert!(!main.is_playing());
        assert!(intro.is_playing());
        assert!(!intro.looping());
        assert!(!layer.is_playing());

        intro.finish();
        service.advance(&FrameTick::uniform(0.016));

        assert!(main.is_playing());
        assert!(layer.is_playing());
        assert!((layer.volume() - 0.5).abs() < 1e-5);

        let collected: Vec<MusicEvent> = events.try_iter().collect();
        assert!(collected.iter().any(|e| matches!(
            e,
            MusicEvent::IntroCompleted { handle: h, .. } if *h == handle
        )));
    }

    #[test]
    fn test_skip_intro_param() {
        let (mut service, backend) = service_with_backend(4);
        let mut def = simple_def("battle");
        def.intro_clip = Some(ClipId::from("battle_intro"));
        service.register_definition(def);

        let params = MusicParams {
            skip_intro: true,
            ..MusicParams::default()
        };
        service.play("battle", params).unwrap();

        // Only the main channel exists and it is already playing
        assert_eq!(backend.created_count(), 1);
        assert!(backend.controller(0).unwrap().is_playing());
    }

    #[test]
    fn test_beat_and_bar_events() {
        let (mut service, _backend) = service_with_backend(4);
        let mut def = simple_def("groove");
        def.bpm = 120.0;
        def.beats_per_bar = 4;
        service.register_definition(def);
        let (events, _id) = service.events().subscribe();

        service.play("groove", MusicParams::default()).unwrap();

        for _ in 0..20 {
            service.advance(&FrameTick::uniform(0.1));
        }

        let collected: Vec<MusicEvent> = events.try_iter().collect();
        let beats = collected
            .iter()
            .filter(|e| matches!(e, MusicEvent::Beat { .. }))
            .count();
        let bars = collected
            .iter()
            .filter(|e| matches!(e, MusicEvent::Bar { .. }))
            .count();

        // 2.0s at 120 BPM: beats at 0.5/1.0/1.5/2.0, one full 4/4 bar
        assert_eq!(beats, 4);
        assert_eq!(bars, 1);
    }

    #[test]
    fn test_crossfade_midpoint_and_completion() {
        let (mut service, backend) = service_with_backend(4);
        service.register_definition(simple_def("calm"));
        service.register_definition(simple_def("storm"));
        let (events, _id) = service.events().subscribe();

        let calm = service.play("calm", MusicParams::default()).unwrap();
        let storm = service
            .crossfade_to("storm", 1.0, MusicParams::default())
            .unwrap();
        assert_eq!(service.get_current(), Some(storm));

        // Incoming starts silent
        assert_eq!(backend.controller(1).unwrap().volume(), 0.0);

        service.advance(&FrameTick::uniform(0.5));
        assert!((backend.controller(0).unwrap().volume() - 0.5).abs() < 1e-5);
        assert!((backend.controller(1).unwrap().volume() - 0.5).abs() < 1e-5);

        service.advance(&FrameTick::uniform(0.5));
        assert!(!backend.controller(0).unwrap().is_playing());
        assert!((backend.controller(1).unwrap().volume() - 1.0).abs() < 1e-5);
        assert_eq!(service.active_count(), 1);

        let collected: Vec<MusicEvent> = events.try_iter().collect();
        assert!(collected
            .iter()
            .any(|e| matches!(e, MusicEvent::CrossfadeStarted { from, to } if *from == calm && *to == storm)));
        assert!(collected
            .iter()
            .any(|e| matches!(e, MusicEvent::CrossfadeCompleted { from, to } if *from == calm && *to == storm)));
    }

    #[test]
    fn test_second_crossfade_finishes_first_outgoing() {
        let (mut service, backend) = service_with_backend(4);
        service.register_definition(simple_def("calm"));
        service.register_definition(simple_def("storm"));
        service.register_definition(simple_def("boss"));
        let (events, _id) = service.events().subscribe();

        let calm = service.play("calm", MusicParams::default()).unwrap();
        service
            .crossfade_to("storm", 1.0, MusicParams::default())
            .unwrap();
        service.advance(&FrameTick::uniform(0.5));

        // Superseding crossfade: "calm" stops outright and its channel is
        // reused for the incoming track; "storm" becomes the new outgoing
        let boss = service
            .crossfade_to("boss", 1.0, MusicParams::default())
            .unwrap();
        assert!(!service.is_playing(Some("calm")));
        assert_eq!(
            backend.controller(0).unwrap().clip(),
            Some(ClipId::from("boss"))
        );

        service.advance(&FrameTick::uniform(1.0));
        assert_eq!(service.active_count(), 1);
        assert_eq!(service.get_current(), Some(boss));
        assert!(!backend.controller(1).unwrap().is_playing());
        assert!((backend.controller(0).unwrap().volume() - 1.0).abs() < 1e-5);

        let collected: Vec<MusicEvent> = events.try_iter().collect();
        assert!(collected.iter().any(|e| matches!(
            e,
            MusicEvent::Stopped { handle, .. } if *handle == calm
        )));
    }

    #[test]
    fn test_stop_during_crossfade_hands_factor_to_fade() {
        let (mut service, backend) = service_with_backend(4);
        service.register_definition(simple_def("calm"));
        service.register_definition(simple_def("storm"));

        service.play("calm", MusicParams::default()).unwrap();
        let storm = service
            .crossfade_to("storm", 1.0, MusicParams::default())
            .unwrap();
        service.advance(&FrameTick::uniform(0.5));

        // Stopping the incoming aborts the crossfade; the requested fade
        // owns the factor from here (last-writer-wins)
        service.stop(Some(storm), 0.25);
        service.advance(&FrameTick::uniform(0.125));
        assert!((backend.controller(1).unwrap().volume() - 0.25).abs() < 1e-5);

        service.advance(&FrameTick::uniform(0.2));
        assert!(!service.is_playing(Some("storm")));
        assert!(!backend.controller(1).unwrap().is_playing());

        // The aborted crossfade's other side finishes its own ramp down
        service.advance(&FrameTick::uniform(0.2));
        assert_eq!(service.active_count(), 0);
    }

    #[test]
    fn test_ducking_immediate_and_idempotent() {
        let (mut service, backend) = service_with_backend(4);
        service.register_definition(simple_def("theme"));
        service.play("theme", MusicParams::default()).unwrap();

        service.set_ducking(0.4, 0.0);
        assert!((backend.controller(0).unwrap().volume() - 0.4).abs() < 1e-6);

        // Same target again: converges and stays put
        service.set_ducking(0.4, 0.0);
        service.advance(&FrameTick::uniform(0.1));
        assert!((backend.controller(0).unwrap().volume() - 0.4).abs() < 1e-6);
        assert!((service.ducking_level() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_ducking_interpolates_over_time() {
        let (mut service, backend) = service_with_backend(4);
        service.register_definition(simple_def("theme"));
        service.play("theme", MusicParams::default()).unwrap();

        service.set_ducking(0.0, 1.0);
        service.advance(&FrameTick::uniform(0.5));
        let mid = backend.controller(0).unwrap().volume();
        assert!(mid < 1.0 && mid > 0.0);

        service.advance(&FrameTick::uniform(0.6));
        assert_eq!(backend.controller(0).unwrap().volume(), 0.0);
    }

    #[test]
    fn test_new_ducking_target_cancels_previous() {
        let (mut service, _backend) = service_with_backend(4);
        service.register_definition(simple_def("theme"));
        service.play("theme", MusicParams::default()).unwrap();

        service.set_ducking(0.0, 10.0);
        service.advance(&FrameTick::uniform(1.0));

        // Last writer wins: restore overrides the slow duck
        service.set_ducking(1.0, 0.0);
        assert_eq!(service.ducking_level(), 1.0);
    }

    #[test]
    fn test_soft_limit_reuses_first_channel() {
        let (mut service, backend) = service_with_backend(1);
        service.register_definition(simple_def("first"));
        let mut second = simple_def("second");
        second.fade_out = 5.0; // Previous track would linger, but the rack is full
        service.register_definition(second);

        let first = service.play("first", MusicParams::default()).unwrap();
        let second = service.play("second", MusicParams::default()).unwrap();

        assert_eq!(backend.created_count(), 1);
        assert!(!service.sessions.contains_key(&first));
        assert!(service.sessions.contains_key(&second));
        assert_eq!(
            backend.controller(0).unwrap().clip(),
            Some(ClipId::from("second"))
        );
    }

    #[test]
    fn test_music_fade_uses_scaled_time() {
        let (mut service, backend) = service_with_backend(4);
        let mut def = simple_def("theme");
        def.fade_in = 1.0;
        service.register_definition(def);

        service.play("theme", MusicParams::default()).unwrap();

        // Game time frozen: the music fade must NOT advance
        let frozen = FrameTick {
            scaled_dt: 0.0,
            unscaled_dt: 1.0,
        };
        service.advance(&frozen);
        assert_eq!(backend.controller(0).unwrap().volume(), 0.0);

        service.advance(&FrameTick::uniform(1.0));
        assert!((backend.controller(0).unwrap().volume() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_pause_and_resume() {
        let (mut service, backend) = service_with_backend(4);
        service.register_definition(simple_def("theme"));
        service.play("theme", MusicParams::default()).unwrap();

        service.pause();
        assert!(backend.controller(0).unwrap().is_paused());

        service.resume();
        assert!(backend.controller(0).unwrap().is_playing());
    }

    #[test]
    fn test_non_looping_track_completes_naturally() {
        let (mut service, backend) = service_with_backend(4);
        let mut def = simple_def("stinger");
        def.looping = false;
        service.register_definition(def);
        let (events, _id) = service.events().subscribe();

        let handle = service.play("stinger", MusicParams::default()).unwrap();
        backend.controller(0).unwrap().finish();
        service.advance(&FrameTick::uniform(0.016));

        assert_eq!(service.active_count(), 0);
        assert_eq!(service.get_current(), None);

        let collected: Vec<MusicEvent> = events.try_iter().collect();
        assert!(collected.iter().any(|e| matches!(
            e,
            MusicEvent::Stopped { handle: h, .. } if *h == handle
        )));
    }

    #[test]
    fn test_set_volume_scales_layers() {
        let (mut service, backend) = service_with_backend(4);
        let mut def = simple_def("theme");
        def.layers.push(MusicLayer {
            clip: ClipId::from("pad"),
            volume: 0.5,
        });
        service.register_definition(def);
        service.play("theme", MusicParams::default()).unwrap();

        service.set_volume(0.8);

        assert!((backend.controller(0).unwrap().volume() - 0.8).abs() < 1e-6);
        assert!((backend.controller(1).unwrap().volume() - 0.4).abs() < 1e-6);
    }
}
