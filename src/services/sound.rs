/// One-shot sound playback service
///
/// Orchestrates the full lifecycle of sound effects: definition resolution,
/// channel acquisition (with eviction of the lowest-priority playing sound
/// under overload), per-call parameter application, fade-in, completion
/// polling and lifecycle events.
///
/// Runtime failures (unknown id, missing clip, pool exhaustion) are
/// recovered locally: they log a diagnostic and return None.
use std::collections::HashMap;

use rand::Rng;

use crate::channel::{ChannelId, ChannelPool, Positioning};
use crate::clock::FrameTick;
use crate::definitions::SoundDefinition;
use crate::messaging::{EventBus, SoundEvent};
use crate::session::{Fade, SessionState, SoundHandle, SoundSession};

/// Per-call playback parameters.
///
/// Multipliers compose with the definition's base values; `positioning`
/// makes the three spatial modes mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayParams {
    /// Volume multiplier on top of the definition's base volume
    pub volume: f32,

    /// Pitch multiplier on top of the definition's base pitch
    pub pitch: f32,

    /// Loop override (None = definition default)
    pub looping: Option<bool>,

    /// Spatial placement mode
    pub positioning: Positioning,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 1.0,
            looping: None,
            positioning: Positioning::Unset,
        }
    }
}

/// Sound effect orchestration service
pub struct SoundService {
    definitions: HashMap<String, SoundDefinition>,
    pool: ChannelPool,
    sessions: HashMap<SoundHandle, SoundSession>,
    next_handle: u64,
    global_volume: f32,
    events: EventBus<SoundEvent>,
}

impl SoundService {
    /// Create a service over its own channel pool
    pub fn new(pool: ChannelPool) -> Self {
        Self {
            definitions: HashMap::new(),
            pool,
            sessions: HashMap::new(),
            next_handle: 0,
            global_volume: 1.0,
            events: EventBus::new(),
        }
    }

    /// Register a sound definition; replaces any previous one with the same id
    pub fn register_definition(&mut self, definition: SoundDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    /// Register a batch of definitions
    pub fn register_definitions(&mut self, definitions: impl IntoIterator<Item = SoundDefinition>) {
        for definition in definitions {
            self.register_definition(definition);
        }
    }

    /// The service's lifecycle event stream
    pub fn events(&self) -> &EventBus<SoundEvent> {
        &self.events
    }

    /// Start playing a registered sound.
    ///
    /// Returns None (after logging) for unknown ids, definitions without
    /// clips, and pool exhaustion - the sound is simply dropped.
    pub fn play(&mut self, id: &str, params: PlayParams) -> Option<SoundHandle> {
        let Some(definition) = self.definitions.get(id).cloned() else {
            tracing::warn!("Unknown sound id '{}', dropping play request", id);
            return None;
        };

        if definition.clips.is_empty() {
            tracing::warn!("Sound '{}' has no clips, dropping play request", id);
            return None;
        }
        let clip_index = rand::thread_rng().gen_range(0..definition.clips.len());
        let clip = definition.clips[clip_index].clone();

        let Some(acquisition) = self.pool.acquire() else {
            tracing::debug!("Channel pool exhausted, sound '{}' dropped", id);
            return None;
        };

        // An evicted channel means some other session just lost its voice;
        // finalize that session before rebinding the channel.
        if let Some(evicted) = acquisition.evicted {
            self.finalize_evicted(evicted);
        }

        let handle = SoundHandle::from_raw(self.next_handle);
        self.next_handle += 1;

        let base_volume = (definition.volume * params.volume).clamp(0.0, 1.0);
        let jitter = if definition.pitch_variance > 0.0 {
            rand::thread_rng().gen_range(-definition.pitch_variance..=definition.pitch_variance)
        } else {
            0.0
        };
        let pitch = (definition.pitch + jitter) * params.pitch;
        let looping = params.looping.unwrap_or(definition.looping);

        let channel_id = acquisition.channel;
        if let Some(channel) = self.pool.channel_mut(channel_id) {
            channel.load(&clip);
            channel.set_looping(looping);
            channel.set_pitch(pitch);
            channel.set_priority(definition.priority);
            channel.set_spatial(definition.spatial);
            channel.set_output_group(definition.output_group.as_deref());

            match params.positioning {
                Positioning::Unset => {}
                Positioning::At(position) => channel.set_position(position),
                Positioning::Follow(target) => {
                    channel.set_parent(Some(target));
                    channel.set_position([0.0; 3]);
                }
            }

            let start_volume = if definition.fade_in > 0.0 {
                0.0
            } else {
                base_volume * self.global_volume
            };
            channel.set_volume(start_volume);
            channel.play();
        }

        let mut session = SoundSession::new(handle, definition.id.clone(), channel_id, base_volume);
        if definition.fade_in > 0.0 {
            session.begin_fade(Fade::fade_in(0.0, definition.fade_in));
        }
        self.sessions.insert(handle, session);

        tracing::debug!("Sound '{}' started on {} as {:?}", id, channel_id, handle);
        self.events.publish(SoundEvent::Started {
            handle,
            definition: definition.id,
        });

        Some(handle)
    }

    /// Stop a sound, optionally fading out over `fade_out` seconds.
    ///
    /// A new stop supersedes any in-flight fade on the same handle.
    pub fn stop(&mut self, handle: SoundHandle, fade_out: f32) {
        let Some(session) = self.sessions.get_mut(&handle) else {
            tracing::debug!("Stop for unknown {:?} ignored", handle);
            return;
        };

        if fade_out > 0.0 && !session.paused {
            session.state = SessionState::FadingOut;
            let fade = Fade::fade_out(session.factor, fade_out);
            session.begin_fade(fade);
            return;
        }

        let channel = session.finalize();
        let definition = session.definition_id.clone();
        self.sessions.remove(&handle);
        if let Some(channel) = channel {
            self.pool.release(channel);
        }
        self.events.publish(SoundEvent::Stopped { handle, definition });
    }

    /// Stop every active sound (snapshot-safe against concurrent completion)
    pub fn stop_all(&mut self, fade_out: f32) {
        let handles: Vec<SoundHandle> = self.sessions.keys().copied().collect();
        for handle in handles {
            self.stop(handle, fade_out);
        }
    }

    /// Set the global volume multiplier and recompute every active
    /// session's channel volume from its stored base volume
    pub fn set_global_volume(&mut self, volume: f32) {
        self.global_volume = volume.clamp(0.0, 1.0);

        for session in self.sessions.values() {
            let Some(channel_id) = session.channel else {
                continue;
            };
            let effective = session.base_volume * self.global_volume * session.factor;
            if let Some(channel) = self.pool.channel_mut(channel_id) {
                channel.set_volume(effective);
            }
        }
    }

    pub fn global_volume(&self) -> f32 {
        self.global_volume
    }

    /// Pause every active sound
    pub fn pause_all(&mut self) {
        let handles: Vec<SoundHandle> = self.sessions.keys().copied().collect();
        for handle in handles {
            if let Some(session) = self.sessions.get_mut(&handle) {
                session.paused = true;
                if let Some(channel_id) = session.channel {
                    if let Some(channel) = self.pool.channel_mut(channel_id) {
                        channel.pause();
                    }
                }
            }
        }
    }

    /// Resume every paused sound
    pub fn resume_all(&mut self) {
        let handles: Vec<SoundHandle> = self.sessions.keys().copied().collect();
        for handle in handles {
            if let Some(session) = self.sessions.get_mut(&handle) {
                session.paused = false;
                if let Some(channel_id) = session.channel {
                    if let Some(channel) = self.pool.channel_mut(channel_id) {
                        channel.unpause();
                    }
                }
            }
        }
    }

    /// Whether any instance of the given definition is currently live
    pub fn is_playing(&self, id: &str) -> bool {
        self.sessions
            .values()
            .any(|s| s.definition_id == id && !s.is_terminal())
    }

    /// Whether the given handle still refers to a live session
    pub fn is_handle_live(&self, handle: SoundHandle) -> bool {
        self.sessions.contains_key(&handle)
    }

    /// Number of live sound sessions
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Advance fades and completion polling by one scheduler tick.
    ///
    /// Sound fades run on unscaled time so they are unaffected by game-time
    /// pausing.
    pub fn advance(&mut self, tick: &FrameTick) {
        let handles: Vec<SoundHandle> = self.sessions.keys().copied().collect();

        for handle in handles {
            let mut finished: Option<(Option<ChannelId>, SoundEvent)> = None;

            if let Some(session) = self.sessions.get_mut(&handle) {
                if session.paused {
                    continue;
                }
                let Some(channel_id) = session.channel else {
                    continue;
                };

                if let Some(fade) = session.fade.as_mut() {
                    session.factor = fade.advance(tick.unscaled_dt);
                    let complete = fade.is_complete();
                    let stops = fade.is_fade_out();

                    let effective = session.base_volume * self.global_volume * session.factor;
                    if let Some(channel) = self.pool.channel_mut(channel_id) {
                        channel.set_volume(effective);
                    }

                    if complete {
                        session.fade = None;
                        if stops {
                            let channel = session.finalize();
                            finished = Some((
                                channel,
                                SoundEvent::Stopped {
                                    handle,
                                    definition: session.definition_id.clone(),
                                },
                            ));
                        }
                    }
                }

                // Natural completion: channel reports not-playing outside a
                // user-initiated stop. Polled here because channels are not
                // assumed to emit completion callbacks.
                if finished.is_none() && !session.state.is_stopping() {
                    let playing = self
                        .pool
                        .channel(channel_id)
                        .map(|c| c.is_playing())
                        .unwrap_or(false);
                    if !playing {
                        let channel = session.finalize();
                        finished = Some((
                            channel,
                            SoundEvent::Completed {
                                handle,
                                definition: session.definition_id.clone(),
                            },
                        ));
                    }
                }
            }

            if let Some((channel, event)) = finished {
                self.sessions.remove(&handle);
                if let Some(channel) = channel {
                    self.pool.release(channel);
                }
                tracing::debug!("{}", event.description());
                self.events.publish(event);
            }
        }
    }

    /// Finalize whichever session was bound to a forcibly-reclaimed channel.
    /// The channel is NOT released: the pool already rebound it.
    fn finalize_evicted(&mut self, channel: ChannelId) {
        let Some(handle) = self
            .sessions
            .iter()
            .find(|(_, s)| s.channel == Some(channel))
            .map(|(h, _)| *h)
        else {
            return;
        };

        if let Some(mut session) = self.sessions.remove(&handle) {
            session.finalize();
            let definition = session.definition_id.clone();
            tracing::debug!("Sound '{}' evicted from {}", definition, channel);
            self.events.publish(SoundEvent::Stopped { handle, definition });
        }
    }
}
