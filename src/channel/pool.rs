/// Bounded pool of reusable playback channels
///
/// Hands channels out to playback sessions, reclaims them on release, and
/// when exhausted evicts the lowest-priority channel that is currently
/// playing. Exhaustion without an evictable channel is not an error: the
/// acquire simply fails and the caller treats the sound as dropped.
use std::collections::{HashMap, VecDeque};

use super::{ChannelFactory, ChannelId, PlaybackChannel};

/// Result of a successful acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquisition {
    /// The channel loaned to the caller
    pub channel: ChannelId,

    /// Set when the channel was reclaimed by force from a playing session;
    /// the owning service must finalize the session bound to it
    pub evicted: Option<ChannelId>,
}

/// Bounded channel pool with an idle queue and an active set
pub struct ChannelPool {
    factory: ChannelFactory,
    max_size: usize,
    channels: HashMap<ChannelId, Box<dyn PlaybackChannel>>,
    idle: VecDeque<ChannelId>,
    /// Activation order; gives eviction its deterministic tie-break
    active: Vec<ChannelId>,
    next_id: u32,
}

impl ChannelPool {
    /// Create an empty pool bounded by `max_size`
    pub fn new(max_size: usize, factory: ChannelFactory) -> Self {
        Self {
            factory,
            max_size: max_size.max(1),
            channels: HashMap::new(),
            idle: VecDeque::new(),
            active: Vec::new(),
            next_id: 0,
        }
    }

    /// Eagerly create up to `count` idle channels (bounded by `max_size`)
    pub fn prewarm(&mut self, count: usize) {
        let target = count.min(self.max_size);
        while self.channels.len() < target {
            match self.create_channel() {
                Some(id) => self.idle.push_back(id),
                None => break,
            }
        }
    }

    /// Acquire a channel: idle queue first, then growth, then eviction.
    ///
    /// Returns None when the pool is exhausted and no active channel is
    /// playing (nothing to evict) - callers treat this as "sound dropped".
    pub fn acquire(&mut self) -> Option<Acquisition> {
        if let Some(id) = self.idle.pop_front() {
            self.active.push(id);
            return Some(Acquisition {
                channel: id,
                evicted: None,
            });
        }

        if self.channels.len() < self.max_size {
            if let Some(id) = self.create_channel() {
                self.active.push(id);
                return Some(Acquisition {
                    channel: id,
                    evicted: None,
                });
            }
            // Factory failure falls through to eviction
        }

        if let Some(id) = self.pick_eviction_victim() {
            tracing::debug!("Pool exhausted, evicting {}", id);
            if let Some(channel) = self.channels.get_mut(&id) {
                Self::reset_channel(channel.as_mut());
            }
            // The victim stays in the active set; ownership just moves to
            // the new caller.
            return Some(Acquisition {
                channel: id,
                evicted: Some(id),
            });
        }

        tracing::debug!("Pool exhausted with no evictable channel, request dropped");
        None
    }

    /// Stop a channel, reset its side-state and return it to the idle queue.
    /// Idempotent: releasing an idle or unknown channel is a no-op.
    pub fn release(&mut self, id: ChannelId) {
        if !self.channels.contains_key(&id) {
            tracing::warn!("Release of unknown {} ignored", id);
            return;
        }
        if self.idle.contains(&id) {
            tracing::debug!("Double release of {} ignored", id);
            return;
        }

        if let Some(channel) = self.channels.get_mut(&id) {
            Self::reset_channel(channel.as_mut());
        }

        self.active.retain(|active| *active != id);
        self.idle.push_back(id);
    }

    /// Borrow a channel immutably
    pub fn channel(&self, id: ChannelId) -> Option<&dyn PlaybackChannel> {
        self.channels.get(&id).map(|c| c.as_ref())
    }

    /// Borrow a channel mutably
    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut (dyn PlaybackChannel + '_)> {
        self.channels
            .get_mut(&id)
            .map(|c| &mut **c as &mut dyn PlaybackChannel)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Total channels ever created (never exceeds `max_size`)
    pub fn size(&self) -> usize {
        self.channels.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn create_channel(&mut self) -> Option<ChannelId> {
        match (self.factory)() {
            Ok(channel) => {
                let id = ChannelId(self.next_id);
                self.next_id += 1;
                self.channels.insert(id, channel);
                tracing::debug!("Created {} ({}/{})", id, self.channels.len(), self.max_size);
                Some(id)
            }
            Err(e) => {
                tracing::error!("Channel factory failed: {e:#}");
                None
            }
        }
    }

    /// Lowest priority among currently-playing active channels wins;
    /// ties broken by activation order (first found).
    fn pick_eviction_victim(&self) -> Option<ChannelId> {
        let mut victim: Option<(ChannelId, i32)> = None;
        for id in &self.active {
            let Some(channel) = self.channels.get(id) else {
                continue;
            };
            if !channel.is_playing() {
                continue;
            }
            let priority = channel.priority();
            match victim {
                Some((_, best)) if priority >= best => {}
                _ => victim = Some((*id, priority)),
            }
        }
        victim.map(|(id, _)| id)
    }

    fn reset_channel(channel: &mut dyn PlaybackChannel) {
        channel.stop();
        channel.unload();
        channel.set_parent(None);
        channel.set_position([0.0; 3]);
    }
}
