/// Module registry and lifecycle sequencing
use std::collections::HashMap;

use crossbeam_channel::Receiver;
use semver::Version;

use super::{AudioModule, ModuleContext, ModuleState};
use crate::clock::FrameTick;
use crate::error::ModuleError;
use crate::messaging::{EventBus, ModuleEvent, MusicEvent, SoundEvent, SubscriberId};

struct ModuleEntry {
    module: Box<dyn AudioModule>,
    state: ModuleState,

    /// Bridged service event streams, held from initialize until destroy
    sound_rx: Option<(Receiver<SoundEvent>, SubscriberId)>,
    music_rx: Option<(Receiver<MusicEvent>, SubscriberId)>,
}

/// Registry of audio extension modules.
///
/// Owns every registered module and sequences its lifecycle: priority-ordered
/// initialization with dependency and host-version gating, per-tick updates
/// for enabled modules, and reverse-initialization-order teardown. Any
/// failure inside a module callback is caught, logged and reported on the
/// module event bus without affecting other modules.
pub struct ModuleRegistry {
    entries: HashMap<String, ModuleEntry>,

    /// Successful initialization order; teardown walks it in reverse
    init_order: Vec<String>,

    host_version: Version,
    events: EventBus<ModuleEvent>,
}

impl ModuleRegistry {
    pub fn new(host_version: Version) -> Self {
        Self {
            entries: HashMap::new(),
            init_order: Vec::new(),
            host_version,
            events: EventBus::new(),
        }
    }

    /// The module lifecycle event stream
    pub fn events(&self) -> &EventBus<ModuleEvent> {
        &self.events
    }

    pub fn host_version(&self) -> &Version {
        &self.host_version
    }

    /// Register a module instance. Duplicate ids are rejected: the first
    /// registration wins and later attempts are logged and dropped.
    pub fn register(&mut self, module: Box<dyn AudioModule>) -> bool {
        let descriptor = module.descriptor();
        let id = descriptor.id.clone();

        if self.entries.contains_key(&id) {
            tracing::warn!("Module '{}' already registered, ignoring duplicate", id);
            return false;
        }

        tracing::info!("Module '{}' ({}) registered", id, descriptor.name);
        self.entries.insert(
            id.clone(),
            ModuleEntry {
                module,
                state: ModuleState::Registered,
                sound_rx: None,
                music_rx: None,
            },
        );
        self.events.publish(ModuleEvent::Discovered { id });
        true
    }

    /// Initialize every registered module in descending priority order.
    ///
    /// Modules with missing dependencies or a failed compatibility check
    /// stay `Registered`; auto-enable modules are enabled on success.
    pub fn initialize_all(&mut self, ctx: &mut ModuleContext) {
        let mut pending: Vec<(String, i32)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.state == ModuleState::Registered)
            .map(|(id, e)| (id.clone(), e.module.descriptor().priority))
            .collect();
        // Stable order for equal priorities
        pending.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        for (id, _) in pending {
            self.initialize_module(&id, ctx);
        }
    }

    fn initialize_module(&mut self, id: &str, ctx: &mut ModuleContext) {
        let Some(entry) = self.entries.get(id) else {
            return;
        };
        let descriptor = entry.module.descriptor();

        let missing: Vec<String> = descriptor
            .dependencies
            .iter()
            .filter(|dep| !self.entries.contains_key(*dep))
            .cloned()
            .collect();
        if !missing.is_empty() {
            tracing::warn!("Module '{}' missing dependencies: {:?}", id, missing);
            self.events.publish(ModuleEvent::DependenciesFailed {
                id: id.to_string(),
                missing,
            });
            return;
        }
        self.events.publish(ModuleEvent::DependenciesResolved {
            id: id.to_string(),
        });

        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };

        // A version rejection is a quiet opt-out, not a failure
        if !entry.module.compatible_with(&self.host_version) {
            tracing::info!(
                "Module '{}' rejected host version {}, leaving registered",
                id,
                self.host_version
            );
            return;
        }

        match entry.module.initialize(ctx) {
            Ok(()) => {
                entry.state = ModuleState::Initialized;
                if entry.module.wants_sound_events() {
                    entry.sound_rx = Some(ctx.sound.events().subscribe());
                }
                if entry.module.wants_music_events() {
                    entry.music_rx = Some(ctx.music.events().subscribe());
                }

                self.init_order.push(id.to_string());
                tracing::info!("Module '{}' initialized", id);
                self.events.publish(ModuleEvent::Initialized {
                    id: id.to_string(),
                });

                if descriptor.auto_enable {
                    if let Err(e) = self.enable(id, ctx) {
                        tracing::error!("Auto-enable of '{}' failed: {}", id, e);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Module '{}' initialization failed: {e:#}", id);
                self.events.publish(ModuleEvent::InitFailed {
                    id: id.to_string(),
                    reason: format!("{e:#}"),
                });
            }
        }
    }

    /// Enable an initialized (or disabled) module.
    ///
    /// An enable callback failure is isolated and reported; only calling
    /// from the wrong lifecycle state is an error.
    pub fn enable(&mut self, id: &str, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        let Some(entry) = self.entries.get_mut(id) else {
            return Err(ModuleError::UnknownModule(id.to_string()));
        };

        match entry.state {
            ModuleState::Initialized | ModuleState::Disabled => {}
            from => {
                return Err(ModuleError::InvalidTransition {
                    id: id.to_string(),
                    from,
                    action: "enable",
                })
            }
        }

        match entry.module.enable(ctx) {
            Ok(()) => {
                entry.state = ModuleState::Enabled;
                tracing::info!("Module '{}' enabled", id);
                self.events.publish(ModuleEvent::Enabled { id: id.to_string() });
            }
            Err(e) => {
                tracing::error!("Module '{}' enable failed: {e:#}", id);
                self.events.publish(ModuleEvent::LifecycleFailed {
                    id: id.to_string(),
                    phase: "enable",
                    reason: format!("{e:#}"),
                });
            }
        }
        Ok(())
    }

    /// Disable an enabled module
    pub fn disable(&mut self, id: &str, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        let Some(entry) = self.entries.get_mut(id) else {
            return Err(ModuleError::UnknownModule(id.to_string()));
        };

        if entry.state != ModuleState::Enabled {
            return Err(ModuleError::InvalidTransition {
                id: id.to_string(),
                from: entry.state,
                action: "disable",
            });
        }

        match entry.module.disable(ctx) {
            Ok(()) => {
                entry.state = ModuleState::Disabled;
                tracing::info!("Module '{}' disabled", id);
                self.events
                    .publish(ModuleEvent::Disabled { id: id.to_string() });
            }
            Err(e) => {
                tracing::error!("Module '{}' disable failed: {e:#}", id);
                entry.state = ModuleState::Disabled;
                self.events.publish(ModuleEvent::LifecycleFailed {
                    id: id.to_string(),
                    phase: "disable",
                    reason: format!("{e:#}"),
                });
            }
        }
        Ok(())
    }

    /// Destroy a module: disable it if needed, unsubscribe its bridged
    /// event streams, run its destroy callback and drop it from the
    /// registry. Modules that never initialized are dropped without
    /// callbacks.
    pub fn destroy(&mut self, id: &str, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        let state = match self.entries.get(id) {
            Some(entry) => entry.state,
            None => return Err(ModuleError::UnknownModule(id.to_string())),
        };

        if state == ModuleState::Enabled {
            let _ = self.disable(id, ctx);
        }

        let Some(mut entry) = self.entries.remove(id) else {
            return Err(ModuleError::UnknownModule(id.to_string()));
        };

        // Unsubscribe before the destroy callback so no event can reach a
        // module mid-teardown
        if let Some((_, subscription)) = entry.sound_rx.take() {
            ctx.sound.events().unsubscribe(subscription);
        }
        if let Some((_, subscription)) = entry.music_rx.take() {
            ctx.music.events().unsubscribe(subscription);
        }

        if state != ModuleState::Registered {
            if let Err(e) = entry.module.destroy(ctx) {
                tracing::error!("Module '{}' destroy failed: {e:#}", id);
                self.events.publish(ModuleEvent::LifecycleFailed {
                    id: id.to_string(),
                    phase: "destroy",
                    reason: format!("{e:#}"),
                });
            }
        }

        self.init_order.retain(|m| m != id);
        tracing::info!("Module '{}' destroyed", id);
        self.events
            .publish(ModuleEvent::Destroyed { id: id.to_string() });
        Ok(())
    }

    /// Drive enabled modules for one scheduler tick: deliver bridged sound
    /// and music events, then call `update`. A failing update is logged and
    /// reported without stopping other modules or future ticks.
    pub fn update_all(&mut self, ctx: &mut ModuleContext, tick: &FrameTick) {
        let ids = self.init_order.clone();
        for id in ids {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };

            // Drain bridged streams even when not enabled so the queues
            // stay bounded; events arriving while disabled are discarded
            let sound_batch: Vec<SoundEvent> = entry
                .sound_rx
                .as_ref()
                .map(|(rx, _)| rx.try_iter().collect())
                .unwrap_or_default();
            let music_batch: Vec<MusicEvent> = entry
                .music_rx
                .as_ref()
                .map(|(rx, _)| rx.try_iter().collect())
                .unwrap_or_default();

            if entry.state != ModuleState::Enabled {
                continue;
            }

            for event in &sound_batch {
                entry.module.on_sound_event(ctx, event);
            }
            for event in &music_batch {
                entry.module.on_music_event(ctx, event);
            }

            if let Err(e) = entry.module.update(ctx, tick) {
                tracing::error!("Module '{}' update failed: {e:#}", id);
                self.events.publish(ModuleEvent::LifecycleFailed {
                    id: id.clone(),
                    phase: "update",
                    reason: format!("{e:#}"),
                });
            }
        }
    }

    /// Destroy every module (reverse initialization order, then modules
    /// that never initialized) and empty the registry.
    pub fn shutdown(&mut self, ctx: &mut ModuleContext) {
        let order: Vec<String> = self.init_order.iter().rev().cloned().collect();
        for id in order {
            let _ = self.destroy(&id, ctx);
        }

        let leftovers: Vec<String> = self.entries.keys().cloned().collect();
        for id in leftovers {
            let _ = self.destroy(&id, ctx);
        }

        self.init_order.clear();
        tracing::info!("Module registry shut down");
    }

    /// Lifecycle state of a module, if registered
    pub fn state(&self, id: &str) -> Option<ModuleState> {
        self.entries.get(id).map(|e| e.state)
    }

    pub fn module_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::channel::{ChannelPool, NullBackend};
    use crate::definitions::SoundDefinition;
    use crate::modules::ModuleDescriptor;
    use crate::services::{MusicService, PlayParams, SoundService};

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct TestModule {
        descriptor: ModuleDescriptor,
        log: CallLog,
        fail_init: bool,
        fail_enable: bool,
        fail_update: bool,
        wants_sound: bool,
        wants_music: bool,
    }

    impl TestModule {
        fn new(id: &str, log: &CallLog) -> Self {
            Self {
                descriptor: ModuleDescriptor::new(id, id),
                log: Arc::clone(log),
                fail_init: false,
                fail_enable: false,
                fail_update: false,
                wants_sound: false,
                wants_music: false,
            }
        }

        fn boxed(self) -> Box<dyn AudioModule> {
            Box::new(self)
        }

        fn record(&self, phase: &str) {
            self.log
                .lock()
                .push(format!("{}:{}", phase, self.descriptor.id));
        }
    }

    impl AudioModule for TestModule {
        fn descriptor(&self) -> ModuleDescriptor {
            self.descriptor.clone()
        }

        fn wants_sound_events(&self) -> bool {
            self.wants_sound
        }

        fn wants_music_events(&self) -> bool {
            self.wants_music
        }

        fn initialize(&mut self, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
            self.record("init");
            if self.fail_init {
                anyhow::bail!("init exploded");
            }
            Ok(())
        }

        fn enable(&mut self, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
            self.record("enable");
            if self.fail_enable {
                anyhow::bail!("enable exploded");
            }
            Ok(())
        }

        fn disable(&mut self, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
            self.record("disable");
            Ok(())
        }

        fn update(&mut self, _ctx: &mut ModuleContext, _tick: &FrameTick) -> anyhow::Result<()> {
            self.record("update");
            if self.fail_update {
                anyhow::bail!("update exploded");
            }
            Ok(())
        }

        fn destroy(&mut self, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
            self.record("destroy");
            Ok(())
        }

        fn on_sound_event(&mut self, _ctx: &mut ModuleContext, event: &SoundEvent) {
            self.log.lock().push(format!(
                "sound-event:{}:{}",
                self.descriptor.id,
                event.description()
            ));
        }

        fn on_music_event(&mut self, _ctx: &mut ModuleContext, event: &MusicEvent) {
            self.log.lock().push(format!(
                "music-event:{}:{}",
                self.descriptor.id,
                event.description()
            ));
        }
    }

    struct Harness {
        sound: SoundService,
        music: MusicService,
    }

    impl Harness {
        fn new() -> Self {
            let backend = NullBackend::new();
            Self {
                sound: SoundService::new(ChannelPool::new(4, backend.factory())),
                music: MusicService::new(4, backend.factory()),
            }
        }

        fn ctx(&mut self) -> ModuleContext<'_> {
            ModuleContext {
                sound: &mut self.sound,
                music: &mut self.music,
            }
        }
    }

    fn registry() -> ModuleRegistry {
        ModuleRegistry::new(Version::new(1, 0, 0))
    }

    #[test]
    fn test_duplicate_registration_first_wins() {
        let log = CallLog::default();
        let mut registry = registry();

        assert!(registry.register(TestModule::new("echo", &log).boxed()));
        assert!(!registry.register(TestModule::new("echo", &log).boxed()));
        assert_eq!(registry.module_count(), 1);
    }

    #[test]
    fn test_initialization_priority_descending() {
        let log = CallLog::default();
        let mut harness = Harness::new();
        let mut registry = registry();

        let mut low = TestModule::new("low", &log);
        low.descriptor = low.descriptor.with_priority(1);
        let mut high = TestModule::new("high", &log);
        high.descriptor = high.descriptor.with_priority(10);

        registry.register(low.boxed());
        registry.register(high.boxed());
        registry.initialize_all(&mut harness.ctx());

        assert_eq!(*log.lock(), vec!["init:high", "init:low"]);
    }

    #[test]
    fn test_dependency_gating() {
        let log = CallLog::default();
        let mut harness = Harness::new();
        let mut registry = registry();
        let (events, _id) = registry.events().subscribe();

        let mut module = TestModule::new("occlusion", &log);
        module.descriptor = module
            .descriptor
            .with_dependencies(vec!["raycast".to_string()]);
        registry.register(module.boxed());
        registry.initialize_all(&mut harness.ctx());

        assert_eq!(registry.state("occlusion"), Some(ModuleState::Registered));
        assert!(log.lock().is_empty()); // Initialize never ran

        let collected: Vec<ModuleEvent> = events.try_iter().collect();
        assert!(collected.iter().any(|e| matches!(
            e,
            ModuleEvent::DependenciesFailed { id, missing }
                if id == "occlusion" && missing == &["raycast".to_string()]
        )));
    }

    #[test]
    fn test_dependency_needs_registration_not_initialization() {
        let log = CallLog::default();
        let mut harness = Harness::new();
        let mut registry = registry();

        // "consumer" depends on "provider"; provider fails its own init but
        // is registered, which is all the dependency check requires
        let mut provider = TestModule::new("provider", &log);
        provider.descriptor = provider.descriptor.with_priority(10);
        provider.fail_init = true;
        let mut consumer = TestModule::new("consumer", &log);
        consumer.descriptor = consumer
            .descriptor
            .with_dependencies(vec!["provider".to_string()]);

        registry.register(provider.boxed());
        registry.register(consumer.boxed());
        registry.initialize_all(&mut harness.ctx());

        assert_eq!(registry.state("provider"), Some(ModuleState::Registered));
        assert_eq!(registry.state("consumer"), Some(ModuleState::Initialized));
    }

    #[test]
    fn test_compatibility_rejection_is_quiet() {
        let log = CallLog::default();
        let mut harness = Harness::new();
        let mut registry = registry();
        let (events, _id) = registry.events().subscribe();

        let mut module = TestModule::new("future", &log);
        module.descriptor = module.descriptor.with_min_host_version(Version::new(2, 0, 0));
        registry.register(module.boxed());
        registry.initialize_all(&mut harness.ctx());

        assert_eq!(registry.state("future"), Some(ModuleState::Registered));
        let collected: Vec<ModuleEvent> = events.try_iter().collect();
        assert!(!collected
            .iter()
            .any(|e| matches!(e, ModuleEvent::InitFailed { .. })));
    }

    #[test]
    fn test_init_failure_is_isolated() {
        let log = CallLog::default();
        let mut harness = Harness::new();
        let mut registry = registry();
        let (events, _id) = registry.events().subscribe();

        // The failing module initializes first (higher priority) and must
        // not affect the healthy one
        let mut broken = TestModule::new("broken", &log);
        broken.descriptor = broken.descriptor.with_priority(10);
        broken.fail_init = true;
        let mut healthy = TestModule::new("healthy", &log);
        healthy.descriptor = healthy.descriptor.with_auto_enable(true);

        registry.register(broken.boxed());
        registry.register(healthy.boxed());
        registry.initialize_all(&mut harness.ctx());

        assert_eq!(registry.state("broken"), Some(ModuleState::Registered));
        assert_eq!(registry.state("healthy"), Some(ModuleState::Enabled));

        let collected: Vec<ModuleEvent> = events.try_iter().collect();
        assert!(collected.iter().any(|e| matches!(
            e,
            ModuleEvent::InitFailed { id, .. } if id == "broken"
        )));
    }

    #[test]
    fn test_enable_before_init_is_error() {
        let log = CallLog::default();
        let mut harness = Harness::new();
        let mut registry = registry();

        registry.register(TestModule::new("echo", &log).boxed());

        let result = registry.enable("echo", &mut harness.ctx());
        assert!(matches!(
            result,
            Err(ModuleError::InvalidTransition { action: "enable", .. })
        ));
    }

    #[test]
    fn test_unknown_module_error() {
        let mut harness = Harness::new();
        let mut registry = registry();

        assert!(matches!(
            registry.enable("nope", &mut harness.ctx()),
            Err(ModuleError::UnknownModule(_))
        ));
    }

    #[test]
    fn test_enable_disable_cycle() {
        let log = CallLog::default();
        let mut harness = Harness::new();
        let mut registry = registry();

        registry.register(TestModule::new("echo", &log).boxed());
        registry.initialize_all(&mut harness.ctx());

        registry.enable("echo", &mut harness.ctx()).unwrap();
        assert_eq!(registry.state("echo"), Some(ModuleState::Enabled));

        registry.disable("echo", &mut harness.ctx()).unwrap();
        assert_eq!(registry.state("echo"), Some(ModuleState::Disabled));

        // Re-enable from Disabled is legal; a second disable is not
        registry.enable("echo", &mut harness.ctx()).unwrap();
        registry.disable("echo", &mut harness.ctx()).unwrap();
        assert!(registry.disable("echo", &mut harness.ctx()).is_err());
    }

    #[test]
    fn test_update_only_reaches_enabled_modules() {
        let log = CallLog::default();
        let mut harness = Harness::new();
        let mut registry = registry();

        let mut active = TestModule::new("active", &log);
        active.descriptor = active.descriptor.with_auto_enable(true);
        registry.register(active.boxed());
        registry.register(TestModule::new("dormant", &log).boxed());
        registry.initialize_all(&mut harness.ctx());

        registry.update_all(&mut harness.ctx(), &FrameTick::uniform(0.016));

        let calls = log.lock();
        assert!(calls.contains(&"update:active".to_string()));
        assert!(!calls.contains(&"update:dormant".to_string()));
    }

    #[test]
    fn test_update_failure_is_isolated() {
        let log = CallLog::default();
        let mut harness = Harness::new();
        let mut registry = registry();
        let (events, _id) = registry.events().subscribe();

        let mut broken = TestModule::new("broken", &log);
        broken.descriptor = broken.descriptor.with_priority(10).with_auto_enable(true);
        broken.fail_update = true;
        let mut healthy = TestModule::new("healthy", &log);
        healthy.descriptor = healthy.descriptor.with_auto_enable(true);

        registry.register(broken.boxed());
        registry.register(healthy.boxed());
        registry.initialize_all(&mut harness.ctx());

        registry.update_all(&mut harness.ctx(), &FrameTick::uniform(0.016));
        registry.update_all(&mut harness.ctx(), &FrameTick::uniform(0.016));

        let calls = log.lock();
        assert_eq!(
            calls.iter().filter(|c| *c == "update:healthy").count(),
            2 // The broken sibling never stops healthy updates
        );
        drop(calls);

        let collected: Vec<ModuleEvent> = events.try_iter().collect();
        assert!(collected.iter().any(|e| matches!(
            e,
            ModuleEvent::LifecycleFailed { id, phase: "update", .. } if id == "broken"
        )));
    }

    #[test]
    fn test_sound_event_bridging() {
        let log = CallLog::default();
        let mut harness = Harness::new();
        let mut registry = registry();

        let mut listener = TestModule::new("listener", &log);
        listener.descriptor = listener.descriptor.with_auto_enable(true);
        listener.wants_sound = true;
        registry.register(listener.boxed());
        registry.initialize_all(&mut harness.ctx());

        harness
            .sound
            .register_definition(SoundDefinition::new("footstep", "footstep.ogg".into()));
        harness.sound.play("footstep", PlayParams::default());

        registry.update_all(&mut harness.ctx(), &FrameTick::uniform(0.016));

        let calls = log.lock();
        assert!(calls
            .iter()
            .any(|c| c.starts_with("sound-event:listener") && c.contains("footstep")));
    }

    #[test]
    fn test_destroy_unsubscribes_bridges() {
        let log = CallLog::default();
        let mut harness = Harness::new();
        let mut registry = registry();

        let mut listener = TestModule::new("listener", &log);
        listener.wants_sound = true;
        listener.wants_music = true;
        registry.register(listener.boxed());
        registry.initialize_all(&mut harness.ctx());

        assert_eq!(harness.sound.events().subscriber_count(), 1);
        assert_eq!(harness.music.events().subscriber_count(), 1);

        registry.destroy("listener", &mut harness.ctx()).unwrap();

        assert_eq!(harness.sound.events().subscriber_count(), 0);
        assert_eq!(harness.music.events().subscriber_count(), 0);
        assert_eq!(registry.module_count(), 0);
    }

    #[test]
    fn test_shutdown_destroys_in_reverse_init_order() {
        let log = CallLog::default();
        let mut harness = Harness::new();
        let mut registry = registry();

        let mut first = TestModule::new("first", &log);
        first.descriptor = first.descriptor.with_priority(10).with_auto_enable(true);
        let mut second = TestModule::new("second", &log);
        second.descriptor = second.descriptor.with_priority(5);

        registry.register(first.boxed());
        registry.register(second.boxed());
        registry.initialize_all(&mut harness.ctx());
        registry.shutdown(&mut harness.ctx());

        assert!(registry.is_empty());
        let calls = log.lock();
        let destroys: Vec<&String> = calls.iter().filter(|c| c.starts_with("destroy")).collect();
        assert_eq!(destroys, vec!["destroy:second", "destroy:first"]);
        // Enabled modules are disabled on the way down
        assert!(calls.contains(&"disable:first".to_string()));
    }
}
