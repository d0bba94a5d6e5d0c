//! Follower coordination engine
//!
//! Owns the scheduler, the per-follower coordination state and the role
//! server. Everything that mutates coordination state runs on the engine's
//! own task; the host frame thread only touches shared settings and
//! debounced triggers, and reads the coordination state through a `watch`.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::adapters::{
    hover_to, CursorInput, HeadlessWorld, HotkeyLatch, KeyboardState, LoggingCursor,
    PlanarProjector, ScreenProjector, WorldView,
};
use crate::config::{AppConfig, Role};
use crate::coordination::{
    CooperativeScheduler, DebounceRegistry, NearbyScanTask, NetworkRequestTask, RoleController,
    RoleTransition, ScheduledTask, ServerTask, TaskControl,
};
use crate::domain::FollowerCoordinationState;
use crate::error::{FollowerError, Result};
use crate::services::{RoleServer, SyncClient};
use crate::settings::{RuntimeSettings, SharedSettings};

pub const TRIGGER_PROPAGATE: &str = "propagate-working";
pub const TRIGGER_START_REQUESTING: &str = "start-network-requesting";
pub const TRIGGER_DEBUG_HOVER: &str = "debug-hover-to-leader";

const HOTKEY_DEBOUNCE: Duration = Duration::from_millis(1000);
const DEBUG_HOVER_DEBOUNCE: Duration = Duration::from_millis(50);
const COMMAND_BUFFER: usize = 16;

/// Everything the looping tasks read and mutate
pub struct EngineContext {
    pub settings: SharedSettings,
    pub state: FollowerCoordinationState,
    pub sync: SyncClient,
    pub server: Box<dyn RoleServer>,
    pub world: Arc<dyn WorldView>,
    /// Area hash seen by the previous nearby scan
    pub last_area_hash: Option<u32>,
}

/// Host-provided collaborators
#[derive(Clone)]
pub struct Adapters {
    pub world: Arc<dyn WorldView>,
    pub projector: Arc<dyn ScreenProjector>,
    pub cursor: Arc<dyn CursorInput>,
}

impl Adapters {
    /// In-memory world with a planar projection and a logging cursor
    pub fn headless(world: Arc<HeadlessWorld>) -> Self {
        Self {
            world,
            projector: Arc::new(PlanarProjector),
            cursor: Arc::new(LoggingCursor),
        }
    }
}

#[derive(Debug, Clone)]
struct HotkeyBindings {
    propagate: String,
    start_requesting: String,
    debug_hover: String,
}

/// Requests handled on the engine task
pub enum EngineCommand {
    SetRole {
        value: String,
        reply: oneshot::Sender<Result<RoleTransition>>,
    },
    SetFollowerMode {
        value: String,
        reply: oneshot::Sender<Result<RoleTransition>>,
    },
}

pub struct FollowerEngine {
    scheduler: CooperativeScheduler<EngineContext>,
    ctx: EngineContext,
    controller: RoleController,
    triggers: Arc<DebounceRegistry>,
    initial_role: Role,
    hotkeys: HotkeyBindings,
    commands_tx: mpsc::Sender<EngineCommand>,
    commands_rx: mpsc::Receiver<EngineCommand>,
    state_tx: watch::Sender<FollowerCoordinationState>,
}

impl FollowerEngine {
    /// Build the engine with all three tasks registered and running
    pub fn new(config: &AppConfig, adapters: Adapters, server: Box<dyn RoleServer>) -> Result<Self> {
        let settings = SharedSettings::new(RuntimeSettings::from_config(config));
        Self::with_settings(config, settings, adapters, server)
    }

    /// Same as [`new`](Self::new) around settings the server already shares
    pub fn with_settings(
        config: &AppConfig,
        settings: SharedSettings,
        adapters: Adapters,
        server: Box<dyn RoleServer>,
    ) -> Result<Self> {
        let initial_role = settings.read().role;

        let triggers = Arc::new(DebounceRegistry::new());
        register_triggers(&triggers, &settings, &adapters);

        let mut scheduler = CooperativeScheduler::new();
        scheduler.add(Box::new(NearbyScanTask), true);
        scheduler.add(Box::new(NetworkRequestTask), true);
        scheduler.add(Box::new(ServerTask), true);

        let state = FollowerCoordinationState::new();
        let (state_tx, _) = watch::channel(state.clone());
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);

        Ok(Self {
            scheduler,
            ctx: EngineContext {
                settings: settings.clone(),
                state,
                sync: SyncClient::new()?,
                server,
                world: adapters.world,
                last_area_hash: None,
            },
            controller: RoleController::new(settings),
            triggers,
            initial_role,
            hotkeys: HotkeyBindings {
                propagate: config.leader.propagate_hotkey.clone(),
                start_requesting: config.follower.start_requesting_hotkey.clone(),
                debug_hover: config.input.debug_hover_key.clone(),
            },
            commands_tx,
            commands_rx,
            state_tx,
        })
    }

    /// Apply the configured role, starting the server when leading
    pub async fn initialize(&mut self) -> Result<RoleTransition> {
        let role = self.initial_role;
        self.controller
            .apply_role(role, self.ctx.server.as_mut())
            .await
    }

    pub fn settings(&self) -> SharedSettings {
        self.ctx.settings.clone()
    }

    pub fn state(&self) -> &FollowerCoordinationState {
        &self.ctx.state
    }

    pub fn server(&self) -> &dyn RoleServer {
        self.ctx.server.as_ref()
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            commands: self.commands_tx.clone(),
            settings: self.ctx.settings.clone(),
            world: Arc::clone(&self.ctx.world),
            state: self.state_tx.subscribe(),
        }
    }

    /// Hooks the host calls once per rendered frame
    pub fn frame_hooks(&self) -> FrameHooks {
        FrameHooks {
            triggers: Arc::clone(&self.triggers),
            settings: self.ctx.settings.clone(),
            hotkeys: self.hotkeys.clone(),
            propagate_latch: HotkeyLatch::new(),
            start_requesting_latch: HotkeyLatch::new(),
        }
    }

    /// Register an extra looping task
    pub fn add_task(&mut self, task: Box<dyn ScheduledTask<EngineContext>>, running: bool) -> TaskControl {
        self.scheduler.add(task, running)
    }

    pub fn start_task(&mut self, name: &str) -> bool {
        self.scheduler.start(name)
    }

    pub fn stop_task(&self, name: &str) -> bool {
        self.scheduler.stop(name)
    }

    pub async fn change_role(&mut self, value: &str) -> Result<RoleTransition> {
        self.controller
            .change_role(value, self.ctx.server.as_mut())
            .await
    }

    pub async fn change_follower_mode(&mut self, value: &str) -> Result<RoleTransition> {
        self.controller
            .change_follower_mode(value, self.ctx.server.as_mut())
            .await
    }

    /// Tick every task due at `now` and publish the resulting state
    pub async fn run_once(&mut self, now: Instant) -> usize {
        let ran = self.scheduler.run_due(&mut self.ctx, now).await;
        let state = &self.ctx.state;
        self.state_tx.send_if_modified(|published| {
            if *published == *state {
                return false;
            }
            *published = state.clone();
            true
        });
        ran
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::SetRole { value, reply } => {
                let result = self.change_role(&value).await;
                let _ = reply.send(result);
            }
            EngineCommand::SetFollowerMode { value, reply } => {
                let result = self.change_follower_mode(&value).await;
                let _ = reply.send(result);
            }
        }
    }

    /// Drive tasks and commands until `shutdown` flips, then stop the server
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Follower engine running");

        while !*shutdown.borrow() {
            let wake = self.scheduler.wake_deadline();

            tokio::select! {
                _ = tokio::time::sleep_until(wake.into()) => {
                    self.run_once(Instant::now()).await;
                }
                Some(command) = self.commands_rx.recv() => {
                    self.handle_command(command).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Follower engine shutting down");
        self.ctx.server.stop().await;
    }
}

fn register_triggers(triggers: &DebounceRegistry, settings: &SharedSettings, adapters: &Adapters) {
    let s = settings.clone();
    triggers.register(TRIGGER_PROPAGATE, HOTKEY_DEBOUNCE, move || {
        let mut settings = s.write();
        settings.propagate_working = !settings.propagate_working;
        info!("Propagate working: {}", settings.propagate_working);
    });

    let s = settings.clone();
    triggers.register(TRIGGER_START_REQUESTING, HOTKEY_DEBOUNCE, move || {
        let mut settings = s.write();
        settings.start_network_requesting = !settings.start_network_requesting;
        info!("Start network requesting: {}", settings.start_network_requesting);
    });

    let s = settings.clone();
    let adapters = adapters.clone();
    triggers.register(TRIGGER_DEBUG_HOVER, DEBUG_HOVER_DEBOUNCE, move || {
        let (leader, offset) = {
            let settings = s.read();
            (
                settings.targeting.leader_name.clone(),
                settings.random_click_offset,
            )
        };
        match adapters.world.find_player(&leader) {
            Some(entity) => {
                hover_to(
                    &entity,
                    adapters.projector.as_ref(),
                    adapters.cursor.as_ref(),
                    offset,
                );
            }
            None => debug!("Leader {:?} not found for hover", leader),
        }
    });
}

/// Per-frame input hooks for the host's render thread
pub struct FrameHooks {
    triggers: Arc<DebounceRegistry>,
    settings: SharedSettings,
    hotkeys: HotkeyBindings,
    propagate_latch: HotkeyLatch,
    start_requesting_latch: HotkeyLatch,
}

impl FrameHooks {
    pub fn on_frame(&mut self, keys: &dyn KeyboardState) {
        if self
            .propagate_latch
            .pressed_once(keys.is_key_down(&self.hotkeys.propagate))
        {
            self.triggers.call(TRIGGER_PROPAGATE);
        }

        if self
            .start_requesting_latch
            .pressed_once(keys.is_key_down(&self.hotkeys.start_requesting))
        {
            self.triggers.call(TRIGGER_START_REQUESTING);
        }

        let debug = self.settings.read().debug;
        if debug && keys.is_key_down(&self.hotkeys.debug_hover) {
            self.triggers.call(TRIGGER_DEBUG_HOVER);
        }
    }
}

/// Cloneable handle for UI and CLI callers
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    settings: SharedSettings,
    world: Arc<dyn WorldView>,
    state: watch::Receiver<FollowerCoordinationState>,
}

impl EngineHandle {
    pub async fn set_role(&self, value: &str) -> Result<RoleTransition> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetRole {
            value: value.to_string(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| FollowerError::Internal("engine dropped role change".to_string()))?
    }

    pub async fn set_follower_mode(&self, value: &str) -> Result<RoleTransition> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetFollowerMode {
            value: value.to_string(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| FollowerError::Internal("engine dropped mode change".to_string()))?
    }

    async fn send(&self, command: EngineCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| {
            error!("Engine is not running");
            FollowerError::Internal("engine is not running".to_string())
        })
    }

    /// Follow a player picked from the nearby list; blank names are ignored.
    /// The selection is cleared either way.
    pub fn select_nearby_player(&self, name: &str) -> bool {
        let mut settings = self.settings.write();
        settings.nearby_selection.clear();
        if name.is_empty() {
            return false;
        }
        settings.targeting.leader_name = name.to_string();
        info!("Following {}", name);
        true
    }

    /// Broadcast the local player as leader
    pub fn set_myself_as_leader(&self) -> Option<String> {
        let Some(name) = self.world.local_player_name() else {
            warn!("Local player is not loaded, cannot set as leader");
            return None;
        };
        self.settings.write().leader_name_to_propagate = name.clone();
        info!("Propagating {} as leader", name);
        Some(name)
    }

    pub fn settings(&self) -> SharedSettings {
        self.settings.clone()
    }

    /// Latest coordination state published by the engine
    pub fn coordination_state(&self) -> FollowerCoordinationState {
        self.state.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{EntitySnapshot, Vector2};
    use crate::config::FollowerMode;
    use crate::coordination::tasks::tests::CountingServer;
    use crate::domain::{ActionKind, Vector3};
    use axum::{routing::get, Router};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn leader_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.role = "leader".to_string();
        config
    }

    fn engine_with(config: &AppConfig, server: CountingServer) -> (FollowerEngine, Arc<HeadlessWorld>) {
        let world = Arc::new(HeadlessWorld::new(Some("Me".to_string())));
        let engine = FollowerEngine::new(
            config,
            Adapters::headless(Arc::clone(&world)),
            Box::new(server),
        )
        .unwrap();
        (engine, world)
    }

    /// Loopback endpoint that counts hits and always answers with Bob/40
    async fn counting_leader() -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let h = Arc::clone(&hits);
        let app = Router::new().route(
            "/status",
            get(move || {
                let h = Arc::clone(&h);
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    r#"{"leaderName":"Bob","leaderProximityRadius":40}"#
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/status"), hits)
    }

    #[tokio::test]
    async fn test_initialize_applies_configured_role() {
        let server = CountingServer::default();
        let starts = Arc::clone(&server.starts);
        let (mut engine, _world) = engine_with(&leader_config(), server);

        let transition = engine.initialize().await.unwrap();

        assert_eq!(transition.to, Role::Leader);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(engine.server().is_running());
    }

    #[tokio::test]
    async fn test_leader_to_disabled_silences_both_sides() {
        let server = CountingServer::default();
        let rounds = Arc::clone(&server.rounds);
        let (mut engine, _world) = engine_with(&leader_config(), server);
        let (url, hits) = counting_leader().await;
        engine.settings().write().url = url;
        engine.initialize().await.unwrap();

        let t0 = Instant::now();
        engine.run_once(t0).await;
        assert_eq!(rounds.load(Ordering::SeqCst), 1);

        let transition = engine.change_role("disabled").await.unwrap();
        assert!(!transition.server_running);
        assert!(!engine.settings().read().start_network_requesting);

        // Flip individual flags back on; the role alone keeps both sides inert.
        {
            let settings = engine.settings();
            let mut s = settings.write();
            s.start_network_requesting = true;
            s.follower_mode = FollowerMode::Network;
            s.propagate_working = true;
        }
        for step in 1..=20u64 {
            engine.run_once(t0 + Duration::from_millis(100 * step)).await;
        }

        assert_eq!(rounds.load(Ordering::SeqCst), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(engine.settings().read().targeting.leader_name, "");
    }

    #[tokio::test]
    async fn test_networked_follower_applies_leader_payload() {
        let mut config = AppConfig::default();
        config.role = "follower".to_string();
        config.follower.mode = "network".to_string();
        config.follower.start_network_requesting = true;
        let (mut engine, _world) = engine_with(&config, CountingServer::default());
        let (url, hits) = counting_leader().await;
        engine.settings().write().url = url;
        engine.initialize().await.unwrap();

        engine.run_once(Instant::now()).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let targeting = engine.settings().read().targeting.clone();
        assert_eq!(targeting.leader_name, "Bob");
        assert_eq!(targeting.leader_proximity_radius, 40.0);
    }

    #[tokio::test]
    async fn test_stopped_network_task_makes_no_requests() {
        let mut config = AppConfig::default();
        config.role = "follower".to_string();
        config.follower.mode = "network".to_string();
        config.follower.start_network_requesting = true;
        let (mut engine, _world) = engine_with(&config, CountingServer::default());
        let (url, hits) = counting_leader().await;
        engine.settings().write().url = url;

        assert!(engine.stop_task(NetworkRequestTask::NAME));
        assert!(!engine.stop_task(NetworkRequestTask::NAME));
        engine.run_once(Instant::now()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert!(engine.start_task(NetworkRequestTask::NAME));
        engine.run_once(Instant::now()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_area_change_is_published_to_readers() {
        let (mut engine, world) = engine_with(&AppConfig::default(), CountingServer::default());
        let handle = engine.handle();
        world.enter_area(1);
        let t0 = Instant::now();
        engine.run_once(t0).await;

        engine.ctx.state.begin_action(ActionKind::UsingWaypoint, 1, Vector3::new(1.0, 1.0, 0.0));
        engine.run_once(t0 + Duration::from_millis(100)).await;
        assert_eq!(handle.coordination_state().saved_current_area_hash, 1);

        world.enter_area(2);
        engine.run_once(t0 + Duration::from_millis(1200)).await;
        let published = handle.coordination_state();
        assert_eq!(published.saved_current_area_hash, 0);
        assert_eq!(published.current_action, ActionKind::UsingWaypoint);
    }

    /// Gem level-up maintenance gated on the coordination state
    struct LevelUpGems {
        interval: chrono::Duration,
        runs: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl ScheduledTask<EngineContext> for LevelUpGems {
        fn name(&self) -> &'static str {
            "level-up-gems"
        }

        async fn tick(&mut self, ctx: &mut EngineContext, _control: &TaskControl) -> Duration {
            let now = chrono::Utc::now();
            if ctx.state.level_up_gems_due(now, self.interval) {
                self.runs.fetch_add(1, Ordering::SeqCst);
                ctx.state.mark_level_up_gems_ran(now);
            }
            Duration::from_millis(100)
        }
    }

    #[tokio::test]
    async fn test_extra_task_shares_the_schedule() {
        let (mut engine, _world) = engine_with(&AppConfig::default(), CountingServer::default());
        let runs = Arc::new(AtomicU32::new(0));
        let control = engine.add_task(
            Box::new(LevelUpGems {
                interval: chrono::Duration::hours(1),
                runs: Arc::clone(&runs),
            }),
            true,
        );
        engine.ctx.state.should_level_up_gems = true;

        let t0 = Instant::now();
        for step in 0..5u64 {
            engine.run_once(t0 + Duration::from_millis(100 * step)).await;
        }

        assert!(control.is_running());
        assert_eq!(runs.load(Ordering::SeqCst), 1, "gated by interval");
        assert!(engine.state().last_time_level_up_gems_composite_ran.is_some());
    }

    #[tokio::test]
    async fn test_handle_commands_round_trip_through_run_loop() {
        let server = CountingServer::default();
        let starts = Arc::clone(&server.starts);
        let (mut engine, _world) = engine_with(&AppConfig::default(), server);
        let handle = engine.handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = tokio::spawn(async move {
            engine.run(shutdown_rx).await;
            engine
        });

        let transition = handle.set_role("leader").await.unwrap();
        assert_eq!(transition.to, Role::Leader);
        assert!(matches!(
            handle.set_role("observer").await,
            Err(FollowerError::UnsupportedRole(_))
        ));
        handle.set_follower_mode("network").await.unwrap();

        shutdown_tx.send(true).unwrap();
        let engine = runner.await.unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(!engine.server().is_running(), "server stopped on shutdown");
        assert_eq!(engine.settings().read().follower_mode, FollowerMode::Network);

        drop(engine);
        assert!(handle.set_role("leader").await.is_err());
    }

    #[test]
    fn test_nearby_selection_and_self_as_leader() {
        let (engine, _world) = engine_with(&AppConfig::default(), CountingServer::default());
        let handle = engine.handle();

        handle.settings().write().nearby_selection = "Alice".to_string();
        assert!(handle.select_nearby_player("Alice"));
        {
            let settings = handle.settings();
            let s = settings.read();
            assert_eq!(s.targeting.leader_name, "Alice");
            assert!(s.nearby_selection.is_empty(), "selection cleared");
        }

        handle.settings().write().nearby_selection = "stale".to_string();
        assert!(!handle.select_nearby_player(""));
        {
            let settings = handle.settings();
            let s = settings.read();
            assert_eq!(s.targeting.leader_name, "Alice", "blank name ignored");
            assert!(s.nearby_selection.is_empty());
        }

        assert_eq!(handle.set_myself_as_leader().as_deref(), Some("Me"));
        assert_eq!(handle.settings().read().leader_name_to_propagate, "Me");
    }

    struct Keys(HashSet<&'static str>);

    impl KeyboardState for Keys {
        fn is_key_down(&self, key: &str) -> bool {
            self.0.contains(key)
        }
    }

    fn keys(down: &[&'static str]) -> Keys {
        Keys(down.iter().copied().collect())
    }

    #[test]
    fn test_hotkeys_toggle_once_per_press() {
        let (engine, _world) = engine_with(&AppConfig::default(), CountingServer::default());
        let settings = engine.settings();
        for name in [TRIGGER_PROPAGATE, TRIGGER_START_REQUESTING, TRIGGER_DEBUG_HOVER] {
            assert!(engine.triggers.is_registered(name), "{name} registered");
        }
        let mut hooks = engine.frame_hooks();

        // Held for several frames: one toggle.
        for _ in 0..5 {
            hooks.on_frame(&keys(&["F4", "F3"]));
        }
        assert!(settings.read().propagate_working);
        assert!(settings.read().start_network_requesting);

        // Released and pressed again within the debounce window: suppressed.
        hooks.on_frame(&keys(&[]));
        hooks.on_frame(&keys(&["F4"]));
        assert!(settings.read().propagate_working);
    }

    #[derive(Default)]
    struct RecordingCursor(Mutex<Vec<Vector2>>);

    impl CursorInput for RecordingCursor {
        fn move_cursor_to(&self, pos: Vector2) {
            self.0.lock().unwrap().push(pos);
        }
    }

    #[test]
    fn test_debug_hover_moves_cursor_to_leader() {
        let mut config = AppConfig::default();
        config.follower.leader_name = "Bob".to_string();
        config.input.random_click_offset = 0;
        let world = Arc::new(HeadlessWorld::new(Some("Me".to_string())));
        world.set_players(vec![EntitySnapshot {
            name: "Bob".to_string(),
            pos: Vector3::new(30.0, 40.0, 0.0),
        }]);
        let cursor = Arc::new(RecordingCursor::default());
        let adapters = Adapters {
            world,
            projector: Arc::new(PlanarProjector),
            cursor: cursor.clone(),
        };
        let engine =
            FollowerEngine::new(&config, adapters, Box::new(CountingServer::default())).unwrap();
        let mut hooks = engine.frame_hooks();

        hooks.on_frame(&keys(&["F5"]));
        assert!(cursor.0.lock().unwrap().is_empty(), "hover needs debug mode");

        engine.settings().write().debug = true;
        hooks.on_frame(&keys(&["F5"]));
        assert_eq!(*cursor.0.lock().unwrap(), vec![Vector2::new(30.0, 40.0)]);
    }
}
