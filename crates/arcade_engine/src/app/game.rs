use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::geom::Rect;
use crate::loader::{Cache, Fetcher, Loader, LoaderConfig};
use crate::physics::{BodySet, World, WorldConfig};
use crate::signal::Signal;

use super::clock::{Clock, DEFAULT_DESIRED_FPS};
use super::input::{Input, InputEvent};
use super::rendering::{RenderView, Renderer};
use super::scene::{Scene, SceneManager, SceneStart};
use super::stage::Stage;
use super::subsystems::{AudioSystem, Camera, DebugOverlay, ScaleManager, SilentAudio};
use super::tween::TweenManager;

/// Spacing between repeated spiral warnings, in simulated milliseconds
/// (`Clock::time`), so paused or stalled wall time never counts.
pub const FPS_PROBLEM_NOTIFY_INTERVAL_MS: f64 = 10_000.0;
/// Consecutive growing catch-up counts that trigger a bail-out.
pub const SPIRAL_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverCapPolicy {
    /// Treat the tick as if exactly `delta_cap_ms` elapsed.
    #[default]
    Clamp,
    /// Skip the tick entirely.
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteppingPolicy {
    /// One variable-length update per tick.
    ForceSingleUpdate,
    #[default]
    CatchUpWithBailOut,
    CatchUp,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub desired_fps: u32,
    pub slow_motion: f32,
    pub delta_cap_ms: f64,
    pub over_cap_policy: OverCapPolicy,
    pub stepping_policy: SteppingPolicy,
    pub render_every_step: bool,
    /// Render on ticks too short to fit a logic step.
    pub render_without_update: bool,
    pub headless: bool,
    pub disable_visibility_change: bool,
    pub mute_on_pause: bool,
    pub metrics_log_interval_ms: u64,
    /// Debug sleep before every windowed tick; `ARCADE_SLOW_FRAME_MS` overrides it.
    pub simulated_slow_frame_ms: u64,
    pub loader: LoaderConfig,
    pub physics: WorldConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            title: "arcade".to_string(),
            width: 800,
            height: 600,
            desired_fps: DEFAULT_DESIRED_FPS,
            slow_motion: 1.0,
            delta_cap_ms: 250.0,
            over_cap_policy: OverCapPolicy::Clamp,
            stepping_policy: SteppingPolicy::CatchUpWithBailOut,
            render_every_step: false,
            render_without_update: true,
            headless: false,
            disable_visibility_change: false,
            mute_on_pause: true,
            metrics_log_interval_ms: 1000,
            simulated_slow_frame_ms: 0,
            loader: LoaderConfig::default(),
            physics: WorldConfig::default(),
        }
    }
}

/// Engine state shared with scenes and plugins.
pub struct GameContext {
    pub clock: Clock,
    pub loader: Loader,
    pub cache: Cache,
    pub world: World,
    pub bodies: BodySet,
    pub stage: Stage,
    pub tweens: TweenManager,
    pub input: Input,
    pub camera: Camera,
    pub scale: ScaleManager,
    pub debug: DebugOverlay,
    pub audio: Box<dyn AudioSystem>,
    pub(crate) pending_scene: Option<SceneStart>,
}

impl GameContext {
    pub fn new(config: &GameConfig, fetcher: Box<dyn Fetcher>) -> Self {
        let bounds = Rect::new(0.0, 0.0, config.width as f32, config.height as f32);
        Self {
            clock: Clock::new(config.desired_fps, config.slow_motion),
            loader: Loader::new(config.loader.clone(), fetcher),
            cache: Cache::new(),
            world: World::new(&config.physics, bounds),
            bodies: BodySet::new(),
            stage: Stage::new(),
            tweens: TweenManager::new(),
            input: Input::new(),
            camera: Camera::new(config.width as f32, config.height as f32),
            scale: ScaleManager::new(config.width, config.height),
            debug: DebugOverlay::default(),
            audio: Box::new(SilentAudio::default()),
            pending_scene: None,
        }
    }

    /// Swaps to `key` at the next scene pre-update, clearing the world.
    pub fn start_scene(&mut self, key: impl Into<String>) {
        self.pending_scene = Some(SceneStart::new(key));
    }

    pub fn start_scene_with(&mut self, request: SceneStart) {
        self.pending_scene = Some(request);
    }
}

/// Engine-wide hooks run around every logic step and render.
pub trait Plugin {
    fn pre_update(&mut self, _ctx: &mut GameContext) {}
    fn update(&mut self, _ctx: &mut GameContext) {}
    fn post_update(&mut self, _ctx: &mut GameContext) {}
    fn render(&mut self, _ctx: &GameContext) {}
    fn post_render(&mut self, _ctx: &GameContext) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Uninitialized,
    Booting,
    Running,
    Paused,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicPhase {
    ScalePreUpdate,
    DebugPreUpdate,
    CameraPreUpdate,
    PhysicsPreUpdate,
    ScenePreUpdate,
    PluginPreUpdate,
    StagePreUpdate,
    SceneUpdate,
    TweenUpdate,
    AudioUpdate,
    InputUpdate,
    PhysicsUpdate,
    PluginUpdate,
    StagePostUpdate,
    PluginPostUpdate,
    TransformUpdate,
}

/// Fixed subsystem order for one running logic step.
pub const LOGIC_PHASES: [LogicPhase; 16] = [
    LogicPhase::ScalePreUpdate,
    LogicPhase::DebugPreUpdate,
    LogicPhase::CameraPreUpdate,
    LogicPhase::PhysicsPreUpdate,
    LogicPhase::ScenePreUpdate,
    LogicPhase::PluginPreUpdate,
    LogicPhase::StagePreUpdate,
    LogicPhase::SceneUpdate,
    LogicPhase::TweenUpdate,
    LogicPhase::AudioUpdate,
    LogicPhase::InputUpdate,
    LogicPhase::PhysicsUpdate,
    LogicPhase::PluginUpdate,
    LogicPhase::StagePostUpdate,
    LogicPhase::PluginPostUpdate,
    LogicPhase::TransformUpdate,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotBooted,
    Destroyed,
    FocusRegained,
    NoElapsed,
    OverCap,
    SpiralBailOut,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Running logic updates executed.
    pub updates: u32,
    pub renders: u32,
    pub paused: bool,
    pub skipped: Option<SkipReason>,
    pub fps_problem: bool,
    pub render_failed: bool,
}

pub struct Game {
    pub ctx: GameContext,
    pub scenes: SceneManager,
    renderer: Box<dyn Renderer>,
    plugins: Vec<Box<dyn Plugin>>,
    state: GameState,
    delta_cap_ms: f64,
    over_cap_policy: OverCapPolicy,
    stepping_policy: SteppingPolicy,
    render_every_step: bool,
    render_without_update: bool,
    headless: bool,
    disable_visibility_change: bool,
    mute_on_pause: bool,
    accumulator_ms: f64,
    last_count: u32,
    spiraling: u32,
    next_fps_notification: f64,
    paused_by_code: bool,
    stepping: bool,
    pending_step: bool,
    step_count: u64,
    skip_next_tick: bool,
    destroy_requested: bool,
    /// Suppresses the render phase while logic keeps running.
    pub lock_render: bool,
    pub on_pause: Signal<()>,
    pub on_resume: Signal<()>,
    pub on_blur: Signal<()>,
    pub on_focus: Signal<()>,
    pub on_fps_problem: Signal<()>,
}

impl Game {
    pub fn new(config: &GameConfig, renderer: Box<dyn Renderer>, fetcher: Box<dyn Fetcher>) -> Self {
        Self {
            ctx: GameContext::new(config, fetcher),
            scenes: SceneManager::new(),
            renderer,
            plugins: Vec::new(),
            state: GameState::Uninitialized,
            delta_cap_ms: config.delta_cap_ms,
            over_cap_policy: config.over_cap_policy,
            stepping_policy: config.stepping_policy,
            render_every_step: config.render_every_step,
            render_without_update: config.render_without_update,
            headless: config.headless,
            disable_visibility_change: config.disable_visibility_change,
            mute_on_pause: config.mute_on_pause,
            accumulator_ms: 0.0,
            last_count: 0,
            spiraling: 0,
            next_fps_notification: 0.0,
            paused_by_code: false,
            stepping: false,
            pending_step: false,
            step_count: 0,
            skip_next_tick: false,
            destroy_requested: false,
            lock_render: false,
            on_pause: Signal::new(),
            on_resume: Signal::new(),
            on_blur: Signal::new(),
            on_focus: Signal::new(),
            on_fps_problem: Signal::new(),
        }
    }

    pub fn add_scene(&mut self, key: impl Into<String>, scene: Box<dyn Scene>) {
        self.scenes.add(key, scene);
    }

    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn set_audio(&mut self, audio: Box<dyn AudioSystem>) {
        self.ctx.audio = audio;
    }

    /// Queues the first scene; the next tick kickstarts it.
    pub fn boot(&mut self, scene: &str) {
        if self.state != GameState::Uninitialized {
            return;
        }
        self.scenes.start(SceneStart::new(scene));
        self.state = GameState::Booting;
        info!(scene, stepping = ?self.stepping_policy, "game_booted");
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == GameState::Paused
    }

    pub fn paused_by_code(&self) -> bool {
        self.paused_by_code
    }

    /// Leftover tick time not yet consumed by fixed steps.
    pub fn accumulator_ms(&self) -> f64 {
        self.accumulator_ms
    }

    pub fn push_input(&mut self, event: InputEvent) {
        self.ctx.input.push(event);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.ctx.scale.request_resize(width, height);
    }

    /// Destruction waits for the next tick boundary.
    pub fn request_destroy(&mut self) {
        self.destroy_requested = true;
    }

    pub fn pause(&mut self) {
        self.paused_by_code = true;
        self.enter_pause();
    }

    pub fn resume(&mut self) {
        self.paused_by_code = false;
        self.leave_pause();
    }

    pub fn focus_lost(&mut self) {
        if self.disable_visibility_change {
            return;
        }
        self.on_blur.dispatch(&());
        self.enter_pause();
    }

    /// Resumes a platform pause; a pause made by code stays in place.
    pub fn focus_gained(&mut self) {
        if self.disable_visibility_change {
            return;
        }
        self.on_focus.dispatch(&());
        if self.state == GameState::Paused && !self.paused_by_code {
            self.leave_pause();
            self.skip_next_tick = true;
        }
    }

    pub fn enable_step(&mut self) {
        self.stepping = true;
        self.pending_step = false;
        self.step_count = 0;
    }

    pub fn disable_step(&mut self) {
        self.stepping = false;
        self.pending_step = false;
    }

    /// Releases one logic update while stepping.
    pub fn step(&mut self) {
        self.pending_step = false;
        self.step_count += 1;
    }

    pub fn stepping(&self) -> bool {
        self.stepping
    }

    pub fn pending_step(&self) -> bool {
        self.pending_step
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn update(&mut self, now_ms: f64) -> TickReport {
        let mut report = TickReport::default();
        match self.state {
            GameState::Uninitialized => {
                report.skipped = Some(SkipReason::NotBooted);
                return report;
            }
            GameState::Destroyed => {
                report.skipped = Some(SkipReason::Destroyed);
                return report;
            }
            _ => {}
        }
        if self.destroy_requested {
            self.destroy();
            report.skipped = Some(SkipReason::Destroyed);
            return report;
        }

        self.ctx.clock.update(now_ms);
        self.ctx.loader.pump(&mut self.ctx.cache, now_ms);
        self.scenes.poll_load(&mut self.ctx);

        let kickstart = self.state == GameState::Booting || self.scenes.take_kickstart();
        if kickstart {
            if self.state == GameState::Booting {
                self.state = GameState::Running;
            }
            let step = self.ctx.clock.desired_fps_mult();
            self.run_step(step, &mut report);
            self.scenes.take_kickstart();
            self.render(&mut report);
            debug!(state = ?self.state, "game_kickstart");
            return report;
        }

        if self.skip_next_tick {
            self.skip_next_tick = false;
            report.skipped = Some(SkipReason::FocusRegained);
            return report;
        }

        if self.state == GameState::Paused {
            self.accumulator_ms = 0.0;
            self.paused_step();
            report.paused = true;
            self.render(&mut report);
            return report;
        }

        let mut elapsed = self.ctx.clock.elapsed;
        if elapsed <= 0.0 {
            report.skipped = Some(SkipReason::NoElapsed);
            return report;
        }
        if self.delta_cap_ms > 0.0 && elapsed > self.delta_cap_ms {
            match self.over_cap_policy {
                OverCapPolicy::Drop => {
                    debug!(elapsed_ms = elapsed, cap_ms = self.delta_cap_ms, "frame_dropped");
                    report.skipped = Some(SkipReason::OverCap);
                    return report;
                }
                OverCapPolicy::Clamp => elapsed = self.delta_cap_ms,
            }
        }

        if self.stepping {
            self.accumulator_ms = 0.0;
            if !self.pending_step {
                let step = self.ctx.clock.desired_fps_mult();
                self.run_step(step, &mut report);
            }
            self.render(&mut report);
            return report;
        }

        match self.stepping_policy {
            SteppingPolicy::ForceSingleUpdate => {
                let slow_motion = self.ctx.clock.slow_motion.max(f32::EPSILON);
                let step = (elapsed / 1000.0) as f32 / slow_motion;
                self.run_step(step, &mut report);
                self.render(&mut report);
            }
            SteppingPolicy::CatchUp => self.catch_up(elapsed, false, &mut report),
            SteppingPolicy::CatchUpWithBailOut => self.catch_up(elapsed, true, &mut report),
        }
        report
    }

    fn catch_up(&mut self, elapsed: f64, bail_out: bool, report: &mut TickReport) {
        let slow_step = self.ctx.clock.slow_step_ms();
        self.accumulator_ms += elapsed;
        let count = (self.accumulator_ms / slow_step).floor().max(0.0) as u32;

        if bail_out {
            if count > self.last_count {
                self.spiraling += 1;
            } else if count < self.last_count {
                self.spiraling = 0;
            }
            self.last_count = count;

            if self.spiraling >= SPIRAL_THRESHOLD {
                self.spiraling = 0;
                self.last_count = 0;
                self.accumulator_ms = 0.0;
                report.skipped = Some(SkipReason::SpiralBailOut);
                let sim_time = self.ctx.clock.time;
                if sim_time >= self.next_fps_notification {
                    self.next_fps_notification = sim_time + FPS_PROBLEM_NOTIFY_INTERVAL_MS;
                    report.fps_problem = true;
                    warn!(steps = count, step_ms = slow_step, "fps_problem");
                    self.on_fps_problem.dispatch(&());
                }
                return;
            }
        }

        self.accumulator_ms -= count as f64 * slow_step;
        let step = self.ctx.clock.desired_fps_mult();
        for _ in 0..count {
            self.run_step(step, report);
            if self.render_every_step {
                self.render(report);
            }
        }
        if count > 1 {
            debug!(steps = count, remainder_ms = self.accumulator_ms, "catch_up_steps");
        }
        if !self.render_every_step && (count > 0 || self.render_without_update) {
            self.render(report);
        }
    }

    fn run_step(&mut self, step_seconds: f32, report: &mut TickReport) {
        if self.stepping {
            if self.pending_step {
                return;
            }
            self.pending_step = true;
        }
        self.ctx.clock.refresh(step_seconds);
        self.ctx.world.set_physics_elapsed(step_seconds);
        for phase in LOGIC_PHASES {
            self.run_phase(phase);
        }
        report.updates += 1;
    }

    fn run_phase(&mut self, phase: LogicPhase) {
        let ctx = &mut self.ctx;
        match phase {
            LogicPhase::ScalePreUpdate => {
                if let Some((width, height)) = ctx.scale.pre_update() {
                    self.apply_resize(width, height);
                }
            }
            LogicPhase::DebugPreUpdate => ctx.debug.pre_update(),
            LogicPhase::CameraPreUpdate => ctx.camera.pre_update(&ctx.stage),
            LogicPhase::PhysicsPreUpdate => {
                ctx.stage.push_bodies(&mut ctx.bodies);
                ctx.world.pre_update(&mut ctx.bodies);
            }
            LogicPhase::ScenePreUpdate => self.scenes.pre_update(ctx),
            LogicPhase::PluginPreUpdate => {
                for plugin in &mut self.plugins {
                    plugin.pre_update(ctx);
                }
            }
            LogicPhase::StagePreUpdate => {
                let elapsed_ms = ctx.clock.physics_elapsed_ms;
                ctx.stage.pre_update(elapsed_ms, &mut ctx.bodies);
            }
            LogicPhase::SceneUpdate => self.scenes.update(ctx),
            LogicPhase::TweenUpdate => {
                let elapsed_ms = ctx.clock.physics_elapsed_ms;
                ctx.tweens.update(&mut ctx.stage, elapsed_ms);
            }
            LogicPhase::AudioUpdate => ctx.audio.update(),
            LogicPhase::InputUpdate => ctx.input.update(),
            LogicPhase::PhysicsUpdate => ctx.world.update(&mut ctx.bodies),
            LogicPhase::PluginUpdate => {
                for plugin in &mut self.plugins {
                    plugin.update(ctx);
                }
            }
            LogicPhase::StagePostUpdate => {
                ctx.world.post_update(&mut ctx.bodies);
                ctx.stage.post_update(&ctx.bodies);
            }
            LogicPhase::PluginPostUpdate => {
                for plugin in &mut self.plugins {
                    plugin.post_update(ctx);
                }
            }
            LogicPhase::TransformUpdate => ctx.stage.update_transforms(),
        }
    }

    fn paused_step(&mut self) {
        if let Some((width, height)) = self.ctx.scale.pause_update() {
            self.apply_resize(width, height);
        }
        self.scenes.pause_update(&mut self.ctx);
        self.ctx.debug.pre_update();
        self.ctx.input.pause_update();
    }

    fn apply_resize(&mut self, width: u32, height: u32) {
        if let Err(error) = self.renderer.resize(width, height) {
            warn!(error = %error, width, height, "renderer_resize_failed");
        }
        self.ctx.camera.set_view_size(width as f32, height as f32);
        self.scenes.resize(&mut self.ctx, width, height);
        debug!(width, height, "game_resized");
    }

    fn render(&mut self, report: &mut TickReport) {
        if self.lock_render || self.headless {
            return;
        }
        self.scenes.pre_render(&mut self.ctx);
        let ctx = &self.ctx;
        let view = RenderView {
            stage: &ctx.stage,
            cache: &ctx.cache,
            camera: &ctx.camera,
            debug: &ctx.debug,
            bodies: &ctx.bodies,
        };
        match self.renderer.render(&view) {
            Ok(()) => report.renders += 1,
            Err(error) => {
                warn!(error = %error, "renderer_draw_failed");
                report.render_failed = true;
            }
        }
        self.scenes.render(ctx);
        for plugin in &mut self.plugins {
            plugin.render(ctx);
        }
        for plugin in &mut self.plugins {
            plugin.post_render(ctx);
        }
    }

    fn enter_pause(&mut self) {
        if self.state != GameState::Running {
            return;
        }
        self.state = GameState::Paused;
        self.ctx.clock.game_paused();
        if self.mute_on_pause {
            self.ctx.audio.set_mute(true);
        }
        info!(by_code = self.paused_by_code, "game_paused");
        self.on_pause.dispatch(&());
        self.scenes.paused(&mut self.ctx);
    }

    fn leave_pause(&mut self) {
        if self.state != GameState::Paused {
            return;
        }
        self.state = GameState::Running;
        self.ctx.input.reset();
        self.ctx.audio.set_mute(false);
        self.ctx.clock.game_resumed();
        info!("game_resumed");
        self.on_resume.dispatch(&());
        self.scenes.resumed(&mut self.ctx);
    }

    fn destroy(&mut self) {
        self.destroy_requested = false;
        self.scenes.destroy(&mut self.ctx);
        self.ctx.loader.reset(true, true);
        self.ctx.tweens.remove_all();
        self.ctx.stage.clear(&mut self.ctx.bodies);
        self.renderer.destroy();
        self.state = GameState::Destroyed;
        info!(steps = self.ctx.clock.logic_steps, "game_destroyed");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::app::rendering::{HeadlessRenderer, RenderCounter};
    use crate::loader::MemoryFetcher;

    #[derive(Default)]
    struct Counting {
        updates: Rc<Cell<u32>>,
        created: Rc<Cell<bool>>,
        preload: Option<&'static str>,
        last_step_seconds: Rc<Cell<f32>>,
    }

    impl Scene for Counting {
        fn preload(&mut self, ctx: &mut GameContext) {
            if let Some(url) = self.preload {
                ctx.loader.text("asset", url);
            }
        }

        fn create(&mut self, _ctx: &mut GameContext) {
            self.created.set(true);
        }

        fn update(&mut self, ctx: &mut GameContext) {
            self.updates.set(self.updates.get() + 1);
            self.last_step_seconds.set(ctx.clock.physics_elapsed);
        }
    }

    struct Harness {
        game: Game,
        renders: RenderCounter,
        updates: Rc<Cell<u32>>,
        created: Rc<Cell<bool>>,
        step_seconds: Rc<Cell<f32>>,
    }

    fn harness_with(config: GameConfig, fetcher: MemoryFetcher, preload: Option<&'static str>) -> Harness {
        let renderer = HeadlessRenderer::new();
        let renders = renderer.counter();
        let mut game = Game::new(&config, Box::new(renderer), Box::new(fetcher));
        let scene = Counting {
            preload,
            ..Counting::default()
        };
        let updates = Rc::clone(&scene.updates);
        let created = Rc::clone(&scene.created);
        let step_seconds = Rc::clone(&scene.last_step_seconds);
        game.add_scene("main", Box::new(scene));
        game.boot("main");
        Harness {
            game,
            renders,
            updates,
            created,
            step_seconds,
        }
    }

    fn harness(config: GameConfig) -> Harness {
        harness_with(config, MemoryFetcher::new(), None)
    }

    fn catch_up_config() -> GameConfig {
        GameConfig {
            stepping_policy: SteppingPolicy::CatchUp,
            ..GameConfig::default()
        }
    }

    #[test]
    fn boot_tick_kickstarts_one_update_and_render() {
        let mut h = harness(GameConfig::default());
        let report = h.game.update(0.0);
        assert_eq!(report.updates, 1);
        assert_eq!(report.renders, 1);
        assert_eq!(h.game.state(), GameState::Running);
        assert!(h.created.get());
        assert_eq!(h.renders.renders(), 1);
    }

    #[test]
    fn catch_up_runs_whole_steps_and_renders_once() {
        let mut h = harness(catch_up_config());
        h.game.ctx.clock.set_desired_frame_interval_ms(16.67);
        h.game.update(0.0);

        let report = h.game.update(200.0);
        assert_eq!(report.updates, (200.0_f64 / 16.67).floor() as u32);
        assert_eq!(report.updates, 11);
        assert_eq!(report.renders, 1);
        assert!(h.game.accumulator_ms() < 16.67);
        assert!(h.game.accumulator_ms() > 0.0);
    }

    #[test]
    fn short_tick_still_renders_without_update() {
        let mut h = harness(catch_up_config());
        h.game.update(0.0);
        let report = h.game.update(5.0);
        assert_eq!(report.updates, 0);
        assert_eq!(report.renders, 1);
    }

    #[test]
    fn growing_step_counts_bail_out_once() {
        let mut h = harness(GameConfig::default());
        h.game.ctx.clock.set_desired_frame_interval_ms(16.67);
        let notified = Rc::new(Cell::new(0));
        let sink = Rc::clone(&notified);
        h.game.on_fps_problem.add(move |_| sink.set(sink.get() + 1));

        h.game.update(0.0);
        let first = h.game.update(17.0);
        let second = h.game.update(51.0);
        let third = h.game.update(102.0);

        assert_eq!((first.updates, second.updates), (1, 2));
        assert_eq!(third.updates, 0);
        assert_eq!(third.renders, 0);
        assert_eq!(third.skipped, Some(SkipReason::SpiralBailOut));
        assert!(third.fps_problem);
        assert_eq!(notified.get(), 1);
        assert_eq!(h.game.accumulator_ms(), 0.0);
    }

    fn grow_into_bail_out(game: &mut Game, start_ms: f64) -> TickReport {
        game.update(start_ms + 17.0);
        game.update(start_ms + 51.0);
        game.update(start_ms + 102.0)
    }

    #[test]
    fn fps_problem_is_reported_at_most_once_per_interval() {
        let mut h = harness(GameConfig::default());
        h.game.ctx.clock.set_desired_frame_interval_ms(16.67);
        let notified = Rc::new(Cell::new(0));
        let sink = Rc::clone(&notified);
        h.game.on_fps_problem.add(move |_| sink.set(sink.get() + 1));
        h.game.update(0.0);

        let first = grow_into_bail_out(&mut h.game, 0.0);
        assert_eq!(first.skipped, Some(SkipReason::SpiralBailOut));
        assert!(first.fps_problem);

        let second = grow_into_bail_out(&mut h.game, 102.0);
        assert_eq!(second.skipped, Some(SkipReason::SpiralBailOut));
        assert!(!second.fps_problem);
        assert_eq!(notified.get(), 1);

        h.game.ctx.clock.time += FPS_PROBLEM_NOTIFY_INTERVAL_MS;
        let third = grow_into_bail_out(&mut h.game, 204.0);
        assert_eq!(third.skipped, Some(SkipReason::SpiralBailOut));
        assert!(third.fps_problem);
        assert_eq!(notified.get(), 2);
    }

    #[test]
    fn oscillating_step_counts_never_bail_out() {
        let mut h = harness(GameConfig::default());
        h.game.ctx.clock.set_desired_frame_interval_ms(10.0);
        h.game.update(0.0);

        let mut now = 0.0;
        for elapsed in [20.0, 30.0].repeat(10) {
            now += elapsed;
            let report = h.game.update(now);
            assert_eq!(report.skipped, None);
            assert!(!report.fps_problem);
            assert!(report.updates == 2 || report.updates == 3);
        }
    }

    #[test]
    fn over_cap_clamps_or_drops() {
        let mut clamp = harness(catch_up_config());
        clamp.game.ctx.clock.set_desired_frame_interval_ms(16.67);
        clamp.game.update(0.0);
        let report = clamp.game.update(1000.0);
        assert_eq!(report.updates, 14);

        let mut drop = harness(GameConfig {
            over_cap_policy: OverCapPolicy::Drop,
            ..catch_up_config()
        });
        drop.game.update(0.0);
        let report = drop.game.update(1000.0);
        assert_eq!(report.skipped, Some(SkipReason::OverCap));
        assert_eq!((report.updates, report.renders), (0, 0));
    }

    #[test]
    fn force_single_update_uses_scaled_elapsed() {
        let mut h = harness(GameConfig {
            stepping_policy: SteppingPolicy::ForceSingleUpdate,
            slow_motion: 2.0,
            ..GameConfig::default()
        });
        h.game.update(0.0);
        let report = h.game.update(40.0);
        assert_eq!(report.updates, 1);
        assert!((h.step_seconds.get() - 0.02).abs() < 1e-6);
        assert!((h.game.ctx.clock.physics_elapsed_ms - 20.0).abs() < 1e-4);
    }

    #[test]
    fn code_pause_survives_focus_regain() {
        let mut h = harness(GameConfig::default());
        h.game.update(0.0);
        h.game.pause();
        assert!(h.game.is_paused());
        assert!(h.game.ctx.audio.is_muted());
        h.game.focus_gained();
        assert!(h.game.is_paused());

        let before = h.updates.get();
        let report = h.game.update(100.0);
        assert!(report.paused);
        assert_eq!(report.updates, 0);
        assert_eq!(report.renders, 1);
        assert_eq!(h.updates.get(), before);

        h.game.resume();
        assert!(!h.game.is_paused());
        assert!(!h.game.ctx.audio.is_muted());
        let report = h.game.update(116.0);
        assert_eq!(report.skipped, Some(SkipReason::NoElapsed));
    }

    #[test]
    fn platform_pause_resumes_on_focus_and_skips_one_tick() {
        let mut h = harness(GameConfig::default());
        let blurred = Rc::new(Cell::new(false));
        let sink = Rc::clone(&blurred);
        h.game.on_blur.add(move |_| sink.set(true));
        h.game.update(0.0);

        h.game.focus_lost();
        assert!(blurred.get());
        assert!(h.game.is_paused());
        h.game.focus_gained();
        assert!(!h.game.is_paused());
        let report = h.game.update(5000.0);
        assert_eq!(report.skipped, Some(SkipReason::FocusRegained));
    }

    #[test]
    fn disabled_visibility_change_ignores_focus_events() {
        let mut h = harness(GameConfig {
            disable_visibility_change: true,
            ..GameConfig::default()
        });
        h.game.update(0.0);
        h.game.focus_lost();
        assert!(!h.game.is_paused());
    }

    #[test]
    fn stepping_runs_one_update_per_released_step() {
        let mut h = harness(GameConfig::default());
        h.game.update(0.0);
        h.game.enable_step();

        assert_eq!(h.game.update(100.0).updates, 1);
        assert!(h.game.pending_step());
        assert_eq!(h.game.update(200.0).updates, 0);
        h.game.step();
        assert_eq!(h.game.step_count(), 1);
        assert_eq!(h.game.update(300.0).updates, 1);
        h.game.disable_step();
        assert!(h.game.update(400.0).updates > 1);
    }

    #[test]
    fn lock_render_and_headless_skip_rendering() {
        let mut h = harness(GameConfig::default());
        h.game.lock_render = true;
        let report = h.game.update(0.0);
        assert_eq!((report.updates, report.renders), (1, 0));

        let mut headless = harness(GameConfig {
            headless: true,
            ..GameConfig::default()
        });
        assert_eq!(headless.game.update(0.0).renders, 0);
        assert_eq!(headless.renders.renders(), 0);
    }

    #[test]
    fn destroy_waits_for_tick_boundary() {
        let mut h = harness(GameConfig::default());
        h.game.update(0.0);
        h.game.request_destroy();
        assert_eq!(h.game.state(), GameState::Running);

        let report = h.game.update(16.0);
        assert_eq!(report.skipped, Some(SkipReason::Destroyed));
        assert_eq!(h.game.state(), GameState::Destroyed);
        assert!(h.renders.destroyed());
        assert_eq!(h.game.update(32.0).updates, 0);
    }

    #[test]
    fn preload_completion_kickstarts_created_scene() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("intro.txt", b"hi".to_vec());
        let mut h = harness_with(GameConfig::default(), fetcher, Some("intro.txt"));

        h.game.update(0.0);
        assert!(!h.created.get());
        assert_eq!(h.updates.get(), 0);

        let report = h.game.update(16.0);
        assert!(h.created.get());
        assert_eq!((report.updates, report.renders), (1, 1));
        assert_eq!(h.updates.get(), 1);
        assert_eq!(h.game.ctx.cache.text("asset"), Some("hi"));
    }

    #[test]
    fn resize_reaches_renderer_and_camera() {
        let mut h = harness(GameConfig::default());
        h.game.update(0.0);
        h.game.resize(1024, 768);
        h.game.update(17.0);
        assert_eq!(h.renders.resizes(), 1);
        assert_eq!(h.game.ctx.camera.view_size.x, 1024.0);
    }

    #[derive(Clone)]
    struct Recorder(Rc<RefCell<Vec<&'static str>>>);

    impl Plugin for Recorder {
        fn pre_update(&mut self, _ctx: &mut GameContext) {
            self.0.borrow_mut().push("plugin_pre_update");
        }

        fn update(&mut self, _ctx: &mut GameContext) {
            self.0.borrow_mut().push("plugin_update");
        }

        fn post_update(&mut self, _ctx: &mut GameContext) {
            self.0.borrow_mut().push("plugin_post_update");
        }

        fn render(&mut self, _ctx: &GameContext) {
            self.0.borrow_mut().push("plugin_render");
        }

        fn post_render(&mut self, _ctx: &GameContext) {
            self.0.borrow_mut().push("plugin_post_render");
        }
    }

    impl Scene for Recorder {
        fn create(&mut self, _ctx: &mut GameContext) {}

        fn update(&mut self, _ctx: &mut GameContext) {
            self.0.borrow_mut().push("scene_update");
        }

        fn pre_render(&mut self, _ctx: &mut GameContext) {
            self.0.borrow_mut().push("scene_pre_render");
        }
    }

    #[test]
    fn step_and_render_hooks_run_in_fixed_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let recorder = Recorder(Rc::clone(&log));
        let mut game = Game::new(
            &GameConfig::default(),
            Box::new(HeadlessRenderer::new()),
            Box::new(MemoryFetcher::new()),
        );
        game.add_scene("main", Box::new(recorder.clone()));
        game.add_plugin(Box::new(recorder));
        game.boot("main");
        game.update(0.0);

        assert_eq!(
            *log.borrow(),
            vec![
                "plugin_pre_update",
                "scene_update",
                "plugin_update",
                "plugin_post_update",
                "scene_pre_render",
                "plugin_render",
                "plugin_post_render",
            ]
        );
    }
}
