use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::physics::BodySet;
use crate::signal::Signal;

use super::game::GameContext;

/// One game state. Only `create` and `update` are required; every hook
/// receives the shared engine context.
pub trait Scene {
    fn init(&mut self, _ctx: &mut GameContext) {}
    /// Queue assets here; `create` runs once the loader finishes them.
    fn preload(&mut self, _ctx: &mut GameContext) {}
    /// Runs instead of `update` while preload assets are streaming.
    fn load_update(&mut self, _ctx: &mut GameContext) {}
    fn create(&mut self, ctx: &mut GameContext);
    fn update(&mut self, ctx: &mut GameContext);
    fn pre_render(&mut self, _ctx: &mut GameContext) {}
    fn render(&mut self, _ctx: &GameContext) {}
    fn paused(&mut self, _ctx: &mut GameContext) {}
    fn resumed(&mut self, _ctx: &mut GameContext) {}
    fn pause_update(&mut self, _ctx: &mut GameContext) {}
    fn resize(&mut self, _ctx: &mut GameContext, _width: u32, _height: u32) {}
    fn shutdown(&mut self, _ctx: &mut GameContext) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneStart {
    pub key: String,
    /// Wipe the stage, bodies, tweens, camera and input on the swap.
    pub clear_world: bool,
    pub clear_cache: bool,
}

impl SceneStart {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            clear_world: true,
            clear_cache: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneChange {
    pub current: String,
    pub previous: Option<String>,
}

#[derive(Default)]
pub struct SceneManager {
    scenes: HashMap<String, Box<dyn Scene>>,
    current: Option<String>,
    pending: Option<SceneStart>,
    created: bool,
    awaiting_load: bool,
    kickstart: bool,
    pub on_change: Signal<SceneChange>,
}

impl SceneManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a scene, replacing any existing one under `key`.
    pub fn add(&mut self, key: impl Into<String>, scene: Box<dyn Scene>) {
        let key = key.into();
        if self.scenes.insert(key.clone(), scene).is_some() {
            warn!(key = %key, "scene_replaced");
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.scenes.contains_key(key)
    }

    /// Queues a swap; it is applied at the next scene pre-update.
    pub fn start(&mut self, request: SceneStart) {
        if !self.scenes.contains_key(&request.key) {
            warn!(key = %request.key, "scene_start_unknown");
            return;
        }
        self.pending = Some(request);
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// True once after a scene finishes `create`.
    pub(crate) fn take_kickstart(&mut self) -> bool {
        std::mem::take(&mut self.kickstart)
    }

    pub(crate) fn pre_update(&mut self, ctx: &mut GameContext) {
        if let Some(request) = ctx.pending_scene.take() {
            self.start(request);
        }
        let Some(request) = self.pending.take() else {
            return;
        };

        let previous = self.current.take();
        if let Some(scene) = previous.as_deref().and_then(|key| self.scenes.get_mut(key)) {
            scene.shutdown(ctx);
        }
        if request.clear_world {
            clear_world(ctx);
        }
        if request.clear_cache {
            ctx.cache.clear();
        }

        self.created = false;
        self.awaiting_load = false;
        self.current = Some(request.key.clone());
        info!(scene = %request.key, previous = ?previous, "scene_started");
        self.on_change.dispatch(&SceneChange {
            current: request.key.clone(),
            previous,
        });

        let Some(scene) = self.scenes.get_mut(&request.key) else {
            return;
        };
        scene.init(ctx);
        if let Some(redirect) = ctx.pending_scene.take() {
            debug!(from = %request.key, to = %redirect.key, "scene_redirected_in_init");
            self.start(redirect);
            return;
        }

        ctx.loader.reset(true, false);
        scene.preload(ctx);
        if ctx.loader.total_queued_files() == 0 && ctx.loader.total_queued_packs() == 0 {
            self.load_complete(ctx);
        } else {
            self.awaiting_load = true;
            ctx.loader.start(ctx.clock.now);
            self.poll_load(ctx);
        }
    }

    /// Runs `create` once the preload queue has drained.
    pub(crate) fn poll_load(&mut self, ctx: &mut GameContext) {
        if !self.awaiting_load {
            return;
        }
        if let Some(summary) = ctx.loader.take_finished() {
            debug!(
                files = summary.files_total,
                failed = summary.files_failed,
                "scene_preload_finished"
            );
            self.load_complete(ctx);
        }
    }

    fn load_complete(&mut self, ctx: &mut GameContext) {
        self.awaiting_load = false;
        if self.created {
            return;
        }
        if let Some(scene) = self.current_scene() {
            scene.create(ctx);
        }
        self.created = true;
        self.kickstart = true;
    }

    pub(crate) fn update(&mut self, ctx: &mut GameContext) {
        let created = self.created;
        if let Some(scene) = self.current_scene() {
            if created {
                scene.update(ctx);
            } else {
                scene.load_update(ctx);
            }
        }
    }

    pub(crate) fn pause_update(&mut self, ctx: &mut GameContext) {
        let created = self.created;
        if let Some(scene) = self.current_scene() {
            if created {
                scene.pause_update(ctx);
            } else {
                scene.load_update(ctx);
            }
        }
    }

    pub(crate) fn pre_render(&mut self, ctx: &mut GameContext) {
        if !self.created {
            return;
        }
        if let Some(scene) = self.current_scene() {
            scene.pre_render(ctx);
        }
    }

    pub(crate) fn render(&mut self, ctx: &GameContext) {
        if !self.created {
            return;
        }
        if let Some(scene) = self.current_scene() {
            scene.render(ctx);
        }
    }

    pub(crate) fn paused(&mut self, ctx: &mut GameContext) {
        if let Some(scene) = self.created_scene() {
            scene.paused(ctx);
        }
    }

    pub(crate) fn resumed(&mut self, ctx: &mut GameContext) {
        if let Some(scene) = self.created_scene() {
            scene.resumed(ctx);
        }
    }

    pub(crate) fn resize(&mut self, ctx: &mut GameContext, width: u32, height: u32) {
        if let Some(scene) = self.created_scene() {
            scene.resize(ctx, width, height);
        }
    }

    /// Shuts the current scene down without starting another.
    pub(crate) fn destroy(&mut self, ctx: &mut GameContext) {
        if let Some(scene) = self.current_scene() {
            scene.shutdown(ctx);
        }
        self.current = None;
        self.pending = None;
        self.created = false;
        self.awaiting_load = false;
    }

    fn current_scene(&mut self) -> Option<&mut Box<dyn Scene>> {
        let key = self.current.as_deref()?;
        self.scenes.get_mut(key)
    }

    fn created_scene(&mut self) -> Option<&mut Box<dyn Scene>> {
        if !self.created {
            return None;
        }
        self.current_scene()
    }
}

fn clear_world(ctx: &mut GameContext) {
    ctx.tweens.remove_all();
    ctx.camera.reset();
    ctx.input.reset();
    ctx.debug.pre_update();
    ctx.stage.clear(&mut ctx.bodies);
    ctx.bodies = BodySet::new();
    ctx.world.drain_events();
}
