use arcade_engine::app::{
    Easing, GameContext, Graphic, Key, Node, NodeId, PointerButton, Scene, Tween, TweenProperty,
};
use arcade_engine::loader::Cache;
use arcade_engine::physics::{Body, BodyId, Collider, Group, PhysicsEvent, World};
use arcade_engine::Vec2;
use serde::Deserialize;
use tracing::{debug, info, warn};

pub(crate) const KEY: &str = "bounce";
pub(crate) const BALL_KEY: &str = "ball";
pub(crate) const LEVEL_KEY: &str = "level";
pub(crate) const CREDITS_KEY: &str = "credits";

const BALL_RADIUS: f32 = 8.0;
const BALL_COLOR: [u8; 4] = [240, 180, 60, 255];
const PADDLE_WIDTH: f32 = 96.0;
const PADDLE_HEIGHT: f32 = 14.0;
const PADDLE_COLOR: [u8; 4] = [90, 160, 240, 255];
const PADDLE_SPEED: f32 = 420.0;
const PADDLE_FLOOR_GAP: f32 = 40.0;
const BANNER_COLOR: [u8; 4] = [230, 230, 240, 255];
const SPAWNED_BALL_LIFESPAN_MS: f32 = 8000.0;
const VELOCITY_LINE_SCALE: f32 = 0.1;
const VELOCITY_LINE_COLOR: [u8; 4] = [255, 80, 80, 255];

/// Tunables read from the `level` JSON asset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct LevelData {
    pub(crate) balls: u32,
    pub(crate) gravity: f32,
    pub(crate) bounce: f32,
    pub(crate) launch_speed: f32,
}

impl Default for LevelData {
    fn default() -> Self {
        Self {
            balls: 12,
            gravity: 300.0,
            bounce: 0.9,
            launch_speed: 240.0,
        }
    }
}

pub(crate) fn level_from_cache(cache: &Cache) -> LevelData {
    let Some(value) = cache.json(LEVEL_KEY) else {
        warn!(key = LEVEL_KEY, "level data missing; using defaults");
        return LevelData::default();
    };
    match serde_path_to_error::deserialize::<_, LevelData>(value.clone()) {
        Ok(level) => level,
        Err(error) => {
            warn!(
                key = LEVEL_KEY,
                path = %error.path(),
                error = %error.inner(),
                "level data rejected; using defaults"
            );
            LevelData::default()
        }
    }
}

/// Balls under gravity bouncing off each other, the world edges and a
/// keyboard-driven paddle.
#[derive(Default)]
pub(crate) struct BounceScene {
    level: LevelData,
    paddle: Option<BodyId>,
    balls: Group,
    ball_nodes: Vec<(NodeId, BodyId)>,
    spawned: u32,
    edge_hits: u64,
}

impl BounceScene {
    fn spawn_ball(&mut self, ctx: &mut GameContext, position: Vec2, velocity: Vec2, lifespan_ms: Option<f32>) {
        let graphic = if ctx.cache.texture(BALL_KEY).is_some() {
            Graphic::Sprite {
                key: BALL_KEY.to_string(),
                frame: Some((self.spawned % 2) as usize),
            }
        } else {
            Graphic::Circle {
                radius: BALL_RADIUS,
                color: BALL_COLOR,
            }
        };
        let mut node = Node::new(position.x, position.y).with_graphic(graphic);
        if let Some(lifespan_ms) = lifespan_ms {
            node = node.with_lifespan(lifespan_ms);
        }
        let node_id = ctx.stage.add(node);

        let mut body = Body::circle(0.0, 0.0, BALL_RADIUS);
        body.velocity = velocity;
        body.bounce = Vec2::new(self.level.bounce, self.level.bounce);
        body.collide_world_bounds = true;
        body.events.world_bounds = true;
        let Some(body_id) = ctx.stage.enable_body(node_id, body, &mut ctx.bodies) else {
            return;
        };
        self.balls.add(body_id);
        self.ball_nodes.push((node_id, body_id));
        self.spawned += 1;
    }

    fn spawn_paddle(&mut self, ctx: &mut GameContext) {
        let bounds = ctx.world.bounds;
        let x = bounds.x + (bounds.width - PADDLE_WIDTH) / 2.0;
        let y = bounds.bottom() - PADDLE_FLOOR_GAP;
        let node_id = ctx.stage.add(Node::new(x, y).with_graphic(Graphic::Rect {
            width: PADDLE_WIDTH,
            height: PADDLE_HEIGHT,
            color: PADDLE_COLOR,
        }));
        let mut body = Body::rect(0.0, 0.0, PADDLE_WIDTH, PADDLE_HEIGHT);
        body.immovable = true;
        body.allow_gravity = false;
        body.collide_world_bounds = true;
        self.paddle = ctx.stage.enable_body(node_id, body, &mut ctx.bodies);
    }

    fn spawn_banner(&mut self, ctx: &mut GameContext) {
        let bounds = ctx.world.bounds;
        let banner = ctx.stage.add(Node::new(bounds.x + 16.0, bounds.y + 12.0).with_graphic(
            Graphic::Rect {
                width: bounds.width - 32.0,
                height: 4.0,
                color: BANNER_COLOR,
            },
        ));
        ctx.tweens.add(
            Tween::to(banner, TweenProperty::Alpha, 0.2, 1200.0)
                .easing(Easing::SineInOut)
                .repeat(u32::MAX)
                .yoyo(true),
        );
    }

    fn steer_paddle(&mut self, ctx: &mut GameContext) {
        let Some(body) = self.paddle.and_then(|id| ctx.bodies.get_mut(id)) else {
            return;
        };
        let mut vx = 0.0;
        if ctx.input.is_down(Key::Left) {
            vx -= PADDLE_SPEED;
        }
        if ctx.input.is_down(Key::Right) {
            vx += PADDLE_SPEED;
        }
        body.velocity.x = vx;
    }

    fn handle_spawns(&mut self, ctx: &mut GameContext) {
        if ctx.input.just_pressed(Key::Space) {
            let origin = self
                .paddle
                .and_then(|id| ctx.bodies.get(id))
                .map(|paddle| Vec2::new(paddle.center().x - BALL_RADIUS, paddle.top() - BALL_RADIUS * 3.0));
            if let Some(origin) = origin {
                let velocity = Vec2::new(0.0, -self.level.launch_speed);
                self.spawn_ball(ctx, origin, velocity, Some(SPAWNED_BALL_LIFESPAN_MS));
            }
        }
        if ctx.input.pointer_just_pressed(PointerButton::Primary) {
            if let Some(pointer) = ctx.input.pointer() {
                let world = ctx.camera.screen_to_world(pointer);
                let at = Vec2::new(world.x - BALL_RADIUS, world.y - BALL_RADIUS);
                self.spawn_ball(ctx, at, Vec2::ZERO, Some(SPAWNED_BALL_LIFESPAN_MS));
            }
        }
        if ctx.input.just_pressed(Key::Up) {
            for id in self.balls.members() {
                if let Some(body) = ctx.bodies.get_mut(*id) {
                    body.velocity.y -= self.level.launch_speed;
                }
            }
        }
        if ctx.input.just_pressed(Key::Down) {
            ctx.debug.show_bodies = !ctx.debug.show_bodies;
        }
    }

    fn cull_expired(&mut self, ctx: &mut GameContext) {
        let expired: Vec<(NodeId, BodyId)> = self
            .ball_nodes
            .iter()
            .copied()
            .filter(|(node_id, _)| ctx.stage.get(*node_id).map_or(true, |node| !node.exists))
            .collect();
        if expired.is_empty() {
            return;
        }
        for (node_id, body_id) in &expired {
            ctx.stage.remove(*node_id, &mut ctx.bodies);
            self.balls.remove(*body_id);
        }
        self.ball_nodes.retain(|entry| !expired.contains(entry));
        debug!(expired = expired.len(), remaining = self.ball_nodes.len(), "balls_expired");
    }
}

impl Scene for BounceScene {
    fn init(&mut self, _ctx: &mut GameContext) {
        self.paddle = None;
        self.balls = Group::new();
        self.ball_nodes.clear();
        self.spawned = 0;
        self.edge_hits = 0;
    }

    fn create(&mut self, ctx: &mut GameContext) {
        self.level = level_from_cache(&ctx.cache);
        ctx.world.gravity = Vec2::new(0.0, self.level.gravity);
        ctx.debug.enabled = true;
        if let Some(credits) = ctx.cache.text(CREDITS_KEY) {
            info!(credits = credits.trim(), "credits_loaded");
        }

        self.spawn_banner(ctx);
        self.spawn_paddle(ctx);
        let bounds = ctx.world.bounds;
        let columns = ((bounds.width - 80.0) / (BALL_RADIUS * 4.0)).max(1.0) as u32;
        for index in 0..self.level.balls {
            let column = index % columns;
            let row = index / columns;
            let position = Vec2::new(
                bounds.x + 40.0 + column as f32 * BALL_RADIUS * 4.0,
                bounds.y + 40.0 + row as f32 * BALL_RADIUS * 4.0,
            );
            let angle = (index * 37 % 360) as f32;
            let velocity = World::velocity_from_angle(angle, self.level.launch_speed);
            self.spawn_ball(ctx, position, velocity, None);
        }
        info!(balls = self.ball_nodes.len(), gravity = self.level.gravity, "bounce_ready");
    }

    fn update(&mut self, ctx: &mut GameContext) {
        self.steer_paddle(ctx);
        self.handle_spawns(ctx);
        self.cull_expired(ctx);

        let balls = Collider::Group(&self.balls);
        ctx.world.collide(&mut ctx.bodies, &balls, None);
        if let Some(paddle) = self.paddle {
            ctx.world.collide(&mut ctx.bodies, &balls, Some(&Collider::Body(paddle)));
        }

        for event in ctx.world.drain_events() {
            if let PhysicsEvent::WorldBounds { .. } = event {
                self.edge_hits += 1;
            }
        }

        if ctx.debug.show_bodies {
            for (_, body_id) in &self.ball_nodes {
                if let Some(body) = ctx.bodies.get(*body_id) {
                    let center = body.center();
                    ctx.debug
                        .line(center, center + body.velocity * VELOCITY_LINE_SCALE, VELOCITY_LINE_COLOR);
                }
            }
        }
    }

    fn shutdown(&mut self, _ctx: &mut GameContext) {
        info!(edge_hits = self.edge_hits, spawned = self.spawned, "bounce_shutdown");
    }
}
