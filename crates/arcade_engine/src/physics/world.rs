use serde::Deserialize;
use tracing::debug;

use crate::geom::{Rect, Vec2};

use super::body::{Body, BodyId, BodySet, Group};
use super::collide::PhysicsEvent;
use super::quadtree::{QuadTree, DEFAULT_MAX_LEVELS, DEFAULT_MAX_OBJECTS};
use super::separate::{intersects, SeparationParams};

pub const OVERLAP_BIAS: f32 = 4.0;
pub const TILE_BIAS: f32 = 16.0;

/// Axis the broad phase sorts groups along before sweeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    None,
    #[default]
    LeftRight,
    RightLeft,
    TopBottom,
    BottomTop,
}

/// Which world-bound edges stop bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BoundsCollision {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl Default for BoundsCollision {
    fn default() -> Self {
        Self {
            up: true,
            down: true,
            left: true,
            right: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: Vec2,
    /// Defaults to the game area when absent.
    pub bounds: Option<Rect>,
    pub check_collision: BoundsCollision,
    pub sort_direction: SortDirection,
    pub overlap_bias: f32,
    pub tile_bias: f32,
    pub force_x: bool,
    pub use_quad_tree: bool,
    pub max_objects: usize,
    pub max_levels: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::ZERO,
            bounds: None,
            check_collision: BoundsCollision::default(),
            sort_direction: SortDirection::LeftRight,
            overlap_bias: OVERLAP_BIAS,
            tile_bias: TILE_BIAS,
            force_x: false,
            use_quad_tree: false,
            max_objects: DEFAULT_MAX_OBJECTS,
            max_levels: DEFAULT_MAX_LEVELS,
        }
    }
}

/// Arcade physics world. Bodies live in a `BodySet` owned by the caller; the
/// world only borrows it for each phase.
#[derive(Debug)]
pub struct World {
    pub gravity: Vec2,
    pub bounds: Rect,
    pub check_collision: BoundsCollision,
    pub sort_direction: SortDirection,
    pub overlap_bias: f32,
    pub tile_bias: f32,
    pub force_x: bool,
    pub use_quad_tree: bool,
    pub max_objects: usize,
    pub max_levels: u32,
    pub is_paused: bool,
    physics_elapsed: f32,
    pub(crate) quad_tree: QuadTree<BodyId>,
    pub(crate) events: Vec<PhysicsEvent>,
}

impl World {
    pub fn new(config: &WorldConfig, default_bounds: Rect) -> Self {
        let bounds = config.bounds.unwrap_or(default_bounds);
        Self {
            gravity: config.gravity,
            bounds,
            check_collision: config.check_collision,
            sort_direction: config.sort_direction,
            overlap_bias: config.overlap_bias,
            tile_bias: config.tile_bias,
            force_x: config.force_x,
            use_quad_tree: config.use_quad_tree,
            max_objects: config.max_objects,
            max_levels: config.max_levels,
            is_paused: false,
            physics_elapsed: 1.0 / 60.0,
            quad_tree: QuadTree::new(bounds, config.max_objects, config.max_levels),
            events: Vec::new(),
        }
    }

    pub fn set_bounds(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.bounds = Rect::new(x, y, width, height);
    }

    pub fn physics_elapsed(&self) -> f32 {
        self.physics_elapsed
    }

    /// Seconds integrated per step; set by the game clock before each step.
    pub fn set_physics_elapsed(&mut self, seconds: f32) {
        self.physics_elapsed = seconds;
    }

    pub fn params(&self) -> SeparationParams {
        SeparationParams {
            gravity: self.gravity,
            overlap_bias: self.overlap_bias,
            force_x: self.force_x,
            physics_elapsed: self.physics_elapsed,
        }
    }

    /// Per-axis velocity integration. Gravity adds; acceleration, when set,
    /// replaces drag for that axis.
    pub fn update_motion(&self, body: &mut Body) {
        let dt = self.physics_elapsed;
        if body.allow_rotation {
            let angular = compute_velocity(
                body.angular_velocity,
                0.0,
                body.angular_acceleration,
                body.angular_drag,
                body.allow_drag,
                body.max_angular,
                dt,
            );
            body.angular_velocity = angular;
            body.rotation += angular * dt;
        }

        let gravity = if body.allow_gravity {
            self.gravity + body.gravity
        } else {
            Vec2::ZERO
        };
        body.velocity.x = compute_velocity(
            body.velocity.x,
            gravity.x,
            body.acceleration.x,
            body.drag.x,
            body.allow_drag,
            body.max_velocity.x,
            dt,
        );
        body.velocity.y = compute_velocity(
            body.velocity.y,
            gravity.y,
            body.acceleration.y,
            body.drag.y,
            body.allow_drag,
            body.max_velocity.y,
            dt,
        );
    }

    /// Resets per-step contact state and integrates every enabled body.
    pub fn pre_update(&mut self, bodies: &mut BodySet) {
        if self.is_paused {
            return;
        }
        for (id, body) in bodies.iter_mut() {
            if !body.enable {
                continue;
            }
            body.begin_step();
            if !body.moves {
                continue;
            }
            self.update_motion(body);
            body.position += body.velocity * self.physics_elapsed;
            if body.position != body.prev {
                body.angle = body.velocity.y.atan2(body.velocity.x);
            }
            body.speed = body.velocity.length();
            if body.collide_world_bounds && self.check_world_bounds(body) && body.events.world_bounds {
                self.events.push(PhysicsEvent::WorldBounds {
                    body: id,
                    blocked: body.blocked,
                });
            }
        }
    }

    /// Re-applies world bounds after the scene's collision calls moved
    /// bodies this step.
    pub fn update(&mut self, bodies: &mut BodySet) {
        if self.is_paused {
            return;
        }
        for (_, body) in bodies.iter_mut() {
            if body.enable && body.moves && body.collide_world_bounds {
                self.check_world_bounds(body);
            }
        }
    }

    /// Clamps each body's step motion to `delta_max`, updates facing and rolls
    /// the previous position forward.
    pub fn post_update(&mut self, bodies: &mut BodySet) {
        if self.is_paused {
            return;
        }
        for (_, body) in bodies.iter_mut() {
            if body.enable {
                body.end_step();
            }
        }
    }

    fn check_world_bounds(&self, body: &mut Body) -> bool {
        let bounds = self.bounds;
        let check = self.check_collision;
        let bounce = body.world_bounce.unwrap_or(body.bounce);
        let stop = body.stop_velocity_on_collide;
        let rebound = |velocity: f32, factor: f32| if stop { 0.0 } else { -velocity * factor };

        if body.position.x < bounds.x && check.left {
            body.position.x = bounds.x;
            body.velocity.x = rebound(body.velocity.x, bounce.x);
            body.blocked.set_left();
        } else if body.right() > bounds.right() && check.right {
            body.position.x = bounds.right() - body.width();
            body.velocity.x = rebound(body.velocity.x, bounce.x);
            body.blocked.set_right();
        }

        if body.position.y < bounds.y && check.up {
            body.position.y = bounds.y;
            body.velocity.y = rebound(body.velocity.y, bounce.y);
            body.blocked.set_up();
        } else if body.bottom() > bounds.bottom() && check.down {
            body.position.y = bounds.bottom() - body.height();
            body.velocity.y = rebound(body.velocity.y, bounce.y);
            body.blocked.set_down();
        }

        let blocked = body.blocked.any();
        if blocked {
            debug!(x = body.position.x, y = body.position.y, "body_world_bounds");
        }
        blocked
    }

    pub fn events(&self) -> &[PhysicsEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<PhysicsEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn intersects(&self, bodies: &BodySet, a: BodyId, b: BodyId) -> bool {
        if a == b {
            return false;
        }
        match (bodies.get(a), bodies.get(b)) {
            (Some(first), Some(second)) => intersects(first, second),
            _ => false,
        }
    }

    /// Copy of the group's live members, ordered by `sort_direction`.
    pub fn sort(&self, bodies: &BodySet, group: &Group) -> Vec<BodyId> {
        let mut ids: Vec<BodyId> = group
            .members()
            .iter()
            .copied()
            .filter(|id| bodies.contains(*id))
            .collect();
        let position = |id: &BodyId| bodies.get(*id).map_or(Vec2::ZERO, |body| body.position);
        match self.sort_direction {
            SortDirection::None => {}
            SortDirection::LeftRight => ids.sort_by(|a, b| position(a).x.total_cmp(&position(b).x)),
            SortDirection::RightLeft => ids.sort_by(|a, b| position(b).x.total_cmp(&position(a).x)),
            SortDirection::TopBottom => ids.sort_by(|a, b| position(a).y.total_cmp(&position(b).y)),
            SortDirection::BottomTop => ids.sort_by(|a, b| position(b).y.total_cmp(&position(a).y)),
        }
        ids
    }

    pub fn distance_between(&self, bodies: &BodySet, a: BodyId, b: BodyId) -> Option<f32> {
        Some(bodies.get(a)?.center().distance(bodies.get(b)?.center()))
    }

    /// Radians from `a`'s center to `b`'s center.
    pub fn angle_between(&self, bodies: &BodySet, a: BodyId, b: BodyId) -> Option<f32> {
        Some(bodies.get(a)?.center().angle_to(bodies.get(b)?.center()))
    }

    pub fn velocity_from_angle(angle_degrees: f32, speed: f32) -> Vec2 {
        Vec2::from_polar(angle_degrees.to_radians(), speed)
    }

    pub fn velocity_from_rotation(rotation: f32, speed: f32) -> Vec2 {
        Vec2::from_polar(rotation, speed)
    }

    /// Points the body at `(x, y)`. A positive `max_time_ms` overrides
    /// `speed` so the target is reached in that time. Returns the angle.
    pub fn move_to_xy(&self, body: &mut Body, x: f32, y: f32, speed: f32, max_time_ms: f32) -> f32 {
        let center = body.center();
        let target = Vec2::new(x, y);
        let angle = center.angle_to(target);
        let speed = if max_time_ms > 0.0 {
            center.distance(target) / (max_time_ms / 1000.0)
        } else {
            speed
        };
        body.velocity = Vec2::from_polar(angle, speed);
        angle
    }

    pub fn accelerate_to_xy(
        &self,
        body: &mut Body,
        x: f32,
        y: f32,
        acceleration: f32,
        max_speed: Vec2,
    ) -> f32 {
        let angle = body.center().angle_to(Vec2::new(x, y));
        body.acceleration = Vec2::from_polar(angle, acceleration);
        body.max_velocity = max_speed;
        angle
    }

    pub fn closest(&self, bodies: &BodySet, source: BodyId, targets: &[BodyId]) -> Option<BodyId> {
        self.ranked(bodies, source, targets)
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(id, _)| id)
    }

    pub fn farthest(&self, bodies: &BodySet, source: BodyId, targets: &[BodyId]) -> Option<BodyId> {
        self.ranked(bodies, source, targets)
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(id, _)| id)
    }

    fn ranked<'a>(
        &'a self,
        bodies: &'a BodySet,
        source: BodyId,
        targets: &'a [BodyId],
    ) -> impl Iterator<Item = (BodyId, f32)> + 'a {
        targets.iter().filter(move |id| **id != source).filter_map(move |id| {
            self.distance_between(bodies, source, *id)
                .map(|distance| (*id, distance))
        })
    }

    pub fn bodies_at_point(&self, bodies: &BodySet, group: &Group, x: f32, y: f32) -> Vec<BodyId> {
        group
            .members()
            .iter()
            .copied()
            .filter(|id| bodies.get(*id).is_some_and(|body| body.hit_test(x, y)))
            .collect()
    }
}

fn compute_velocity(
    mut velocity: f32,
    gravity: f32,
    acceleration: f32,
    drag: f32,
    allow_drag: bool,
    max: f32,
    dt: f32,
) -> f32 {
    velocity += gravity * dt;
    if acceleration != 0.0 {
        velocity += acceleration * dt;
    } else if drag != 0.0 && allow_drag {
        let drag = drag * dt;
        if velocity - drag > 0.0 {
            velocity -= drag;
        } else if velocity + drag < 0.0 {
            velocity += drag;
        } else {
            velocity = 0.0;
        }
    }
    velocity.clamp(-max, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        let mut world = World::new(&WorldConfig::default(), Rect::new(0.0, 0.0, 100.0, 100.0));
        world.set_physics_elapsed(0.5);
        world
    }

    #[test]
    fn gravity_adds_to_acceleration_and_drag_yields() {
        let mut world = world();
        world.gravity = Vec2::new(0.0, 10.0);
        let mut body = Body::rect(0.0, 0.0, 1.0, 1.0);
        body.gravity = Vec2::new(0.0, 2.0);
        body.acceleration = Vec2::new(0.0, 4.0);
        body.drag = Vec2::new(100.0, 100.0);
        world.update_motion(&mut body);
        assert_eq!(body.velocity, Vec2::new(0.0, 8.0));

        body.allow_gravity = false;
        body.acceleration = Vec2::ZERO;
        body.velocity = Vec2::new(30.0, -30.0);
        world.update_motion(&mut body);
        assert_eq!(body.velocity, Vec2::new(0.0, 0.0));
    }

    #[test]
    fn velocity_is_clamped_to_max() {
        let world = world();
        let mut body = Body::rect(0.0, 0.0, 1.0, 1.0);
        body.max_velocity = Vec2::new(5.0, 5.0);
        body.acceleration = Vec2::new(1000.0, -1000.0);
        world.update_motion(&mut body);
        assert_eq!(body.velocity, Vec2::new(5.0, -5.0));
    }

    #[test]
    fn rotation_follows_angular_velocity() {
        let world = world();
        let mut body = Body::rect(0.0, 0.0, 1.0, 1.0);
        body.angular_velocity = 90.0;
        world.update_motion(&mut body);
        assert_eq!(body.rotation, 45.0);
        body.allow_rotation = false;
        world.update_motion(&mut body);
        assert_eq!(body.rotation, 45.0);
    }

    #[test]
    fn pre_update_integrates_and_stops_at_world_bounds() {
        let mut world = world();
        let mut bodies = BodySet::new();
        let mut body = Body::rect(90.0, 10.0, 8.0, 8.0);
        body.velocity = Vec2::new(20.0, 0.0);
        body.collide_world_bounds = true;
        body.world_bounce = Some(Vec2::new(0.5, 0.5));
        body.events.world_bounds = true;
        let id = bodies.insert(body);

        world.pre_update(&mut bodies);

        let body = bodies.get(id).expect("body");
        assert_eq!(body.position.x, 92.0);
        assert_eq!(body.velocity.x, -10.0);
        assert!(body.blocked.right);
        assert_eq!(body.prev, Vec2::new(90.0, 10.0));
        assert!(matches!(
            world.drain_events().as_slice(),
            [PhysicsEvent::WorldBounds { body: event_body, .. }] if *event_body == id
        ));
    }

    #[test]
    fn stop_velocity_on_collide_zeroes_instead_of_bouncing() {
        let mut world = world();
        let mut bodies = BodySet::new();
        let mut body = Body::rect(1.0, 1.0, 4.0, 4.0);
        body.velocity = Vec2::new(-10.0, 0.0);
        body.bounce = Vec2::ONE;
        body.collide_world_bounds = true;
        body.stop_velocity_on_collide = true;
        let id = bodies.insert(body);
        world.pre_update(&mut bodies);
        let body = bodies.get(id).expect("body");
        assert_eq!(body.position.x, 0.0);
        assert_eq!(body.velocity.x, 0.0);
    }

    #[test]
    fn paused_world_does_not_integrate() {
        let mut world = world();
        world.is_paused = true;
        let mut bodies = BodySet::new();
        let mut body = Body::rect(0.0, 0.0, 1.0, 1.0);
        body.velocity = Vec2::new(10.0, 0.0);
        let id = bodies.insert(body);
        world.pre_update(&mut bodies);
        assert_eq!(bodies.get(id).map(|body| body.position.x), Some(0.0));
    }

    #[test]
    fn post_update_reports_step_delta() {
        let mut world = world();
        let mut bodies = BodySet::new();
        let mut body = Body::rect(0.0, 0.0, 1.0, 1.0);
        body.velocity = Vec2::new(4.0, 0.0);
        body.delta_max = Vec2::new(1.0, 1.0);
        let id = bodies.insert(body);
        world.pre_update(&mut bodies);
        world.post_update(&mut bodies);
        let body = bodies.get(id).expect("body");
        assert_eq!(body.step_delta(), Vec2::new(1.0, 0.0));
        assert_eq!(body.position.x, 1.0);
    }

    #[test]
    fn move_to_xy_honours_max_time() {
        let world = world();
        let mut body = Body::rect(0.0, 0.0, 2.0, 2.0);
        let angle = world.move_to_xy(&mut body, 101.0, 1.0, 60.0, 500.0);
        assert_eq!(angle, 0.0);
        assert!((body.velocity.x - 200.0).abs() < 1e-3);

        world.move_to_xy(&mut body, 1.0, 11.0, 60.0, 0.0);
        assert!((body.velocity.y - 60.0).abs() < 1e-3);
    }

    #[test]
    fn closest_and_farthest_skip_source() {
        let world = world();
        let mut bodies = BodySet::new();
        let source = bodies.insert(Body::rect(0.0, 0.0, 2.0, 2.0));
        let near = bodies.insert(Body::rect(5.0, 0.0, 2.0, 2.0));
        let far = bodies.insert(Body::rect(50.0, 0.0, 2.0, 2.0));
        let targets = [source, far, near];
        assert_eq!(world.closest(&bodies, source, &targets), Some(near));
        assert_eq!(world.farthest(&bodies, source, &targets), Some(far));

        let group = Group::from_ids(targets);
        assert_eq!(world.bodies_at_point(&bodies, &group, 51.0, 1.0), vec![far]);
    }

    #[test]
    fn sort_orders_a_copy_of_the_group() {
        let mut world = world();
        let mut bodies = BodySet::new();
        let right = bodies.insert(Body::rect(30.0, 0.0, 1.0, 1.0));
        let left = bodies.insert(Body::rect(10.0, 5.0, 1.0, 1.0));
        let group = Group::from_ids([right, left]);

        assert_eq!(world.sort(&bodies, &group), vec![left, right]);
        world.sort_direction = SortDirection::BottomTop;
        assert_eq!(world.sort(&bodies, &group), vec![left, right]);
        world.sort_direction = SortDirection::RightLeft;
        assert_eq!(world.sort(&bodies, &group), vec![right, left]);
        assert_eq!(group.members(), &[right, left]);
    }
}
