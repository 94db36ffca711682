use crate::geom::{Rect, Vec2};

pub const DEFAULT_MAX_VELOCITY: f32 = 10_000.0;
pub const DEFAULT_MAX_ANGULAR: f32 = 1_000.0;

/// Per-edge flags, shared by `check_collision`, `touching` and `blocked`.
/// `none` is true when no edge is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeFlags {
    pub none: bool,
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl EdgeFlags {
    pub const NONE: EdgeFlags = EdgeFlags {
        none: true,
        up: false,
        down: false,
        left: false,
        right: false,
    };

    pub const ALL: EdgeFlags = EdgeFlags {
        none: false,
        up: true,
        down: true,
        left: true,
        right: true,
    };

    pub fn any(&self) -> bool {
        self.up || self.down || self.left || self.right
    }

    pub(crate) fn set_up(&mut self) {
        self.none = false;
        self.up = true;
    }

    pub(crate) fn set_down(&mut self) {
        self.none = false;
        self.down = true;
    }

    pub(crate) fn set_left(&mut self) {
        self.none = false;
        self.left = true;
    }

    pub(crate) fn set_right(&mut self) {
        self.none = false;
        self.right = true;
    }
}

impl Default for EdgeFlags {
    fn default() -> Self {
        EdgeFlags::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    #[default]
    None,
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Rect,
    Circle { radius: f32 },
}

/// Which physics events a body wants queued on the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BodyEvents {
    pub collide: bool,
    pub overlap: bool,
    pub world_bounds: bool,
}

/// Arcade body. `position` is the top-left corner of the axis-aligned
/// bounds; circles are bounded by their `2r x 2r` box.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    shape: Shape,
    pub enable: bool,
    pub position: Vec2,
    pub prev: Vec2,
    pub offset: Vec2,
    width: f32,
    height: f32,
    pub velocity: Vec2,
    pub acceleration: Vec2,
    pub drag: Vec2,
    pub gravity: Vec2,
    pub bounce: Vec2,
    /// Overrides `bounce` against world bounds.
    pub world_bounce: Option<Vec2>,
    pub max_velocity: Vec2,
    pub friction: Vec2,
    pub angular_velocity: f32,
    pub angular_acceleration: f32,
    pub angular_drag: f32,
    pub max_angular: f32,
    /// Degrees.
    pub rotation: f32,
    pub prev_rotation: f32,
    pub mass: f32,
    pub allow_gravity: bool,
    pub allow_drag: bool,
    pub allow_rotation: bool,
    pub immovable: bool,
    pub moves: bool,
    pub custom_separate_x: bool,
    pub custom_separate_y: bool,
    pub collide_world_bounds: bool,
    pub stop_velocity_on_collide: bool,
    pub skip_quad_tree: bool,
    pub check_collision: EdgeFlags,
    pub touching: EdgeFlags,
    pub was_touching: EdgeFlags,
    pub blocked: EdgeFlags,
    pub embedded: bool,
    pub overlap_x: f32,
    pub overlap_y: f32,
    pub overlap_r: f32,
    pub facing: Facing,
    /// Per-step motion cap applied at post-update; zero disables.
    pub delta_max: Vec2,
    pub speed: f32,
    /// Radians, direction of travel.
    pub angle: f32,
    pub events: BodyEvents,
    pub(crate) fresh: bool,
    pub(crate) dirty: bool,
    pub(crate) step_delta: Vec2,
}

impl Body {
    fn with_shape(shape: Shape, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            shape,
            enable: true,
            position: Vec2::new(x, y),
            prev: Vec2::new(x, y),
            offset: Vec2::ZERO,
            width,
            height,
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            drag: Vec2::ZERO,
            gravity: Vec2::ZERO,
            bounce: Vec2::ZERO,
            world_bounce: None,
            max_velocity: Vec2::new(DEFAULT_MAX_VELOCITY, DEFAULT_MAX_VELOCITY),
            friction: Vec2::new(1.0, 0.0),
            angular_velocity: 0.0,
            angular_acceleration: 0.0,
            angular_drag: 0.0,
            max_angular: DEFAULT_MAX_ANGULAR,
            rotation: 0.0,
            prev_rotation: 0.0,
            mass: 1.0,
            allow_gravity: true,
            allow_drag: true,
            allow_rotation: true,
            immovable: false,
            moves: true,
            custom_separate_x: false,
            custom_separate_y: false,
            collide_world_bounds: false,
            stop_velocity_on_collide: false,
            skip_quad_tree: false,
            check_collision: EdgeFlags::ALL,
            touching: EdgeFlags::NONE,
            was_touching: EdgeFlags::NONE,
            blocked: EdgeFlags::NONE,
            embedded: false,
            overlap_x: 0.0,
            overlap_y: 0.0,
            overlap_r: 0.0,
            facing: Facing::None,
            delta_max: Vec2::ZERO,
            speed: 0.0,
            angle: 0.0,
            events: BodyEvents::default(),
            fresh: true,
            dirty: false,
            step_delta: Vec2::ZERO,
        }
    }

    pub fn rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::with_shape(Shape::Rect, x, y, width.abs(), height.abs())
    }

    /// Circle whose bounding box has its top-left corner at `(x, y)`.
    pub fn circle(x: f32, y: f32, radius: f32) -> Self {
        let radius = radius.abs();
        Self::with_shape(Shape::Circle { radius }, x, y, radius * 2.0, radius * 2.0)
    }

    pub fn is_circle(&self) -> bool {
        matches!(self.shape, Shape::Circle { .. })
    }

    pub fn radius(&self) -> f32 {
        match self.shape {
            Shape::Circle { radius } => radius,
            Shape::Rect => 0.0,
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn half_width(&self) -> f32 {
        self.width * 0.5
    }

    pub fn half_height(&self) -> f32 {
        self.height * 0.5
    }

    /// Resizes a rectangle body. Circles keep their shape; returns false.
    pub fn set_size(&mut self, width: f32, height: f32, offset: Vec2) -> bool {
        if self.is_circle() {
            return false;
        }
        self.width = width.abs();
        self.height = height.abs();
        self.offset = offset;
        true
    }

    /// Changes a circle's radius. Rectangles keep their shape; returns false.
    pub fn set_radius(&mut self, radius: f32, offset: Vec2) -> bool {
        if !self.is_circle() {
            return false;
        }
        let radius = radius.abs();
        self.shape = Shape::Circle { radius };
        self.width = radius * 2.0;
        self.height = radius * 2.0;
        self.offset = offset;
        true
    }

    pub fn left(&self) -> f32 {
        self.position.x
    }

    pub fn top(&self) -> f32 {
        self.position.y
    }

    pub fn right(&self) -> f32 {
        self.position.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.position.y + self.height
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            self.position.x + self.half_width(),
            self.position.y + self.half_height(),
        )
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.position.x, self.position.y, self.width, self.height)
    }

    pub fn delta_x(&self) -> f32 {
        self.position.x - self.prev.x
    }

    pub fn delta_y(&self) -> f32 {
        self.position.y - self.prev.y
    }

    pub fn delta_abs_x(&self) -> f32 {
        self.delta_x().abs()
    }

    pub fn delta_abs_y(&self) -> f32 {
        self.delta_y().abs()
    }

    pub fn delta_z(&self) -> f32 {
        self.rotation - self.prev_rotation
    }

    /// Motion applied by the last post-update, after `delta_max` clamping.
    pub fn step_delta(&self) -> Vec2 {
        self.step_delta
    }

    pub fn on_floor(&self) -> bool {
        self.blocked.down
    }

    pub fn on_ceiling(&self) -> bool {
        self.blocked.up
    }

    pub fn on_wall(&self) -> bool {
        self.blocked.left || self.blocked.right
    }

    pub fn hit_test(&self, x: f32, y: f32) -> bool {
        if self.is_circle() {
            let center = self.center();
            let (dx, dy) = (x - center.x, y - center.y);
            dx * dx + dy * dy <= self.radius() * self.radius()
        } else {
            self.bounds().contains(x, y)
        }
    }

    /// Teleports the body and zeroes its motion.
    pub fn reset(&mut self, x: f32, y: f32) {
        self.velocity = Vec2::ZERO;
        self.acceleration = Vec2::ZERO;
        self.speed = 0.0;
        self.angular_velocity = 0.0;
        self.angular_acceleration = 0.0;
        self.position = Vec2::new(x, y);
        self.prev = self.position;
        self.prev_rotation = self.rotation;
        self.step_delta = Vec2::ZERO;
        self.fresh = true;
    }

    pub(crate) fn begin_step(&mut self) {
        self.dirty = true;
        self.was_touching = self.touching;
        self.touching = EdgeFlags::NONE;
        self.blocked = EdgeFlags::NONE;
        self.overlap_x = 0.0;
        self.overlap_y = 0.0;
        self.overlap_r = 0.0;
        self.embedded = false;
        self.prev_rotation = self.rotation;
        if self.fresh {
            self.prev = self.position;
            self.fresh = false;
        }
    }

    /// Clamps this step's motion, updates facing and rolls `prev` forward.
    pub(crate) fn end_step(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;

        let mut delta = Vec2::new(self.delta_x(), self.delta_y());
        if delta.x < 0.0 {
            self.facing = Facing::Left;
        } else if delta.x > 0.0 {
            self.facing = Facing::Right;
        }
        if delta.y < 0.0 {
            self.facing = Facing::Up;
        } else if delta.y > 0.0 {
            self.facing = Facing::Down;
        }

        if self.moves {
            if self.delta_max.x != 0.0 {
                delta.x = delta.x.clamp(-self.delta_max.x, self.delta_max.x);
            }
            if self.delta_max.y != 0.0 {
                delta.y = delta.y.clamp(-self.delta_max.y, self.delta_max.y);
            }
            self.position = self.prev + delta;
            self.step_delta = delta;
            self.fresh = true;
        } else {
            self.step_delta = Vec2::ZERO;
        }
        self.prev = self.position;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    body: Option<Body>,
}

/// Generational arena of bodies. Stale ids resolve to `None`.
#[derive(Debug, Clone, Default)]
pub struct BodySet {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl BodySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, body: Body) -> BodyId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.body = Some(body);
            return BodyId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            body: Some(body),
        });
        BodyId {
            index,
            generation: 0,
        }
    }

    pub fn remove(&mut self, id: BodyId) -> Option<Body> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let body = slot.body.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(body)
    }

    pub fn get(&self, id: BodyId) -> Option<&Body> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.body.as_ref()
    }

    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.body.as_mut()
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.get(id).is_some()
    }

    /// Both bodies mutably; `None` if either is missing or the ids are equal.
    pub fn pair_mut(&mut self, a: BodyId, b: BodyId) -> Option<(&mut Body, &mut Body)> {
        if a.index == b.index || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let (low, high, swapped) = if a.index < b.index {
            (a.index as usize, b.index as usize, false)
        } else {
            (b.index as usize, a.index as usize, true)
        };
        let (head, tail) = self.slots.split_at_mut(high);
        let first = head[low].body.as_mut()?;
        let second = tail[0].body.as_mut()?;
        if swapped {
            Some((second, first))
        } else {
            Some((first, second))
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &Body)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.body.as_ref().map(|body| {
                (
                    BodyId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    body,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (BodyId, &mut Body)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.body.as_mut().map(|body| {
                (
                    BodyId {
                        index: index as u32,
                        generation,
                    },
                    body,
                )
            })
        })
    }

    pub fn ids(&self) -> Vec<BodyId> {
        self.iter().map(|(id, _)| id).collect()
    }
}

/// Ordered membership list used for batched collision. Does not own bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    members: Vec<BodyId>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = BodyId>) -> Self {
        let mut group = Self::new();
        for id in ids {
            group.add(id);
        }
        group
    }

    pub fn add(&mut self, id: BodyId) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        self.members.push(id);
        true
    }

    pub fn remove(&mut self, id: BodyId) -> bool {
        let before = self.members.len();
        self.members.retain(|member| *member != id);
        before != self.members.len()
    }

    pub fn members(&self) -> &[BodyId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
