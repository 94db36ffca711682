use crate::geom::Rect;

use super::body::{BodyEvents, BodyId, BodySet, EdgeFlags, Group};
use super::separate::{can_collide, resolve};
use super::tile::{separate_tile, Tile, TileLayer};
use super::world::{SortDirection, World};

/// One side of a collision query.
pub enum Collider<'a> {
    Body(BodyId),
    Group(&'a Group),
    TileLayer(&'a dyn TileLayer),
    Many(Vec<Collider<'a>>),
}

impl From<BodyId> for Collider<'_> {
    fn from(id: BodyId) -> Self {
        Collider::Body(id)
    }
}

impl<'a> From<&'a Group> for Collider<'a> {
    fn from(group: &'a Group) -> Self {
        Collider::Group(group)
    }
}

/// What a body touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Collidable {
    Body(BodyId),
    Tile(Tile),
}

/// Queued for bodies whose `events` flags ask for it; drained by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhysicsEvent {
    Collide { body: BodyId, other: Collidable },
    Overlap { body: BodyId, other: Collidable },
    WorldBounds { body: BodyId, blocked: EdgeFlags },
}

type ProcessFn<'h> = dyn FnMut(&BodySet, BodyId, Collidable) -> bool + 'h;
type CallbackFn<'h> = dyn FnMut(BodyId, Collidable) + 'h;

struct Pass<'h> {
    process: Option<&'h mut ProcessFn<'h>>,
    callback: Option<&'h mut CallbackFn<'h>>,
    overlap_only: bool,
    total: usize,
}

impl World {
    /// Separates every intersecting pair drawn from `a` and `b`. A lone group
    /// collides with itself. Returns whether anything collided.
    pub fn collide(&mut self, bodies: &mut BodySet, a: &Collider<'_>, b: Option<&Collider<'_>>) -> bool {
        self.run(bodies, a, b, Pass::new(None, None, false))
    }

    /// `process` runs before each separation and may veto it; `callback`
    /// runs after each separation that happened.
    pub fn collide_with<P, C>(
        &mut self,
        bodies: &mut BodySet,
        a: &Collider<'_>,
        b: Option<&Collider<'_>>,
        mut process: P,
        mut callback: C,
    ) -> bool
    where
        P: FnMut(&BodySet, BodyId, Collidable) -> bool,
        C: FnMut(BodyId, Collidable),
    {
        let process: &mut ProcessFn<'_> = &mut process;
        let callback: &mut CallbackFn<'_> = &mut callback;
        self.run(bodies, a, b, Pass::new(Some(process), Some(callback), false))
    }

    /// Like `collide` but reports intersections without moving anything.
    pub fn overlap(&mut self, bodies: &mut BodySet, a: &Collider<'_>, b: Option<&Collider<'_>>) -> bool {
        self.run(bodies, a, b, Pass::new(None, None, true))
    }

    pub fn overlap_with<P, C>(
        &mut self,
        bodies: &mut BodySet,
        a: &Collider<'_>,
        b: Option<&Collider<'_>>,
        mut process: P,
        mut callback: C,
    ) -> bool
    where
        P: FnMut(&BodySet, BodyId, Collidable) -> bool,
        C: FnMut(BodyId, Collidable),
    {
        let process: &mut ProcessFn<'_> = &mut process;
        let callback: &mut CallbackFn<'_> = &mut callback;
        self.run(bodies, a, b, Pass::new(Some(process), Some(callback), true))
    }

    /// Separates one pair directly, skipping the broad phase.
    pub fn separate(&mut self, bodies: &mut BodySet, a: BodyId, b: BodyId, overlap_only: bool) -> bool {
        let mut pass = Pass::new(None, None, overlap_only);
        self.separate_pair(bodies, a, b, &mut pass)
    }

    fn run(&mut self, bodies: &mut BodySet, a: &Collider<'_>, b: Option<&Collider<'_>>, mut pass: Pass<'_>) -> bool {
        self.handle(bodies, a, b, &mut pass);
        pass.total > 0
    }

    fn handle(&mut self, bodies: &mut BodySet, a: &Collider<'_>, b: Option<&Collider<'_>>, pass: &mut Pass<'_>) {
        match (a, b) {
            (Collider::Many(items), _) => {
                for item in items {
                    self.handle(bodies, item, b, pass);
                }
            }
            (_, Some(Collider::Many(items))) => {
                for item in items {
                    self.handle(bodies, a, Some(item), pass);
                }
            }
            (Collider::Group(group), None) => {
                let sorted = self.sort(bodies, group);
                self.group_vs_self(bodies, &sorted, pass);
            }
            (_, None) => {}
            (Collider::Body(first), Some(Collider::Body(second))) => {
                self.body_vs_body(bodies, *first, *second, pass);
            }
            (Collider::Body(body), Some(Collider::Group(group)))
            | (Collider::Group(group), Some(Collider::Body(body))) => {
                let sorted = self.sort(bodies, group);
                self.body_vs_group(bodies, *body, &sorted, pass);
            }
            (Collider::Group(first), Some(Collider::Group(second))) => {
                let sorted = self.sort(bodies, second);
                for body in self.sort(bodies, first) {
                    self.body_vs_group(bodies, body, &sorted, pass);
                }
            }
            (Collider::Body(body), Some(Collider::TileLayer(layer)))
            | (Collider::TileLayer(layer), Some(Collider::Body(body))) => {
                self.body_vs_tiles(bodies, *body, *layer, pass);
            }
            (Collider::Group(group), Some(Collider::TileLayer(layer)))
            | (Collider::TileLayer(layer), Some(Collider::Group(group))) => {
                for body in group.members() {
                    self.body_vs_tiles(bodies, *body, *layer, pass);
                }
            }
            (Collider::TileLayer(_), Some(Collider::TileLayer(_))) => {}
        }
    }

    fn body_vs_body(&mut self, bodies: &mut BodySet, a: BodyId, b: BodyId, pass: &mut Pass<'_>) {
        if self.separate_pair(bodies, a, b, pass) {
            if let Some(callback) = pass.callback.as_deref_mut() {
                callback(a, Collidable::Body(b));
            }
            pass.total += 1;
        }
    }

    fn body_vs_group(&mut self, bodies: &mut BodySet, subject: BodyId, candidates: &[BodyId], pass: &mut Pass<'_>) {
        let Some(body) = bodies.get(subject) else {
            return;
        };
        if candidates.is_empty() || !body.enable {
            return;
        }

        if self.use_quad_tree && !body.skip_quad_tree {
            let area = body.bounds();
            self.quad_tree.reset(self.bounds, self.max_objects, self.max_levels);
            self.quad_tree.populate(candidates.iter().filter_map(|id| {
                bodies
                    .get(*id)
                    .filter(|candidate| candidate.enable)
                    .map(|candidate| (*id, candidate.bounds()))
            }));
            for other in self.quad_tree.retrieve(&area) {
                if other != subject {
                    self.body_vs_body(bodies, subject, other, pass);
                }
            }
            return;
        }

        for &other in candidates {
            if other == subject {
                continue;
            }
            let (Some(body), Some(candidate)) = (bodies.get(subject), bodies.get(other)) else {
                continue;
            };
            match sweep(self.sort_direction, body.bounds(), candidate.bounds()) {
                Sweep::Stop => break,
                Sweep::Skip => continue,
                Sweep::Test => self.body_vs_body(bodies, subject, other, pass),
            }
        }
    }

    fn group_vs_self(&mut self, bodies: &mut BodySet, sorted: &[BodyId], pass: &mut Pass<'_>) {
        for (index, &first) in sorted.iter().enumerate() {
            for &second in &sorted[index + 1..] {
                let (Some(a), Some(b)) = (bodies.get(first), bodies.get(second)) else {
                    continue;
                };
                match sweep(self.sort_direction, a.bounds(), b.bounds()) {
                    Sweep::Stop => break,
                    Sweep::Skip => continue,
                    Sweep::Test => self.body_vs_body(bodies, first, second, pass),
                }
            }
        }
    }

    fn body_vs_tiles(&mut self, bodies: &mut BodySet, id: BodyId, layer: &dyn TileLayer, pass: &mut Pass<'_>) {
        let Some(body) = bodies.get(id) else {
            return;
        };
        if !body.enable {
            return;
        }
        let tiles = layer.colliding_tiles(body.bounds());
        let bias = self.tile_bias;
        for tile in tiles {
            if let Some(process) = pass.process.as_deref_mut() {
                if !process(&*bodies, id, Collidable::Tile(tile)) {
                    continue;
                }
            }
            let Some(body) = bodies.get_mut(id) else {
                return;
            };
            if separate_tile(body, &tile, pass.overlap_only, bias) {
                pass.total += 1;
                self.record(id, Collidable::Tile(tile), body.events, pass.overlap_only);
                if let Some(callback) = pass.callback.as_deref_mut() {
                    callback(id, Collidable::Tile(tile));
                }
            }
        }
    }

    fn separate_pair(&mut self, bodies: &mut BodySet, a: BodyId, b: BodyId, pass: &mut Pass<'_>) -> bool {
        if a == b {
            return false;
        }
        let eligible = match (bodies.get(a), bodies.get(b)) {
            (Some(first), Some(second)) => can_collide(first, second),
            _ => false,
        };
        if !eligible {
            return false;
        }
        if let Some(process) = pass.process.as_deref_mut() {
            if !process(&*bodies, a, Collidable::Body(b)) {
                return false;
            }
        }

        let params = self.params();
        let Some((first, second)) = bodies.pair_mut(a, b) else {
            return false;
        };
        let separated = resolve(first, second, &params, pass.overlap_only);
        if separated {
            let (events_a, events_b) = (first.events, second.events);
            self.record(a, Collidable::Body(b), events_a, pass.overlap_only);
            self.record(b, Collidable::Body(a), events_b, pass.overlap_only);
        }
        separated
    }

    fn record(&mut self, body: BodyId, other: Collidable, wants: BodyEvents, overlap_only: bool) {
        if overlap_only && wants.overlap {
            self.events.push(PhysicsEvent::Overlap { body, other });
        } else if !overlap_only && wants.collide {
            self.events.push(PhysicsEvent::Collide { body, other });
        }
    }
}

impl<'h> Pass<'h> {
    fn new(process: Option<&'h mut ProcessFn<'h>>, callback: Option<&'h mut CallbackFn<'h>>, overlap_only: bool) -> Self {
        Self {
            process,
            callback,
            overlap_only,
            total: 0,
        }
    }
}

enum Sweep {
    /// Candidate and everything after it lies beyond the subject.
    Stop,
    /// Candidate lies behind the subject on the sort axis.
    Skip,
    Test,
}

fn sweep(direction: SortDirection, subject: Rect, candidate: Rect) -> Sweep {
    let (stop, skip) = match direction {
        SortDirection::None => (false, false),
        SortDirection::LeftRight => (subject.right() < candidate.x, candidate.right() < subject.x),
        SortDirection::RightLeft => (subject.x > candidate.right(), candidate.x > subject.right()),
        SortDirection::TopBottom => (subject.bottom() < candidate.y, candidate.bottom() < subject.y),
        SortDirection::BottomTop => (subject.y > candidate.bottom(), candidate.y > subject.bottom()),
    };
    if stop {
        Sweep::Stop
    } else if skip {
        Sweep::Skip
    } else {
        Sweep::Test
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Vec2;
    use crate::physics::body::Body;
    use crate::physics::tile::GridTileLayer;
    use crate::physics::world::WorldConfig;

    fn world() -> World {
        World::new(&WorldConfig::default(), Rect::new(0.0, 0.0, 400.0, 400.0))
    }

    fn row(bodies: &mut BodySet, xs: &[f32]) -> Vec<BodyId> {
        xs.iter()
            .map(|x| bodies.insert(Body::rect(*x, 0.0, 10.0, 10.0)))
            .collect()
    }

    #[test]
    fn sorted_sweep_prunes_far_candidates() {
        let mut world = world();
        let mut bodies = BodySet::new();
        let group = Group::from_ids(row(&mut bodies, &[200.0, 0.0, 100.0]));
        let mut subject = Body::rect(95.0, 0.0, 10.0, 10.0);
        subject.velocity = Vec2::new(10.0, 0.0);
        subject.prev = Vec2::new(94.0, 0.0);
        let subject = bodies.insert(subject);

        let mut tested = Vec::new();
        let hit = world.collide_with(
            &mut bodies,
            &Collider::Body(subject),
            Some(&Collider::Group(&group)),
            |bodies, _, other| {
                if let Collidable::Body(other) = other {
                    tested.push(bodies.get(other).map(|body| body.position.x));
                }
                true
            },
            |_, _| {},
        );

        assert!(hit);
        assert_eq!(tested, vec![Some(100.0)]);
    }

    #[test]
    fn process_veto_leaves_bodies_untouched() {
        let mut world = world();
        let mut bodies = BodySet::new();
        let ids = row(&mut bodies, &[0.0, 5.0]);
        let before = bodies.get(ids[0]).cloned();
        let mut called = 0;

        let hit = world.collide_with(
            &mut bodies,
            &ids[0].into(),
            Some(&ids[1].into()),
            |_, _, _| false,
            |_, _| called += 1,
        );

        assert!(!hit);
        assert_eq!(called, 0);
        assert_eq!(bodies.get(ids[0]).cloned(), before);
    }

    #[test]
    fn lone_group_collides_with_itself() {
        let mut world = world();
        let mut bodies = BodySet::new();
        let ids = row(&mut bodies, &[0.0, 6.0, 100.0]);
        for id in &ids {
            if let Some(body) = bodies.get_mut(*id) {
                body.events.collide = true;
            }
        }
        let group = Group::from_ids(ids.clone());
        let mut pairs = Vec::new();

        let hit = world.collide_with(
            &mut bodies,
            &Collider::Group(&group),
            None,
            |_, _, _| true,
            |body, other| pairs.push((body, other)),
        );

        assert!(hit);
        assert_eq!(pairs, vec![(ids[0], Collidable::Body(ids[1]))]);
        assert_eq!(world.drain_events().len(), 2);
        assert!(world.events().is_empty());
    }

    #[test]
    fn quad_tree_path_finds_same_contacts() {
        let xs = [0.0, 6.0, 50.0, 300.0, 305.0];
        let mut contacts = Vec::new();
        for use_quad_tree in [false, true] {
            let mut world = world();
            world.use_quad_tree = use_quad_tree;
            world.max_objects = 1;
            let mut bodies = BodySet::new();
            let ids = row(&mut bodies, &xs);
            let group = Group::from_ids(ids[1..].iter().copied());
            let mut found = Vec::new();
            world.overlap_with(
                &mut bodies,
                &Collider::Body(ids[0]),
                Some(&Collider::Group(&group)),
                |_, _, _| true,
                |_, other| found.push(other),
            );
            contacts.push(found);
        }
        assert_eq!(contacts[0], contacts[1]);
        assert_eq!(contacts[0].len(), 1);
    }

    #[test]
    fn overlap_reports_without_separating() {
        let mut world = world();
        let mut bodies = BodySet::new();
        let ids = row(&mut bodies, &[0.0, 5.0]);
        if let Some(body) = bodies.get_mut(ids[1]) {
            body.events.overlap = true;
        }
        assert!(world.overlap(&mut bodies, &ids[0].into(), Some(&ids[1].into())));
        assert_eq!(bodies.get(ids[1]).map(|body| body.position.x), Some(5.0));
        assert!(matches!(
            world.drain_events().as_slice(),
            [PhysicsEvent::Overlap { body, .. }] if *body == ids[1]
        ));
    }

    #[test]
    fn many_collider_fans_out() {
        let mut world = world();
        let mut bodies = BodySet::new();
        let ids = row(&mut bodies, &[0.0, 100.0]);
        let probe = bodies.insert(Body::rect(95.0, 0.0, 10.0, 10.0));
        let many = Collider::Many(vec![ids[0].into(), ids[1].into()]);
        assert!(world.overlap(&mut bodies, &many, Some(&probe.into())));
        assert!(!world.overlap(&mut bodies, &ids[0].into(), Some(&probe.into())));
    }

    #[test]
    fn immovable_body_is_never_moved_by_world_collide() {
        let mut world = world();
        let mut bodies = BodySet::new();
        let mut wall = Body::rect(10.0, 0.0, 10.0, 10.0);
        wall.immovable = true;
        wall.mass = 1000.0;
        let wall = bodies.insert(wall);
        let mut mover = Body::rect(1.0, 0.0, 10.0, 10.0);
        mover.prev = Vec2::new(0.0, 0.0);
        mover.velocity = Vec2::new(60.0, 0.0);
        let mover = bodies.insert(mover);

        assert!(world.collide(&mut bodies, &mover.into(), Some(&wall.into())));
        assert_eq!(bodies.get(wall).map(|body| body.position), Some(Vec2::new(10.0, 0.0)));
        assert_eq!(bodies.get(mover).map(|body| body.right()), Some(10.0));
    }

    #[test]
    fn group_lands_on_tile_layer() {
        let mut world = world();
        let mut bodies = BodySet::new();
        let mut layer = GridTileLayer::new(vec![vec![0, 0], vec![1, 1]], 16.0, 16.0);
        layer.set_collision(&[1]);
        let mut body = Body::rect(4.0, 8.0, 8.0, 10.0);
        body.prev = Vec2::new(4.0, 5.0);
        let id = bodies.insert(body);
        let group = Group::from_ids([id]);

        assert!(world.collide(&mut bodies, &Collider::Group(&group), Some(&Collider::TileLayer(&layer))));
        assert_eq!(bodies.get(id).map(|body| body.bottom()), Some(16.0));
    }
}
