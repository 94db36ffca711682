use crate::geom::Vec2;

use super::body::Body;
use super::circle::separate_circle;

/// World state the narrow phase needs for one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeparationParams {
    pub gravity: Vec2,
    pub overlap_bias: f32,
    pub force_x: bool,
    /// Seconds of the current physics step.
    pub physics_elapsed: f32,
}

impl Default for SeparationParams {
    fn default() -> Self {
        Self {
            gravity: Vec2::ZERO,
            overlap_bias: 4.0,
            force_x: false,
            physics_elapsed: 1.0 / 60.0,
        }
    }
}

/// Axis-aligned overlap test on unrotated bounds. Touching edges do not
/// intersect; circles use center distance.
pub fn intersects(a: &Body, b: &Body) -> bool {
    match (a.is_circle(), b.is_circle()) {
        (true, true) => a.center().distance(b.center()) <= a.radius() + b.radius(),
        (true, false) => circle_body_intersects(a, b),
        (false, true) => circle_body_intersects(b, a),
        (false, false) => {
            !(a.right() <= b.left()
                || a.bottom() <= b.top()
                || a.left() >= b.right()
                || a.top() >= b.bottom())
        }
    }
}

/// Clamps the circle center into the rectangle and compares distances.
pub fn circle_body_intersects(circle: &Body, body: &Body) -> bool {
    let center = circle.center();
    let x = center.x.clamp(body.left(), body.right());
    let y = center.y.clamp(body.top(), body.bottom());
    let dx = center.x - x;
    let dy = center.y - y;
    dx * dx + dy * dy <= circle.radius() * circle.radius()
}

/// Whether the pair is eligible for the narrow phase at all.
pub(crate) fn can_collide(a: &Body, b: &Body) -> bool {
    a.enable && b.enable && !a.check_collision.none && !b.check_collision.none && intersects(a, b)
}

pub(crate) fn overlap_x(a: &mut Body, b: &mut Body, overlap_only: bool, bias: f32) -> f32 {
    let mut overlap = 0.0;
    let max_overlap = a.delta_abs_x() + b.delta_abs_x() + bias;
    let (delta_a, delta_b) = (a.delta_x(), b.delta_x());

    if delta_a == 0.0 && delta_b == 0.0 {
        a.embedded = true;
        b.embedded = true;
    } else if delta_a > delta_b {
        overlap = a.right() - b.left();
        if (overlap > max_overlap && !overlap_only)
            || !a.check_collision.right
            || !b.check_collision.left
        {
            overlap = 0.0;
        } else {
            a.touching.set_right();
            b.touching.set_left();
        }
    } else if delta_a < delta_b {
        overlap = a.left() - b.right();
        if (-overlap > max_overlap && !overlap_only)
            || !a.check_collision.left
            || !b.check_collision.right
        {
            overlap = 0.0;
        } else {
            a.touching.set_left();
            b.touching.set_right();
        }
    }

    a.overlap_x = overlap;
    b.overlap_x = overlap;
    overlap
}

pub(crate) fn overlap_y(a: &mut Body, b: &mut Body, overlap_only: bool, bias: f32) -> f32 {
    let mut overlap = 0.0;
    let max_overlap = a.delta_abs_y() + b.delta_abs_y() + bias;
    let (delta_a, delta_b) = (a.delta_y(), b.delta_y());

    if delta_a == 0.0 && delta_b == 0.0 {
        a.embedded = true;
        b.embedded = true;
    } else if delta_a > delta_b {
        overlap = a.bottom() - b.top();
        if (overlap > max_overlap && !overlap_only)
            || !a.check_collision.down
            || !b.check_collision.up
        {
            overlap = 0.0;
        } else {
            a.touching.set_down();
            b.touching.set_up();
        }
    } else if delta_a < delta_b {
        overlap = a.top() - b.bottom();
        if (-overlap > max_overlap && !overlap_only)
            || !a.check_collision.up
            || !b.check_collision.down
        {
            overlap = 0.0;
        } else {
            a.touching.set_up();
            b.touching.set_down();
        }
    }

    a.overlap_y = overlap;
    b.overlap_y = overlap;
    overlap
}

/// Magnitude-preserving velocity exchange for two movable bodies on one axis.
fn exchange(v1: f32, v2: f32, mass1: f32, mass2: f32, bounce1: f32, bounce2: f32) -> (f32, f32) {
    let mut nv1 = ((v2 * v2 * mass2) / mass1).sqrt() * if v2 > 0.0 { 1.0 } else { -1.0 };
    let mut nv2 = ((v1 * v1 * mass1) / mass2).sqrt() * if v1 > 0.0 { 1.0 } else { -1.0 };
    let average = (nv1 + nv2) * 0.5;
    nv1 -= average;
    nv2 -= average;
    (average + nv1 * bounce1, average + nv2 * bounce2)
}

pub(crate) fn separate_x(a: &mut Body, b: &mut Body, overlap_only: bool, bias: f32) -> bool {
    let mut overlap = overlap_x(a, b, overlap_only, bias);
    if overlap_only
        || overlap == 0.0
        || (a.immovable && b.immovable)
        || a.custom_separate_x
        || b.custom_separate_x
    {
        return overlap != 0.0 || (a.embedded && b.embedded);
    }

    let (v1, v2) = (a.velocity.x, b.velocity.x);
    if !a.immovable && !b.immovable {
        overlap *= 0.5;
        a.position.x -= overlap;
        b.position.x += overlap;
        let (nv1, nv2) = exchange(v1, v2, a.mass, b.mass, a.bounce.x, b.bounce.x);
        a.velocity.x = nv1;
        b.velocity.x = nv2;
    } else if !a.immovable {
        a.position.x -= overlap;
        a.velocity.x = v2 - v1 * a.bounce.x;
        if b.moves {
            a.position.y += b.delta_y() * b.friction.y;
        }
    } else {
        b.position.x += overlap;
        b.velocity.x = v1 - v2 * b.bounce.x;
        if a.moves {
            b.position.y += a.delta_y() * a.friction.y;
        }
    }
    true
}

pub(crate) fn separate_y(a: &mut Body, b: &mut Body, overlap_only: bool, bias: f32) -> bool {
    let mut overlap = overlap_y(a, b, overlap_only, bias);
    if overlap_only
        || overlap == 0.0
        || (a.immovable && b.immovable)
        || a.custom_separate_y
        || b.custom_separate_y
    {
        return overlap != 0.0 || (a.embedded && b.embedded);
    }

    let (v1, v2) = (a.velocity.y, b.velocity.y);
    if !a.immovable && !b.immovable {
        overlap *= 0.5;
        a.position.y -= overlap;
        b.position.y += overlap;
        let (nv1, nv2) = exchange(v1, v2, a.mass, b.mass, a.bounce.y, b.bounce.y);
        a.velocity.y = nv1;
        b.velocity.y = nv2;
    } else if !a.immovable {
        a.position.y -= overlap;
        a.velocity.y = v2 - v1 * a.bounce.y;
        // Riding a moving platform: carried by its horizontal motion.
        if b.moves {
            a.position.x += b.delta_x() * b.friction.x;
        }
    } else {
        b.position.y += overlap;
        b.velocity.y = v1 - v2 * b.bounce.y;
        if a.moves {
            b.position.x += a.delta_x() * a.friction.x;
        }
    }
    true
}

/// Narrow phase for a pair that already passed `can_collide`. Circles, and
/// circle/rectangle pairs meeting at a rectangle corner, use the circle
/// routine; everything else separates on both axes, the dominant-gravity axis
/// first unless `force_x`.
pub(crate) fn resolve(a: &mut Body, b: &mut Body, params: &SeparationParams, overlap_only: bool) -> bool {
    if a.is_circle() || b.is_circle() {
        if a.is_circle() && b.is_circle() {
            return separate_circle(a, b, overlap_only, params);
        }
        let corner = {
            let (circle, rect): (&Body, &Body) = if a.is_circle() { (a, b) } else { (b, a) };
            let center = circle.center();
            (center.y < rect.top() || center.y > rect.bottom())
                && (center.x < rect.left() || center.x > rect.right())
        };
        if corner {
            return separate_circle(a, b, overlap_only, params);
        }
    }

    let bias = params.overlap_bias;
    let mut result_x = false;
    let mut result_y = false;
    if params.force_x || params.gravity.y.abs() < params.gravity.x.abs() {
        result_x = separate_x(a, b, overlap_only, bias);
        if intersects(a, b) {
            result_y = separate_y(a, b, overlap_only, bias);
        }
    } else {
        result_y = separate_y(a, b, overlap_only, bias);
        if intersects(a, b) {
            result_x = separate_x(a, b, overlap_only, bias);
        }
    }
    result_x || result_y
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moving_rect(x: f32, y: f32, size: f32, delta: Vec2) -> Body {
        let mut body = Body::rect(x, y, size, size);
        body.prev = Vec2::new(x - delta.x, y - delta.y);
        body.velocity = Vec2::new(delta.x * 10.0, delta.y * 10.0);
        body
    }

    #[test]
    fn touching_edges_are_not_intersecting() {
        let a = Body::rect(0.0, 0.0, 10.0, 10.0);
        let b = Body::rect(10.0, 0.0, 10.0, 10.0);
        assert!(!intersects(&a, &b));
        let c = Body::circle(20.0, 0.0, 5.0);
        assert!(!intersects(&a, &c));
        assert!(intersects(&Body::circle(0.0, 0.0, 5.0), &Body::circle(9.0, 0.0, 5.0)));
    }

    #[test]
    fn head_on_zero_bounce_splits_overlap_evenly() {
        let mut a = moving_rect(0.0, 0.0, 10.0, Vec2::new(5.0, 0.0));
        let mut b = moving_rect(8.0, 0.0, 10.0, Vec2::new(-5.0, 0.0));
        let params = SeparationParams {
            force_x: true,
            ..SeparationParams::default()
        };

        assert!(resolve(&mut a, &mut b, &params, false));

        let correction = (0.0 - a.position.x) + (b.position.x - 8.0);
        assert!((correction - 2.0).abs() < 1e-5);
        assert!((a.position.x + 1.0).abs() < 1e-5);
        assert_eq!(a.velocity.x, 0.0);
        assert_eq!(b.velocity.x, 0.0);
        assert!(a.touching.right && b.touching.left);
        assert!(!intersects(&a, &b));
    }

    #[test]
    fn immovable_body_is_never_moved() {
        for mass in [0.01, 1.0, 1000.0] {
            let mut mover = moving_rect(0.0, 0.0, 10.0, Vec2::new(3.0, 0.0));
            mover.mass = mass;
            mover.bounce = Vec2::new(0.5, 0.5);
            let mut wall = Body::rect(9.0, -5.0, 10.0, 20.0);
            wall.immovable = true;
            wall.velocity = Vec2::new(0.0, 0.0);
            let before = (wall.position, wall.velocity);

            assert!(resolve(&mut mover, &mut wall, &SeparationParams::default(), false));
            assert_eq!((wall.position, wall.velocity), before);
            assert_eq!(mover.position.x, -1.0);
            assert_eq!(mover.velocity.x, -15.0);

            // Argument order does not matter.
            let mut mover = moving_rect(0.0, 0.0, 10.0, Vec2::new(3.0, 0.0));
            let mut wall = Body::rect(9.0, -5.0, 10.0, 20.0);
            wall.immovable = true;
            wall.mass = mass;
            let before = (wall.position, wall.velocity);
            assert!(resolve(&mut wall, &mut mover, &SeparationParams::default(), false));
            assert_eq!((wall.position, wall.velocity), before);
        }
    }

    #[test]
    fn stationary_overlap_is_embedded_and_reported() {
        let mut a = Body::rect(0.0, 0.0, 10.0, 10.0);
        let mut b = Body::rect(5.0, 5.0, 10.0, 10.0);

        assert!(resolve(&mut a, &mut b, &SeparationParams::default(), true));
        assert!(a.embedded && b.embedded);
        assert_eq!(a.position, Vec2::new(0.0, 0.0));
        assert_eq!(b.position, Vec2::new(5.0, 5.0));

        let mut a = Body::rect(0.0, 0.0, 10.0, 10.0);
        let mut b = Body::rect(5.0, 5.0, 10.0, 10.0);
        assert!(resolve(&mut a, &mut b, &SeparationParams::default(), false));
        assert_eq!(b.position, Vec2::new(5.0, 5.0));
    }

    #[test]
    fn overlap_beyond_motion_plus_bias_is_discarded() {
        let mut a = moving_rect(0.0, 0.0, 10.0, Vec2::new(1.0, 0.0));
        let mut b = Body::rect(2.0, 0.0, 10.0, 10.0);
        assert_eq!(overlap_x(&mut a, &mut b, false, 4.0), 0.0);
        assert!(!a.touching.right);
        assert!(!separate_x(&mut a, &mut b, false, 4.0));
        assert_eq!(a.position.x, 0.0);

        assert_eq!(overlap_x(&mut a, &mut b, true, 4.0), 8.0);
    }

    #[test]
    fn disabled_edges_suppress_contact() {
        let mut a = moving_rect(0.0, 0.0, 10.0, Vec2::new(2.0, 0.0));
        let mut b = Body::rect(9.0, 0.0, 10.0, 10.0);
        b.check_collision.left = false;
        assert_eq!(overlap_x(&mut a, &mut b, false, 4.0), 0.0);
    }

    #[test]
    fn vertical_gravity_resolves_y_first_and_rides_platform() {
        let mut player = moving_rect(0.0, 0.0, 10.0, Vec2::new(0.0, 2.0));
        let mut platform = moving_rect(-20.0, 9.0, 40.0, Vec2::new(3.0, 0.0));
        platform.immovable = true;
        platform.friction = Vec2::new(1.0, 0.0);
        let params = SeparationParams {
            gravity: Vec2::new(0.0, 300.0),
            ..SeparationParams::default()
        };

        assert!(resolve(&mut player, &mut platform, &params, false));
        assert_eq!(player.position.y, -1.0);
        assert_eq!(player.velocity.y, 0.0);
        assert_eq!(player.position.x, 3.0);
        assert!(player.touching.down);
    }
}
