use std::f32::consts::FRAC_PI_2;

use crate::geom::Vec2;

use super::body::Body;
use super::separate::{overlap_x, overlap_y, SeparationParams};

/// Penetration of a circle into the nearest rectangle corner. Zero when the
/// circle center is not in a corner region.
fn corner_overlap(circle: &Body, rect: &Body) -> f32 {
    let center = circle.center();
    let corner_y = if center.y < rect.top() {
        Some(rect.top())
    } else if center.y > rect.bottom() {
        Some(rect.bottom())
    } else {
        None
    };
    let corner_x = if center.x < rect.left() {
        Some(rect.left())
    } else if center.x > rect.right() {
        Some(rect.right())
    } else {
        None
    };
    match (corner_x, corner_y) {
        (Some(x), Some(y)) => circle.radius() - center.distance(Vec2::new(x, y)),
        _ => 0.0,
    }
}

/// Circle-style separation: velocities are exchanged along the collision
/// normal, weighted by mass and scaled by bounce. Also used for circles that
/// hit a rectangle corner.
///
/// An immovable partner counts as infinite mass and its movable partner takes
/// the whole positional correction. Two movable bodies split the correction
/// evenly, so a resting overlap is removed in one call without overshoot.
pub(crate) fn separate_circle(
    a: &mut Body,
    b: &mut Body,
    overlap_only: bool,
    params: &SeparationParams,
) -> bool {
    // Touching flags only; the axis overlaps are not used for correction.
    overlap_x(a, b, false, params.overlap_bias);
    overlap_y(a, b, false, params.overlap_bias);

    let (center_a, center_b) = (a.center(), b.center());
    let angle = (center_b.y - center_a.y).atan2(center_b.x - center_a.x);

    let overlap = if a.is_circle() != b.is_circle() {
        if a.is_circle() {
            corner_overlap(a, b)
        } else {
            corner_overlap(b, a)
        }
    } else {
        a.radius() + b.radius() - center_a.distance(center_b)
    };
    a.overlap_r = overlap;
    b.overlap_r = overlap;

    if overlap_only
        || overlap == 0.0
        || (a.immovable && b.immovable)
        || a.custom_separate_x
        || b.custom_separate_x
    {
        return overlap != 0.0;
    }

    let (cos, sin) = (angle.cos(), angle.sin());
    let to_normal = |v: Vec2| Vec2::new(v.x * cos + v.y * sin, v.y * cos - v.x * sin);
    let from_normal = |v: Vec2| Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos);
    let normal_a = to_normal(a.velocity);
    let normal_b = to_normal(b.velocity);

    // An immovable partner acts as infinite mass.
    let (out_a, out_b) = if b.immovable {
        (2.0 * normal_b.x - normal_a.x, normal_b.x)
    } else if a.immovable {
        (normal_a.x, 2.0 * normal_a.x - normal_b.x)
    } else {
        let total = a.mass + b.mass;
        (
            ((a.mass - b.mass) * normal_a.x + 2.0 * b.mass * normal_b.x) / total,
            (2.0 * a.mass * normal_a.x + (b.mass - a.mass) * normal_b.x) / total,
        )
    };

    if !a.immovable {
        let velocity = from_normal(Vec2::new(out_a, normal_a.y));
        a.velocity = Vec2::new(velocity.x * a.bounce.x, velocity.y * a.bounce.y);
    }
    if !b.immovable {
        let velocity = from_normal(Vec2::new(out_b, normal_b.y));
        b.velocity = Vec2::new(velocity.x * b.bounce.x, velocity.y * b.bounce.y);
    }

    // Near-tangent impacts can leave a component pointing back into the
    // partner; flip the first such component.
    if angle.abs() < FRAC_PI_2 {
        if a.velocity.x > 0.0 && !a.immovable && b.velocity.x > a.velocity.x {
            a.velocity.x *= -1.0;
        } else if b.velocity.x < 0.0 && !b.immovable && a.velocity.x < b.velocity.x {
            b.velocity.x *= -1.0;
        } else if a.velocity.y > 0.0 && !a.immovable && b.velocity.y > a.velocity.y {
            a.velocity.y *= -1.0;
        } else if b.velocity.y < 0.0 && !b.immovable && a.velocity.y < b.velocity.y {
            b.velocity.y *= -1.0;
        }
    } else if angle.abs() > FRAC_PI_2 {
        if a.velocity.x < 0.0 && !a.immovable && b.velocity.x < a.velocity.x {
            a.velocity.x *= -1.0;
        } else if b.velocity.x > 0.0 && !b.immovable && a.velocity.x > b.velocity.x {
            b.velocity.x *= -1.0;
        } else if a.velocity.y < 0.0 && !a.immovable && b.velocity.y < a.velocity.y {
            a.velocity.y *= -1.0;
        } else if b.velocity.y > 0.0 && !b.immovable && a.velocity.y > b.velocity.y {
            b.velocity.y *= -1.0;
        }
    }

    let dt = params.physics_elapsed;
    let share = if a.immovable || b.immovable {
        overlap
    } else {
        overlap * 0.5
    };
    if !a.immovable {
        a.position.x += a.velocity.x * dt - share * cos;
        a.position.y += a.velocity.y * dt - share * sin;
    }
    if !b.immovable {
        b.position.x += b.velocity.x * dt + share * cos;
        b.position.y += b.velocity.y * dt + share * sin;
    }
    true
}
