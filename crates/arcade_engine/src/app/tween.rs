use std::f32::consts::PI;

use tracing::debug;

use super::stage::{Node, NodeId, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweenProperty {
    X,
    Y,
    Alpha,
    Rotation,
    ScaleX,
    ScaleY,
}

impl TweenProperty {
    fn read(self, node: &Node) -> f32 {
        match self {
            TweenProperty::X => node.position.x,
            TweenProperty::Y => node.position.y,
            TweenProperty::Alpha => node.alpha,
            TweenProperty::Rotation => node.rotation,
            TweenProperty::ScaleX => node.scale.x,
            TweenProperty::ScaleY => node.scale.y,
        }
    }

    fn write(self, node: &mut Node, value: f32) {
        match self {
            TweenProperty::X => node.position.x = value,
            TweenProperty::Y => node.position.y = value,
            TweenProperty::Alpha => node.alpha = value.clamp(0.0, 1.0),
            TweenProperty::Rotation => node.rotation = value,
            TweenProperty::ScaleX => node.scale.x = value,
            TweenProperty::ScaleY => node.scale.y = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    QuadIn,
    QuadOut,
    QuadInOut,
    SineIn,
    SineOut,
    SineInOut,
}

impl Easing {
    /// Maps normalized time `0..=1` to normalized progress.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::QuadIn => t * t,
            Easing::QuadOut => t * (2.0 - t),
            Easing::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Easing::SineIn => 1.0 - (t * PI / 2.0).cos(),
            Easing::SineOut => (t * PI / 2.0).sin(),
            Easing::SineInOut => 0.5 * (1.0 - (PI * t).cos()),
        }
    }
}

/// Animates one node property toward `to`. The start value is sampled when
/// the delay runs out.
#[derive(Debug, Clone, PartialEq)]
pub struct Tween {
    pub target: NodeId,
    pub property: TweenProperty,
    pub to: f32,
    pub duration_ms: f32,
    pub delay_ms: f32,
    pub easing: Easing,
    /// Extra cycles after the first.
    pub repeat: u32,
    /// Each cycle plays forward then back.
    pub yoyo: bool,
}

impl Tween {
    pub fn to(target: NodeId, property: TweenProperty, to: f32, duration_ms: f32) -> Self {
        Self {
            target,
            property,
            to,
            duration_ms: duration_ms.max(0.0),
            delay_ms: 0.0,
            easing: Easing::Linear,
            repeat: 0,
            yoyo: false,
        }
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn delay(mut self, delay_ms: f32) -> Self {
        self.delay_ms = delay_ms.max(0.0);
        self
    }

    pub fn repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn yoyo(mut self, yoyo: bool) -> Self {
        self.yoyo = yoyo;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TweenId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TweenCompleted {
    pub id: TweenId,
    pub target: NodeId,
}

#[derive(Debug, Clone)]
struct ActiveTween {
    id: TweenId,
    tween: Tween,
    from: Option<f32>,
    delay_left_ms: f32,
    elapsed_ms: f32,
    repeats_left: u32,
    reversed: bool,
}

enum Progress {
    Running,
    Complete,
    Orphaned,
}

impl ActiveTween {
    fn advance(&mut self, stage: &mut Stage, mut delta_ms: f32) -> Progress {
        let Some(node) = stage.get_mut(self.tween.target) else {
            return Progress::Orphaned;
        };
        if self.delay_left_ms > 0.0 {
            self.delay_left_ms -= delta_ms;
            if self.delay_left_ms > 0.0 {
                return Progress::Running;
            }
            delta_ms = -self.delay_left_ms;
            self.delay_left_ms = 0.0;
        }
        let property = self.tween.property;
        let from = *self.from.get_or_insert_with(|| property.read(node));
        let to = self.tween.to;
        let duration = self.tween.duration_ms;

        self.elapsed_ms += delta_ms;
        loop {
            let t = if duration > 0.0 {
                (self.elapsed_ms / duration).min(1.0)
            } else {
                1.0
            };
            let eased = self.tween.easing.apply(t);
            let value = if self.reversed {
                to + (from - to) * eased
            } else {
                from + (to - from) * eased
            };
            property.write(node, value);
            if t < 1.0 {
                return Progress::Running;
            }

            self.elapsed_ms = (self.elapsed_ms - duration).max(0.0);
            if self.tween.yoyo && !self.reversed {
                self.reversed = true;
            } else if self.repeats_left > 0 {
                self.repeats_left -= 1;
                self.reversed = false;
            } else {
                return Progress::Complete;
            }
            if duration <= 0.0 || self.elapsed_ms <= 0.0 {
                return Progress::Running;
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct TweenManager {
    active: Vec<ActiveTween>,
    completed: Vec<TweenCompleted>,
    next_id: u64,
}

impl TweenManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tween: Tween) -> TweenId {
        let id = TweenId(self.next_id);
        self.next_id += 1;
        self.active.push(ActiveTween {
            id,
            delay_left_ms: tween.delay_ms,
            repeats_left: tween.repeat,
            tween,
            from: None,
            elapsed_ms: 0.0,
            reversed: false,
        });
        id
    }

    pub fn remove(&mut self, id: TweenId) -> bool {
        let before = self.active.len();
        self.active.retain(|active| active.id != id);
        self.active.len() != before
    }

    /// Drops every tween, including pending completion events.
    pub fn remove_all(&mut self) {
        self.active.clear();
        self.completed.clear();
    }

    pub fn is_running(&self, id: TweenId) -> bool {
        self.active.iter().any(|active| active.id == id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn update(&mut self, stage: &mut Stage, delta_ms: f32) {
        let completed = &mut self.completed;
        self.active.retain_mut(|active| match active.advance(stage, delta_ms) {
            Progress::Running => true,
            Progress::Complete => {
                completed.push(TweenCompleted {
                    id: active.id,
                    target: active.tween.target,
                });
                false
            }
            Progress::Orphaned => {
                debug!(tween = active.id.0, "tween_target_missing");
                false
            }
        });
    }

    pub fn drain_completed(&mut self) -> Vec<TweenCompleted> {
        std::mem::take(&mut self.completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::BodySet;

    fn stage_with_node() -> (Stage, NodeId) {
        let mut stage = Stage::new();
        let id = stage.add(Node::new(0.0, 0.0));
        (stage, id)
    }

    fn x_of(stage: &Stage, id: NodeId) -> f32 {
        stage.get(id).map(|node| node.position.x).expect("node")
    }

    #[test]
    fn linear_tween_interpolates_and_completes() {
        let (mut stage, node) = stage_with_node();
        let mut tweens = TweenManager::new();
        let id = tweens.add(Tween::to(node, TweenProperty::X, 100.0, 100.0));

        tweens.update(&mut stage, 25.0);
        assert_eq!(x_of(&stage, node), 25.0);
        assert!(tweens.drain_completed().is_empty());

        tweens.update(&mut stage, 100.0);
        assert_eq!(x_of(&stage, node), 100.0);
        assert_eq!(tweens.drain_completed(), vec![TweenCompleted { id, target: node }]);
        assert!(tweens.is_empty());
    }

    #[test]
    fn delay_postpones_start_and_carries_remainder() {
        let (mut stage, node) = stage_with_node();
        let mut tweens = TweenManager::new();
        tweens.add(Tween::to(node, TweenProperty::X, 10.0, 10.0).delay(20.0));

        tweens.update(&mut stage, 15.0);
        assert_eq!(x_of(&stage, node), 0.0);
        tweens.update(&mut stage, 10.0);
        assert_eq!(x_of(&stage, node), 5.0);
    }

    #[test]
    fn yoyo_with_repeat_returns_to_start() {
        let (mut stage, node) = stage_with_node();
        let mut tweens = TweenManager::new();
        tweens.add(
            Tween::to(node, TweenProperty::X, 10.0, 10.0)
                .yoyo(true)
                .repeat(1),
        );

        tweens.update(&mut stage, 10.0);
        assert_eq!(x_of(&stage, node), 10.0);
        tweens.update(&mut stage, 5.0);
        assert_eq!(x_of(&stage, node), 5.0);
        tweens.update(&mut stage, 5.0);
        assert_eq!(x_of(&stage, node), 0.0);
        assert_eq!(tweens.len(), 1);
        tweens.update(&mut stage, 20.0);
        assert_eq!(x_of(&stage, node), 0.0);
        assert_eq!(tweens.drain_completed().len(), 1);
    }

    #[test]
    fn easing_curves_hit_endpoints() {
        for easing in [
            Easing::Linear,
            Easing::QuadIn,
            Easing::QuadOut,
            Easing::QuadInOut,
            Easing::SineIn,
            Easing::SineOut,
            Easing::SineInOut,
        ] {
            assert!(easing.apply(0.0).abs() < 1e-6, "{easing:?}");
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-6, "{easing:?}");
        }
        assert!(Easing::QuadIn.apply(0.5) < 0.5);
        assert!(Easing::QuadOut.apply(0.5) > 0.5);
    }

    #[test]
    fn removed_target_drops_tween_without_completion() {
        let (mut stage, node) = stage_with_node();
        let mut bodies = BodySet::new();
        let mut tweens = TweenManager::new();
        tweens.add(Tween::to(node, TweenProperty::Alpha, 0.0, 100.0));
        stage.remove(node, &mut bodies);

        tweens.update(&mut stage, 10.0);
        assert!(tweens.is_empty());
        assert!(tweens.drain_completed().is_empty());
    }
}
