use crate::geom::{Rect, Vec2};

use super::stage::{NodeId, Stage};

pub const CAMERA_ZOOM_DEFAULT: f32 = 1.0;
pub const CAMERA_ZOOM_MIN: f32 = 0.5;
pub const CAMERA_ZOOM_MAX: f32 = 2.0;
pub const CAMERA_ZOOM_STEP: f32 = 0.1;

/// World-space view. `position` is the top-left corner of the visible area.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec2,
    pub zoom: f32,
    /// Viewport size in screen pixels.
    pub view_size: Vec2,
    pub bounds: Option<Rect>,
    /// Fraction of the distance to the follow target covered per step.
    pub lerp: f32,
    follow: Option<NodeId>,
}

impl Camera {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            position: Vec2::ZERO,
            zoom: CAMERA_ZOOM_DEFAULT,
            view_size: Vec2::new(width, height),
            bounds: None,
            lerp: 1.0,
            follow: None,
        }
    }

    pub fn effective_zoom(&self) -> f32 {
        clamp_camera_zoom(self.zoom)
    }

    pub fn set_zoom_clamped(&mut self, zoom: f32) {
        self.zoom = clamp_camera_zoom(zoom);
    }

    pub fn apply_zoom_steps(&mut self, steps: i32) {
        if steps == 0 {
            return;
        }
        let target_zoom = self.zoom + steps as f32 * CAMERA_ZOOM_STEP;
        self.set_zoom_clamped(target_zoom);
    }

    pub fn follow(&mut self, target: NodeId) {
        self.follow = Some(target);
    }

    pub fn unfollow(&mut self) {
        self.follow = None;
    }

    pub fn target(&self) -> Option<NodeId> {
        self.follow
    }

    pub fn set_view_size(&mut self, width: f32, height: f32) {
        self.view_size = Vec2::new(width, height);
    }

    /// Visible world rectangle.
    pub fn view(&self) -> Rect {
        let zoom = self.effective_zoom();
        Rect::new(
            self.position.x,
            self.position.y,
            self.view_size.x / zoom,
            self.view_size.y / zoom,
        )
    }

    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        (world - self.position) * self.effective_zoom()
    }

    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        screen * (1.0 / self.effective_zoom()) + self.position
    }

    /// Tracks the follow target, then keeps the view inside `bounds`.
    pub fn pre_update(&mut self, stage: &Stage) {
        if let Some(target) = self.follow {
            match stage.get(target) {
                Some(node) => {
                    let view = self.view();
                    let desired = node.world_position() - Vec2::new(view.width * 0.5, view.height * 0.5);
                    let lerp = self.lerp.clamp(0.0, 1.0);
                    self.position += (desired - self.position) * lerp;
                }
                None => self.follow = None,
            }
        }
        self.clamp_to_bounds();
    }

    /// Back to the origin with no follow target; bounds and zoom are kept.
    pub fn reset(&mut self) {
        self.position = Vec2::ZERO;
        self.follow = None;
    }

    fn clamp_to_bounds(&mut self) {
        let Some(bounds) = self.bounds else {
            return;
        };
        let view = self.view();
        self.position.x = clamp_axis(self.position.x, bounds.x, bounds.width, view.width);
        self.position.y = clamp_axis(self.position.y, bounds.y, bounds.height, view.height);
    }
}

fn clamp_camera_zoom(zoom: f32) -> f32 {
    if !zoom.is_finite() {
        return CAMERA_ZOOM_DEFAULT;
    }
    zoom.clamp(CAMERA_ZOOM_MIN, CAMERA_ZOOM_MAX)
}

fn clamp_axis(position: f32, start: f32, extent: f32, view: f32) -> f32 {
    if view >= extent {
        return start;
    }
    position.clamp(start, start + extent - view)
}

/// Holds resize requests until the next scale update applies them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleManager {
    width: u32,
    height: u32,
    pending: Option<(u32, u32)>,
}

impl ScaleManager {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pending: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Zero-sized requests (minimized windows) are ignored.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.pending = Some((width, height));
    }

    /// Returns the newly applied size when it changed.
    pub fn pre_update(&mut self) -> Option<(u32, u32)> {
        let (width, height) = self.pending.take()?;
        if (width, height) == (self.width, self.height) {
            return None;
        }
        self.width = width;
        self.height = height;
        Some((width, height))
    }

    pub fn pause_update(&mut self) -> Option<(u32, u32)> {
        self.pre_update()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugLine {
    pub from: Vec2,
    pub to: Vec2,
    pub color: [u8; 4],
}

/// Per-step debug geometry in world space, cleared at every debug update.
#[derive(Debug, Clone, Default)]
pub struct DebugOverlay {
    pub enabled: bool,
    /// Outline every enabled body.
    pub show_bodies: bool,
    lines: Vec<DebugLine>,
    rects: Vec<(Rect, [u8; 4])>,
}

impl DebugOverlay {
    pub fn line(&mut self, from: Vec2, to: Vec2, color: [u8; 4]) {
        if self.enabled {
            self.lines.push(DebugLine { from, to, color });
        }
    }

    pub fn rect(&mut self, rect: Rect, color: [u8; 4]) {
        if self.enabled {
            self.rects.push((rect, color));
        }
    }

    pub fn lines(&self) -> &[DebugLine] {
        &self.lines
    }

    pub fn rects(&self) -> &[(Rect, [u8; 4])] {
        &self.rects
    }

    pub fn pre_update(&mut self) {
        self.lines.clear();
        self.rects.clear();
    }
}

/// Sound backend hooks. Mixing and decoding live outside the engine.
pub trait AudioSystem {
    fn update(&mut self) {}
    fn set_mute(&mut self, muted: bool);
    fn is_muted(&self) -> bool;
}

#[derive(Debug, Default)]
pub struct SilentAudio {
    muted: bool,
    updates: u64,
}

impl SilentAudio {
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl AudioSystem for SilentAudio {
    fn update(&mut self) {
        self.updates += 1;
    }

    fn set_mute(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.muted
    }
}
