use crate::app::Camera;
use crate::geom::{Rect, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Half-open pixel rectangle; may extend past the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRectPx {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

pub fn world_to_screen_px(world: Vec2, camera: &Camera) -> (i32, i32) {
    let screen = camera.world_to_screen(world);
    (screen.x.round() as i32, screen.y.round() as i32)
}

pub fn world_rect_to_screen_px(rect: Rect, camera: &Camera) -> ScreenRectPx {
    let (left, top) = world_to_screen_px(Vec2::new(rect.x, rect.y), camera);
    let (right, bottom) = world_to_screen_px(Vec2::new(rect.right(), rect.bottom()), camera);
    ScreenRectPx {
        left,
        top,
        right,
        bottom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_maps_to_top_left() {
        let camera = Camera::new(800.0, 600.0);
        assert_eq!(world_to_screen_px(Vec2::ZERO, &camera), (0, 0));
    }

    #[test]
    fn camera_offset_and_zoom_shift_screen_position() {
        let mut camera = Camera::new(800.0, 600.0);
        camera.position = Vec2::new(10.0, -5.0);
        camera.set_zoom_clamped(2.0);
        assert_eq!(world_to_screen_px(Vec2::new(12.0, -4.0), &camera), (4, 2));

        let rect = world_rect_to_screen_px(Rect::new(10.0, -5.0, 3.0, 2.0), &camera);
        assert_eq!(
            rect,
            ScreenRectPx {
                left: 0,
                top: 0,
                right: 6,
                bottom: 4
            }
        );
    }
}
