use std::collections::HashSet;
use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use tracing::warn;
use winit::window::Window;

use crate::app::{Graphic, Node};
use crate::geom::{Rect, Vec2};
use crate::loader::ImageAsset;

use super::{world_rect_to_screen_px, world_to_screen_px, RenderError, RenderView, Renderer, Viewport};

const PLACEHOLDER_COLOR: [u8; 4] = [220, 220, 240, 255];
const PLACEHOLDER_HALF_SIZE_PX: i32 = 5;
const BODY_OUTLINE_COLOR: [u8; 4] = [80, 220, 120, 255];
const BODY_TOUCHING_COLOR: [u8; 4] = [255, 120, 120, 255];

/// Software rasterizer for one stage frame into an RGBA8 buffer.
#[derive(Debug, Default)]
pub struct Rasterizer {
    warned_missing_sprite_keys: HashSet<String>,
}

impl Rasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, frame: &mut [u8], viewport: Viewport, view: &RenderView<'_>) {
        if viewport.is_empty() {
            return;
        }
        let clear_color = view.stage.background;
        for chunk in frame.chunks_exact_mut(4) {
            chunk.copy_from_slice(&clear_color);
        }

        for id in view.stage.render_list() {
            let Some(node) = view.stage.get(id) else {
                continue;
            };
            let Some(graphic) = node.graphic.as_ref() else {
                continue;
            };
            self.draw_node(frame, viewport, view, node, graphic);
        }

        if view.debug.show_bodies {
            draw_body_outlines(frame, viewport, view);
        }
        for line in view.debug.lines() {
            let (x0, y0) = world_to_screen_px(line.from, view.camera);
            let (x1, y1) = world_to_screen_px(line.to, view.camera);
            draw_line(frame, viewport, (x0, y0), (x1, y1), line.color);
        }
        for (rect, color) in view.debug.rects() {
            let rect = world_rect_to_screen_px(*rect, view.camera);
            draw_rect_outline(frame, viewport, rect.left, rect.top, rect.right, rect.bottom, *color);
        }
    }

    fn draw_node(
        &mut self,
        frame: &mut [u8],
        viewport: Viewport,
        view: &RenderView<'_>,
        node: &Node,
        graphic: &Graphic,
    ) {
        let zoom = view.camera.effective_zoom();
        let scale = node.world_scale();
        let alpha = node.world_alpha();
        let (left, top) = world_to_screen_px(node.world_position(), view.camera);
        match graphic {
            Graphic::Rect {
                width,
                height,
                color,
            } => {
                let w = (width * scale.x * zoom).round() as i32;
                let h = (height * scale.y * zoom).round() as i32;
                fill_rect(frame, viewport, left, top, left + w, top + h, *color, alpha);
            }
            Graphic::Circle { radius, color } => {
                let r = radius * scale.x.abs() * zoom;
                let center = Vec2::new(left as f32 + r, top as f32 + r);
                fill_circle(frame, viewport, center, r, *color, alpha);
            }
            Graphic::Sprite { key, frame: index } => {
                let Some(image) = view.cache.texture(key) else {
                    self.warn_missing_sprite_once(key);
                    draw_cross(frame, viewport, left, top, PLACEHOLDER_HALF_SIZE_PX, PLACEHOLDER_COLOR);
                    return;
                };
                let region = index
                    .and_then(|index| view.cache.sprite_frames(key)?.get(index).copied())
                    .unwrap_or(Rect::new(0.0, 0.0, image.width as f32, image.height as f32));
                draw_sprite_region_scaled(
                    frame,
                    viewport,
                    (left, top),
                    image,
                    region,
                    Vec2::new(scale.x * zoom, scale.y * zoom),
                    alpha,
                );
            }
        }
    }

    fn warn_missing_sprite_once(&mut self, key: &str) {
        if self.warned_missing_sprite_keys.insert(key.to_string()) {
            warn!(key, "sprite_texture_missing");
        }
    }
}

pub struct PixelsRenderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    viewport: Viewport,
    rasterizer: Rasterizer,
}

impl PixelsRenderer {
    pub fn new(window: Arc<Window>) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            viewport: Viewport {
                width: size.width,
                height: size.height,
            },
            rasterizer: Rasterizer::new(),
        })
    }

    fn build_pixels(window: Arc<Window>, width: u32, height: u32) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }
}

impl Renderer for PixelsRenderer {
    fn render(&mut self, view: &RenderView<'_>) -> Result<(), RenderError> {
        if self.viewport.is_empty() {
            return Ok(());
        }
        self.rasterizer
            .draw(self.pixels.frame_mut(), self.viewport, view);
        self.pixels.render()?;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.viewport = Viewport { width, height };
        Ok(())
    }
}

fn draw_body_outlines(frame: &mut [u8], viewport: Viewport, view: &RenderView<'_>) {
    for (_, body) in view.bodies.iter() {
        if !body.enable {
            continue;
        }
        let color = if body.touching.any() {
            BODY_TOUCHING_COLOR
        } else {
            BODY_OUTLINE_COLOR
        };
        let rect = world_rect_to_screen_px(body.bounds(), view.camera);
        draw_rect_outline(frame, viewport, rect.left, rect.top, rect.right, rect.bottom, color);
        if body.is_circle() {
            let (cx, cy) = world_to_screen_px(body.center(), view.camera);
            draw_cross(frame, viewport, cx, cy, 2, color);
        }
    }
}

fn write_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x as usize >= width {
        return;
    }
    let x = x as usize;
    let y = y as usize;
    let Some(pixel_offset) = y.checked_mul(width).and_then(|row| row.checked_add(x)) else {
        return;
    };
    let Some(byte_offset) = pixel_offset.checked_mul(4) else {
        return;
    };
    let Some(end) = byte_offset.checked_add(4) else {
        return;
    };
    if end > frame.len() {
        return;
    }
    frame[byte_offset..end].copy_from_slice(&color);
}

/// Source-over blend of `color` scaled by `alpha` onto the frame.
fn blend_pixel_clipped(frame: &mut [u8], viewport: Viewport, x: i32, y: i32, color: [u8; 4], alpha: f32) {
    if x < 0 || y < 0 || x >= viewport.width as i32 || y >= viewport.height as i32 {
        return;
    }
    let coverage = (color[3] as f32 / 255.0) * alpha.clamp(0.0, 1.0);
    if coverage <= 0.0 {
        return;
    }
    if coverage >= 1.0 {
        write_pixel_rgba_clipped(frame, viewport.width as usize, x, y, [color[0], color[1], color[2], 255]);
        return;
    }
    let offset = (y as usize * viewport.width as usize + x as usize) * 4;
    let Some(dst) = frame.get_mut(offset..offset + 4) else {
        return;
    };
    for channel in 0..3 {
        let blended = color[channel] as f32 * coverage + dst[channel] as f32 * (1.0 - coverage);
        dst[channel] = blended.round() as u8;
    }
    dst[3] = 255;
}

#[allow(clippy::too_many_arguments)]
fn fill_rect(
    frame: &mut [u8],
    viewport: Viewport,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: [u8; 4],
    alpha: f32,
) {
    let draw_left = left.max(0);
    let draw_top = top.max(0);
    let draw_right = right.min(viewport.width as i32);
    let draw_bottom = bottom.min(viewport.height as i32);
    for y in draw_top..draw_bottom {
        for x in draw_left..draw_right {
            blend_pixel_clipped(frame, viewport, x, y, color, alpha);
        }
    }
}

fn fill_circle(frame: &mut [u8], viewport: Viewport, center: Vec2, radius: f32, color: [u8; 4], alpha: f32) {
    if radius <= 0.0 {
        return;
    }
    let r2 = radius * radius;
    let top = (center.y - radius).floor() as i32;
    let bottom = (center.y + radius).ceil() as i32;
    let left = (center.x - radius).floor() as i32;
    let right = (center.x + radius).ceil() as i32;
    for y in top.max(0)..bottom.min(viewport.height as i32) {
        for x in left.max(0)..right.min(viewport.width as i32) {
            let dx = x as f32 + 0.5 - center.x;
            let dy = y as f32 + 0.5 - center.y;
            if dx * dx + dy * dy <= r2 {
                blend_pixel_clipped(frame, viewport, x, y, color, alpha);
            }
        }
    }
}

/// Outline of the half-open rectangle `left..right` by `top..bottom`.
fn draw_rect_outline(
    frame: &mut [u8],
    viewport: Viewport,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: [u8; 4],
) {
    if right <= left || bottom <= top {
        return;
    }
    let width = viewport.width as usize;
    for x in left..right {
        write_pixel_rgba_clipped(frame, width, x, top, color);
        write_pixel_rgba_clipped(frame, width, x, bottom - 1, color);
    }
    for y in top..bottom {
        write_pixel_rgba_clipped(frame, width, left, y, color);
        write_pixel_rgba_clipped(frame, width, right - 1, y, color);
    }
}

fn draw_cross(frame: &mut [u8], viewport: Viewport, cx: i32, cy: i32, half_size: i32, color: [u8; 4]) {
    let width = viewport.width as usize;
    for x in (cx - half_size)..=(cx + half_size) {
        write_pixel_rgba_clipped(frame, width, x, cy, color);
    }
    for y in (cy - half_size)..=(cy + half_size) {
        write_pixel_rgba_clipped(frame, width, cx, y, color);
    }
}

fn draw_line(frame: &mut [u8], viewport: Viewport, from: (i32, i32), to: (i32, i32), color: [u8; 4]) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    let width = viewport.width as usize;
    loop {
        if y < viewport.height as i32 {
            write_pixel_rgba_clipped(frame, width, x, y, color);
        }
        if (x, y) == to {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn normalized_sprite_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

/// Nearest-neighbour blit of `region` (image pixels) with its top-left at `origin`.
fn draw_sprite_region_scaled(
    frame: &mut [u8],
    viewport: Viewport,
    origin: (i32, i32),
    sprite: &ImageAsset,
    region: Rect,
    scale: Vec2,
    alpha: f32,
) {
    if sprite.width == 0 || sprite.height == 0 || viewport.is_empty() {
        return;
    }
    let expected_rgba_len = sprite.width as usize * sprite.height as usize * 4;
    if sprite.rgba.len() < expected_rgba_len {
        return;
    }
    let region_x = region.x.max(0.0) as u32;
    let region_y = region.y.max(0.0) as u32;
    if region_x >= sprite.width || region_y >= sprite.height {
        return;
    }
    let region_w = (region.width.max(1.0) as u32).min(sprite.width - region_x);
    let region_h = (region.height.max(1.0) as u32).min(sprite.height - region_y);

    let scale_x = normalized_sprite_scale(scale.x);
    let scale_y = normalized_sprite_scale(scale.y);
    let scaled_w = (region_w as f32 * scale_x).round().max(1.0) as i32;
    let scaled_h = (region_h as f32 * scale_y).round().max(1.0) as i32;
    let (left, top) = origin;

    let draw_left = left.max(0);
    let draw_top = top.max(0);
    let draw_right = (left + scaled_w).min(viewport.width as i32);
    let draw_bottom = (top + scaled_h).min(viewport.height as i32);
    if draw_left >= draw_right || draw_top >= draw_bottom {
        return;
    }

    let sprite_width = sprite.width as usize;
    for out_y in draw_top..draw_bottom {
        let src_y = (((out_y - top) as f32) / scale_y).floor() as u32;
        let src_y = (region_y + src_y.min(region_h - 1)) as usize;
        for out_x in draw_left..draw_right {
            let src_x = (((out_x - left) as f32) / scale_x).floor() as u32;
            let src_x = (region_x + src_x.min(region_w - 1)) as usize;
            let offset = (src_y * sprite_width + src_x) * 4;
            let texel = [
                sprite.rgba[offset],
                sprite.rgba[offset + 1],
                sprite.rgba[offset + 2],
                sprite.rgba[offset + 3],
            ];
            blend_pixel_clipped(frame, viewport, out_x, out_y, texel, alpha);
        }
    }
}
