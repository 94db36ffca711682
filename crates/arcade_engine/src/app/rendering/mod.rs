mod renderer;
mod transform;

use std::cell::Cell;
use std::rc::Rc;

use thiserror::Error;

use crate::app::{Camera, DebugOverlay, Stage};
use crate::loader::Cache;
use crate::physics::BodySet;

pub use renderer::{PixelsRenderer, Rasterizer};
pub use transform::{world_rect_to_screen_px, world_to_screen_px, ScreenRectPx, Viewport};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("pixels backend failed: {0}")]
    Pixels(#[from] pixels::Error),
}

/// Everything a backend may read while drawing a frame.
#[derive(Clone, Copy)]
pub struct RenderView<'a> {
    pub stage: &'a Stage,
    pub cache: &'a Cache,
    pub camera: &'a Camera,
    pub debug: &'a DebugOverlay,
    pub bodies: &'a BodySet,
}

pub trait Renderer {
    fn render(&mut self, view: &RenderView<'_>) -> Result<(), RenderError>;
    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError>;
    fn destroy(&mut self) {}
}

/// Shared tallies for a `HeadlessRenderer`, readable after the renderer has
/// been boxed into a game.
#[derive(Debug, Clone, Default)]
pub struct RenderCounter {
    renders: Rc<Cell<u64>>,
    resizes: Rc<Cell<u64>>,
    destroyed: Rc<Cell<bool>>,
}

impl RenderCounter {
    pub fn renders(&self) -> u64 {
        self.renders.get()
    }

    pub fn resizes(&self) -> u64 {
        self.resizes.get()
    }

    pub fn destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    counter: RenderCounter,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self) -> RenderCounter {
        self.counter.clone()
    }
}

impl Renderer for HeadlessRenderer {
    fn render(&mut self, _view: &RenderView<'_>) -> Result<(), RenderError> {
        self.counter.renders.set(self.counter.renders.get() + 1);
        Ok(())
    }

    fn resize(&mut self, _width: u32, _height: u32) -> Result<(), RenderError> {
        self.counter.resizes.set(self.counter.resizes.get() + 1);
        Ok(())
    }

    fn destroy(&mut self) {
        self.counter.destroyed.set(true);
    }
}
