use std::cell::RefCell;
use std::rc::Rc;

use arcade_engine::app::{GameContext, Graphic, Node, NodeId, Scene};
use arcade_engine::loader::{FileError, PackSource};
use arcade_engine::HandlerId;
use tracing::info;

use super::bounce;

pub(crate) const KEY: &str = "preload";
pub(crate) const PACK_KEY: &str = "demo";
pub(crate) const PACK_URL: &str = "packs/demo.json";

const BAR_WIDTH: f32 = 400.0;
const BAR_HEIGHT: f32 = 16.0;
const TRACK_COLOR: [u8; 4] = [60, 64, 72, 255];
const FILL_COLOR: [u8; 4] = [90, 200, 120, 255];

/// Streams the demo pack behind a progress bar, then hands over to the
/// bounce scene. Failed files are tallied and never block the swap.
#[derive(Default)]
pub(crate) struct PreloadScene {
    fill: Option<NodeId>,
    failed: Rc<RefCell<Vec<String>>>,
    error_handler: Option<HandlerId>,
}

impl Scene for PreloadScene {
    fn preload(&mut self, ctx: &mut GameContext) {
        let view = ctx.camera.view_size;
        let x = (view.x - BAR_WIDTH) / 2.0;
        let y = (view.y - BAR_HEIGHT) / 2.0;
        ctx.stage.add(Node::new(x, y).with_graphic(Graphic::Rect {
            width: BAR_WIDTH,
            height: BAR_HEIGHT,
            color: TRACK_COLOR,
        }));
        self.fill = Some(ctx.stage.add(Node::new(x, y).with_graphic(Graphic::Rect {
            width: 0.0,
            height: BAR_HEIGHT,
            color: FILL_COLOR,
        })));

        self.failed.borrow_mut().clear();
        let failed = Rc::clone(&self.failed);
        self.error_handler = Some(ctx.loader.on_file_error.add(move |error: &FileError| {
            failed.borrow_mut().push(error.key.clone());
        }));
        ctx.loader.pack(PACK_KEY, PackSource::Url(PACK_URL.to_string()));
    }

    fn load_update(&mut self, ctx: &mut GameContext) {
        let progress = ctx.loader.progress_float() / 100.0;
        let Some(node) = self.fill.and_then(|id| ctx.stage.get_mut(id)) else {
            return;
        };
        if let Some(Graphic::Rect { width, .. }) = node.graphic.as_mut() {
            *width = BAR_WIDTH * progress;
        }
    }

    fn create(&mut self, ctx: &mut GameContext) {
        let failed = self.failed.borrow();
        info!(
            files = ctx.loader.total_loaded_files(),
            failed = failed.len(),
            failed_keys = ?*failed,
            "demo_preload_finished"
        );
        ctx.start_scene(bounce::KEY);
    }

    fn update(&mut self, _ctx: &mut GameContext) {}

    fn shutdown(&mut self, ctx: &mut GameContext) {
        if let Some(id) = self.error_handler.take() {
            ctx.loader.on_file_error.remove(id);
        }
        self.fill = None;
    }
}
