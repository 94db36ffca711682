mod clock;
mod game;
mod input;
mod loop_runner;
mod metrics;
mod rendering;
mod scene;
mod stage;
mod subsystems;
mod tween;

pub use clock::{Clock, DEFAULT_DESIRED_FPS};
pub use game::{
    Game, GameConfig, GameContext, GameState, LogicPhase, OverCapPolicy, Plugin, SkipReason,
    SteppingPolicy, TickReport, FPS_PROBLEM_NOTIFY_INTERVAL_MS, LOGIC_PHASES, SPIRAL_THRESHOLD,
};
pub use input::{Input, InputEvent, Key, PointerButton};
pub use loop_runner::{run_app, run_app_with_metrics, AppError, SLOW_FRAME_ENV_VAR};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use rendering::{
    world_rect_to_screen_px, world_to_screen_px, HeadlessRenderer, PixelsRenderer, Rasterizer,
    RenderCounter, RenderError, RenderView, Renderer, ScreenRectPx, Viewport,
};
pub use scene::{Scene, SceneChange, SceneManager, SceneStart};
pub use stage::{Graphic, Node, NodeId, Stage};
pub use subsystems::{
    AudioSystem, Camera, DebugLine, DebugOverlay, ScaleManager, SilentAudio, CAMERA_ZOOM_DEFAULT,
    CAMERA_ZOOM_MAX, CAMERA_ZOOM_MIN, CAMERA_ZOOM_STEP,
};
pub use tween::{Easing, Tween, TweenCompleted, TweenId, TweenManager, TweenProperty};
