use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use crate::geom::Vec2;
use crate::loader::FileFetcher;
use crate::{resolve_app_paths, StartupError};

use super::game::{Game, GameConfig, GameState, SkipReason};
use super::input::{InputEvent, Key, PointerButton};
use super::metrics::{MetricsAccumulator, MetricsHandle};
use super::rendering::{PixelsRenderer, RenderError};

pub const SLOW_FRAME_ENV_VAR: &str = "ARCADE_SLOW_FRAME_MS";

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] RenderError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

/// Opens a window and drives `Game::update` from redraw ticks until the
/// window closes or the game is destroyed. `setup` registers scenes and
/// plugins before the game boots into `start_scene`.
pub fn run_app(
    config: GameConfig,
    start_scene: &str,
    setup: impl FnOnce(&mut Game),
) -> Result<(), AppError> {
    run_app_with_metrics(config, start_scene, setup, MetricsHandle::default())
}

pub fn run_app_with_metrics(
    config: GameConfig,
    start_scene: &str,
    setup: impl FnOnce(&mut Game),
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let app_paths = resolve_app_paths()?;
    info!(
        root = %app_paths.root.display(),
        assets_dir = %app_paths.assets_dir.display(),
        source = ?app_paths.source,
        "startup"
    );

    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.title.clone())
            .with_inner_size(LogicalSize::new(config.width as f64, config.height as f64))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let renderer = PixelsRenderer::new(Arc::clone(&window)).map_err(AppError::CreateRenderer)?;
    let fetcher = FileFetcher::new(app_paths.assets_dir.clone());

    let mut game = Game::new(&config, Box::new(renderer), Box::new(fetcher));
    setup(&mut game);
    game.boot(start_scene);
    let size = window.inner_size();
    game.resize(size.width, size.height);

    event_loop.set_control_flow(ControlFlow::Poll);

    let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
    info!(
        desired_fps = config.desired_fps,
        delta_cap_ms = config.delta_cap_ms,
        stepping = ?config.stepping_policy,
        metrics_log_interval_ms = config.metrics_log_interval_ms,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        "loop_config"
    );

    let started = Instant::now();
    let mut last_tick_ms = 0.0_f64;
    let mut metrics_accumulator = MetricsAccumulator::new(config.metrics_log_interval_ms as f64);
    let mut cursor = Vec2::ZERO;
    let mut pending_zoom_steps = 0_i32;

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    info!(reason = "window_close", "shutdown_requested");
                    window_target.exit();
                }
                WindowEvent::Resized(new_size) => {
                    game.resize(new_size.width, new_size.height);
                }
                WindowEvent::ScaleFactorChanged { .. } => {
                    let size = window.inner_size();
                    game.resize(size.width, size.height);
                }
                WindowEvent::Focused(true) => game.focus_gained(),
                WindowEvent::Focused(false) => game.focus_lost(),
                WindowEvent::CursorMoved { position, .. } => {
                    cursor = Vec2::new(position.x as f32, position.y as f32);
                    game.push_input(InputEvent::PointerMove { position: cursor });
                }
                WindowEvent::MouseInput { state, button, .. } => {
                    if let Some(event) = pointer_event(button, state, cursor) {
                        game.push_input(event);
                    }
                }
                WindowEvent::MouseWheel { delta, .. } => {
                    pending_zoom_steps =
                        pending_zoom_steps.saturating_add(zoom_steps_from_scroll_delta(delta));
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.repeat {
                        return;
                    }
                    let Some(key) = key_from_physical(event.physical_key) else {
                        return;
                    };
                    let pressed = event.state == ElementState::Pressed;
                    if pressed {
                        apply_control_key(&mut game, key);
                    }
                    game.push_input(if pressed {
                        InputEvent::KeyDown(key)
                    } else {
                        InputEvent::KeyUp(key)
                    });
                }
                WindowEvent::RedrawRequested => {
                    if slow_frame_delay > Duration::ZERO {
                        // Explicit debug perturbation only; this is not a frame cap.
                        thread::sleep(slow_frame_delay);
                    }
                    if pending_zoom_steps != 0 {
                        game.ctx.camera.apply_zoom_steps(pending_zoom_steps);
                        pending_zoom_steps = 0;
                    }

                    let now_ms = started.elapsed().as_secs_f64() * 1000.0;
                    let report = game.update(now_ms);
                    metrics_accumulator.record_tick(
                        now_ms - last_tick_ms,
                        report.updates,
                        report.renders,
                        report.skipped == Some(SkipReason::SpiralBailOut),
                    );
                    last_tick_ms = now_ms;

                    if report.render_failed {
                        window_target.exit();
                        return;
                    }
                    if game.state() == GameState::Destroyed {
                        info!(reason = "game_destroyed", "shutdown_requested");
                        window_target.exit();
                        return;
                    }

                    if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now_ms) {
                        metrics_handle.publish(snapshot);
                        info!(
                            fps = snapshot.fps,
                            ups = snapshot.ups,
                            frame_time_ms = snapshot.frame_time_ms,
                            catch_up_steps = snapshot.catch_up_steps,
                            spiral_bailouts = snapshot.spiral_bailouts,
                            nodes = game.ctx.stage.len(),
                            scene = game.scenes.current().unwrap_or("none"),
                            "loop_metrics"
                        );
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                window.request_redraw();
            }
            Event::LoopExiting => {
                if game.state() != GameState::Destroyed {
                    game.request_destroy();
                    game.update(started.elapsed().as_secs_f64() * 1000.0);
                }
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

/// Engine-level keys handled before the game sees them.
fn apply_control_key(game: &mut Game, key: Key) {
    match key {
        Key::Escape => {
            info!(reason = "escape_key", "shutdown_requested");
            game.request_destroy();
        }
        Key::Pause => {
            if game.paused_by_code() {
                game.resume();
            } else {
                game.pause();
            }
        }
        Key::Step => {
            if game.stepping() {
                game.step();
            } else {
                game.enable_step();
                info!("stepping_enabled");
            }
        }
        Key::Enter if game.stepping() => {
            game.disable_step();
            info!("stepping_disabled");
        }
        _ => {}
    }
}

fn key_from_physical(key: PhysicalKey) -> Option<Key> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    match code {
        KeyCode::KeyW | KeyCode::ArrowUp => Some(Key::Up),
        KeyCode::KeyS | KeyCode::ArrowDown => Some(Key::Down),
        KeyCode::KeyA | KeyCode::ArrowLeft => Some(Key::Left),
        KeyCode::KeyD | KeyCode::ArrowRight => Some(Key::Right),
        KeyCode::Space => Some(Key::Space),
        KeyCode::Enter => Some(Key::Enter),
        KeyCode::Escape => Some(Key::Escape),
        KeyCode::KeyP => Some(Key::Pause),
        KeyCode::Period => Some(Key::Step),
        _ => None,
    }
}

fn pointer_event(button: MouseButton, state: ElementState, position: Vec2) -> Option<InputEvent> {
    let button = match button {
        MouseButton::Left => PointerButton::Primary,
        MouseButton::Right => PointerButton::Secondary,
        _ => return None,
    };
    Some(match state {
        ElementState::Pressed => InputEvent::PointerDown { position, button },
        ElementState::Released => InputEvent::PointerUp { position, button },
    })
}

fn zoom_steps_from_scroll_delta(delta: MouseScrollDelta) -> i32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y.round() as i32,
        MouseScrollDelta::PixelDelta(position) => {
            if position.y > 0.0 {
                1
            } else if position.y < 0.0 {
                -1
            } else {
                0
            }
        }
    }
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => parse_slow_frame_ms(&value).unwrap_or_else(|| {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                value = value.as_str(),
                "slow_frame_override_rejected"
            );
            Duration::from_millis(config_slow_frame_ms)
        }),
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_frame_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "slow_frame_override_unreadable"
            );
            Duration::from_millis(config_slow_frame_ms)
        }
    }
}

fn parse_slow_frame_ms(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use winit::dpi::PhysicalPosition;

    use super::*;

    #[test]
    fn wasd_and_arrow_keys_map_to_directions() {
        assert_eq!(key_from_physical(PhysicalKey::Code(KeyCode::KeyW)), Some(Key::Up));
        assert_eq!(key_from_physical(PhysicalKey::Code(KeyCode::ArrowUp)), Some(Key::Up));
        assert_eq!(key_from_physical(PhysicalKey::Code(KeyCode::KeyA)), Some(Key::Left));
        assert_eq!(key_from_physical(PhysicalKey::Code(KeyCode::ArrowRight)), Some(Key::Right));
        assert_eq!(key_from_physical(PhysicalKey::Code(KeyCode::KeyS)), Some(Key::Down));
    }

    #[test]
    fn control_keys_map_and_unbound_keys_are_ignored() {
        assert_eq!(key_from_physical(PhysicalKey::Code(KeyCode::KeyP)), Some(Key::Pause));
        assert_eq!(key_from_physical(PhysicalKey::Code(KeyCode::Period)), Some(Key::Step));
        assert_eq!(key_from_physical(PhysicalKey::Code(KeyCode::Escape)), Some(Key::Escape));
        assert_eq!(key_from_physical(PhysicalKey::Code(KeyCode::KeyZ)), None);
    }

    #[test]
    fn mouse_buttons_map_to_pointer_events() {
        let at = Vec2::new(3.0, 4.0);
        assert_eq!(
            pointer_event(MouseButton::Left, ElementState::Pressed, at),
            Some(InputEvent::PointerDown {
                position: at,
                button: PointerButton::Primary
            })
        );
        assert_eq!(
            pointer_event(MouseButton::Right, ElementState::Released, at),
            Some(InputEvent::PointerUp {
                position: at,
                button: PointerButton::Secondary
            })
        );
        assert_eq!(pointer_event(MouseButton::Middle, ElementState::Pressed, at), None);
    }

    #[test]
    fn pixel_wheel_delta_maps_to_single_discrete_step_direction() {
        let up = MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 12.0));
        let down = MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, -40.0));
        let none = MouseScrollDelta::PixelDelta(PhysicalPosition::new(5.0, 0.0));
        assert_eq!(zoom_steps_from_scroll_delta(up), 1);
        assert_eq!(zoom_steps_from_scroll_delta(down), -1);
        assert_eq!(zoom_steps_from_scroll_delta(none), 0);
        assert_eq!(zoom_steps_from_scroll_delta(MouseScrollDelta::LineDelta(0.0, -2.0)), -2);
    }

    #[test]
    fn slow_frame_value_parses_whole_milliseconds() {
        assert_eq!(parse_slow_frame_ms(" 25 "), Some(Duration::from_millis(25)));
        assert_eq!(parse_slow_frame_ms("fast"), None);
        assert_eq!(parse_slow_frame_ms("-3"), None);
    }
}
