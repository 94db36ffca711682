pub const DEFAULT_DESIRED_FPS: u32 = 60;

/// Frame and step timing. Driven entirely by the `now_ms` values handed to
/// `update`, so it never reads a wall clock itself.
#[derive(Debug, Clone)]
pub struct Clock {
    /// Simulated milliseconds advanced by logic steps.
    pub time: f64,
    pub now: f64,
    pub prev_time: f64,
    pub elapsed: f64,
    pub elapsed_ms: f64,
    /// Seconds integrated by the current logic step.
    pub physics_elapsed: f32,
    pub physics_elapsed_ms: f32,
    pub slow_motion: f32,
    pub advanced_timing: bool,
    pub frames: u64,
    pub logic_steps: u64,
    pub fps: f32,
    pub fps_min: f32,
    pub fps_max: f32,
    pub ms_min: f64,
    pub ms_max: f64,
    pub pause_duration: f64,
    desired_fps: u32,
    desired_frame_interval_ms: f64,
    desired_fps_mult: f32,
    pause_started: Option<f64>,
    resync: bool,
    started: bool,
    window_start: f64,
    window_frames: u32,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(DEFAULT_DESIRED_FPS, 1.0)
    }
}

impl Clock {
    pub fn new(desired_fps: u32, slow_motion: f32) -> Self {
        let mut clock = Self {
            time: 0.0,
            now: 0.0,
            prev_time: 0.0,
            elapsed: 0.0,
            elapsed_ms: 0.0,
            physics_elapsed: 0.0,
            physics_elapsed_ms: 0.0,
            slow_motion: if slow_motion > 0.0 { slow_motion } else { 1.0 },
            advanced_timing: false,
            frames: 0,
            logic_steps: 0,
            fps: 0.0,
            fps_min: f32::MAX,
            fps_max: 0.0,
            ms_min: f64::MAX,
            ms_max: 0.0,
            pause_duration: 0.0,
            desired_fps: DEFAULT_DESIRED_FPS,
            desired_frame_interval_ms: 1000.0 / DEFAULT_DESIRED_FPS as f64,
            desired_fps_mult: 1.0 / DEFAULT_DESIRED_FPS as f32,
            pause_started: None,
            resync: false,
            started: false,
            window_start: 0.0,
            window_frames: 0,
        };
        clock.set_desired_fps(desired_fps);
        clock.physics_elapsed = clock.desired_fps_mult;
        clock.physics_elapsed_ms = clock.desired_fps_mult * 1000.0;
        clock
    }

    pub fn desired_fps(&self) -> u32 {
        self.desired_fps
    }

    pub fn set_desired_fps(&mut self, fps: u32) {
        let fps = fps.max(1);
        self.desired_fps = fps;
        self.desired_frame_interval_ms = 1000.0 / fps as f64;
        self.desired_fps_mult = 1.0 / fps as f32;
    }

    /// Sets the fixed step length directly; `desired_fps` becomes its
    /// rounded reciprocal.
    pub fn set_desired_frame_interval_ms(&mut self, interval_ms: f64) {
        if !(interval_ms.is_finite() && interval_ms > 0.0) {
            return;
        }
        self.desired_frame_interval_ms = interval_ms;
        self.desired_fps_mult = (interval_ms / 1000.0) as f32;
        self.desired_fps = (1000.0 / interval_ms).round().max(1.0) as u32;
    }

    pub fn desired_frame_interval_ms(&self) -> f64 {
        self.desired_frame_interval_ms
    }

    /// Seconds per fixed logic step.
    pub fn desired_fps_mult(&self) -> f32 {
        self.desired_fps_mult
    }

    /// Length of one catch-up step in tick milliseconds.
    pub fn slow_step_ms(&self) -> f64 {
        self.desired_frame_interval_ms * self.slow_motion as f64
    }

    pub fn update(&mut self, now_ms: f64) {
        if !self.started {
            self.started = true;
            self.now = now_ms;
            self.prev_time = now_ms;
            self.elapsed = 0.0;
            self.elapsed_ms = 0.0;
            self.window_start = now_ms;
            return;
        }

        self.prev_time = self.now;
        self.now = now_ms;
        if self.resync {
            self.resync = false;
            self.prev_time = now_ms;
            if let Some(started) = self.pause_started.take() {
                self.pause_duration = now_ms - started;
            }
        }
        self.elapsed = self.now - self.prev_time;
        self.elapsed_ms = self.elapsed;
        self.frames = self.frames.saturating_add(1);

        if self.advanced_timing {
            self.update_advanced_timing();
        }
    }

    /// Advances simulated time by one logic step of `step_seconds`.
    pub fn refresh(&mut self, step_seconds: f32) {
        self.physics_elapsed = step_seconds;
        self.physics_elapsed_ms = step_seconds * 1000.0;
        self.time += self.physics_elapsed_ms as f64;
        self.logic_steps = self.logic_steps.saturating_add(1);
    }

    pub(crate) fn game_paused(&mut self) {
        self.pause_started = Some(self.now);
    }

    /// The next `update` treats the paused span as zero elapsed time.
    pub(crate) fn game_resumed(&mut self) {
        self.resync = true;
    }

    fn update_advanced_timing(&mut self) {
        if self.elapsed > 0.0 {
            self.ms_min = self.ms_min.min(self.elapsed);
            self.ms_max = self.ms_max.max(self.elapsed);
        }
        self.window_frames = self.window_frames.saturating_add(1);
        let window = self.now - self.window_start;
        if window >= 1000.0 {
            self.fps = (self.window_frames as f64 * 1000.0 / window) as f32;
            self.fps_min = self.fps_min.min(self.fps);
            self.fps_max = self.fps_max.max(self.fps);
            self.window_start = self.now;
            self.window_frames = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_reports_zero_elapsed() {
        let mut clock = Clock::default();
        clock.update(5000.0);
        assert_eq!(clock.elapsed, 0.0);
        clock.update(5016.0);
        assert_eq!(clock.elapsed, 16.0);
        assert_eq!(clock.prev_time, 5000.0);
    }

    #[test]
    fn resume_swallows_paused_span() {
        let mut clock = Clock::default();
        clock.update(0.0);
        clock.update(10.0);
        clock.game_paused();
        clock.game_resumed();
        clock.update(4010.0);
        assert_eq!(clock.elapsed, 0.0);
        assert_eq!(clock.pause_duration, 4000.0);
        clock.update(4026.0);
        assert_eq!(clock.elapsed, 16.0);
    }

    #[test]
    fn slow_motion_stretches_step() {
        let mut clock = Clock::new(50, 2.0);
        assert_eq!(clock.desired_frame_interval_ms(), 20.0);
        assert_eq!(clock.slow_step_ms(), 40.0);
        clock.set_desired_frame_interval_ms(16.67);
        assert_eq!(clock.desired_fps(), 60);
        assert!((clock.desired_fps_mult() - 0.01667).abs() < 1e-6);
    }

    #[test]
    fn refresh_accumulates_simulated_time() {
        let mut clock = Clock::default();
        clock.refresh(0.5);
        clock.refresh(0.25);
        assert_eq!(clock.time, 750.0);
        assert_eq!(clock.logic_steps, 2);
        assert_eq!(clock.physics_elapsed_ms, 250.0);
    }

    #[test]
    fn advanced_timing_tracks_fps_window() {
        let mut clock = Clock::default();
        clock.advanced_timing = true;
        clock.update(0.0);
        for frame in 1..=20 {
            clock.update(frame as f64 * 50.0);
        }
        assert!((clock.fps - 20.0).abs() < 0.01);
        assert_eq!(clock.ms_min, 50.0);
        assert_eq!(clock.ms_max, 50.0);
    }
}
