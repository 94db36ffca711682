use arcade_engine::app::{GameContext, Plugin};
use tracing::debug;

/// Periodic per-step summary of the simulation, logged at debug level.
pub(crate) struct StatsPlugin {
    interval_steps: u64,
    steps: u64,
}

impl StatsPlugin {
    pub(crate) fn new(interval_steps: u64) -> Self {
        Self {
            interval_steps: interval_steps.max(1),
            steps: 0,
        }
    }
}

impl Plugin for StatsPlugin {
    fn post_update(&mut self, ctx: &mut GameContext) {
        self.steps += 1;
        if self.steps % self.interval_steps != 0 {
            return;
        }
        debug!(
            steps = self.steps,
            sim_time_ms = ctx.clock.time,
            nodes = ctx.stage.len(),
            bodies = ctx.bodies.len(),
            tweens = ctx.tweens.len(),
            "demo_stats"
        );
    }
}
