use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LockResult, RwLock};

use tracing::warn;

static POISON_REPORTED: AtomicBool = AtomicBool::new(false);

/// Takes the guard out of a poisoned lock. Only the first recovery is logged.
fn recover<G>(result: LockResult<G>, operation: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        if !POISON_REPORTED.swap(true, Ordering::Relaxed) {
            warn!(operation, "loop_metrics_lock_poisoned");
        }
        poisoned.into_inner()
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    /// Render passes per second.
    pub fps: f32,
    /// Logic updates per second.
    pub ups: f32,
    pub frame_time_ms: f32,
    /// Logic updates run by the most recent tick.
    pub catch_up_steps: u32,
    /// Ticks skipped by the spiral bail-out since start.
    pub spiral_bailouts: u64,
}

/// Cloneable view of the latest published loop figures.
#[derive(Debug, Clone, Default)]
pub struct MetricsHandle {
    latest: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        *recover(self.latest.read(), "read")
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        *recover(self.latest.write(), "write") = snapshot;
    }
}

/// Windowed counters fed with tick timestamps in milliseconds.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_ms: f64,
    interval_start: Option<f64>,
    renders: u32,
    updates: u32,
    ticks: u32,
    frame_time_sum_ms: f64,
    last_steps: u32,
    bailouts: u64,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms: interval_ms.max(1.0),
            interval_start: None,
            renders: 0,
            updates: 0,
            ticks: 0,
            frame_time_sum_ms: 0.0,
            last_steps: 0,
            bailouts: 0,
        }
    }

    pub(crate) fn record_tick(&mut self, frame_ms: f64, updates: u32, renders: u32, bailed_out: bool) {
        self.ticks = self.ticks.saturating_add(1);
        self.updates = self.updates.saturating_add(updates);
        self.renders = self.renders.saturating_add(renders);
        self.frame_time_sum_ms += frame_ms.max(0.0);
        self.last_steps = updates;
        if bailed_out {
            self.bailouts = self.bailouts.saturating_add(1);
        }
    }

    pub(crate) fn maybe_snapshot(&mut self, now_ms: f64) -> Option<LoopMetricsSnapshot> {
        let Some(start) = self.interval_start else {
            self.interval_start = Some(now_ms);
            return None;
        };
        let elapsed_ms = now_ms - start;
        if elapsed_ms < self.interval_ms {
            return None;
        }

        let elapsed_seconds = (elapsed_ms / 1000.0).max(f64::EPSILON) as f32;
        let frame_time_ms = if self.ticks == 0 {
            0.0
        } else {
            (self.frame_time_sum_ms / self.ticks as f64) as f32
        };

        let snapshot = LoopMetricsSnapshot {
            fps: self.renders as f32 / elapsed_seconds,
            ups: self.updates as f32 / elapsed_seconds,
            frame_time_ms,
            catch_up_steps: self.last_steps,
            spiral_bailouts: self.bailouts,
        };

        self.interval_start = Some(now_ms);
        self.renders = 0;
        self.updates = 0;
        self.ticks = 0;
        self.frame_time_sum_ms = 0.0;

        Some(snapshot)
    }
}
