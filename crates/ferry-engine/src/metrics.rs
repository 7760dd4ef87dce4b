//! Observability metrics for the orchestration engine.
//!
//! Metrics are exposed via the `metrics` crate facade; deployments install
//! whatever exporter they use (Prometheus, statsd) at daemon startup.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `ferry_tasks_total` | Counter | `from_state`, `to_state` | Task state transitions |
//! | `ferry_pending_tasks` | Gauge | - | Tasks waiting for a route slot |
//! | `ferry_running_tasks` | Gauge | - | Live workers |
//! | `ferry_admission_tick_duration_seconds` | Histogram | - | Tick processing time |
//! | `ferry_lock_attempts_total` | Counter | `outcome` | Scheduler-lock acquisition attempts |

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::task::TaskState;

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: total task state transitions.
    pub const TASKS_TOTAL: &str = "ferry_tasks_total";
    /// Gauge: tasks waiting for a route slot.
    pub const PENDING_TASKS: &str = "ferry_pending_tasks";
    /// Gauge: live workers.
    pub const RUNNING_TASKS: &str = "ferry_running_tasks";
    /// Histogram: admission/supervision tick duration in seconds.
    pub const ADMISSION_TICK_DURATION_SECONDS: &str = "ferry_admission_tick_duration_seconds";
    /// Counter: scheduler-lock acquisition attempts.
    pub const LOCK_ATTEMPTS_TOTAL: &str = "ferry_lock_attempts_total";
}

/// Metric label keys.
pub mod labels {
    /// Transition source state.
    pub const FROM_STATE: &str = "from_state";
    /// Transition target state.
    pub const TO_STATE: &str = "to_state";
    /// Lock attempt outcome: `acquired`, `conflict`, or `error`.
    pub const OUTCOME: &str = "outcome";
}

/// Facade over the engine's metric instruments.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineMetrics;

impl EngineMetrics {
    /// Creates the facade.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records a task state transition.
    pub fn record_transition(&self, from: TaskState, to: TaskState) {
        counter!(
            names::TASKS_TOTAL,
            labels::FROM_STATE => from.to_string(),
            labels::TO_STATE => to.to_string(),
        )
        .increment(1);
    }

    /// Updates the queue-depth gauges.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_queue_depths(&self, pending: usize, running: usize) {
        gauge!(names::PENDING_TASKS).set(pending as f64);
        gauge!(names::RUNNING_TASKS).set(running as f64);
    }

    /// Records one admission/supervision tick.
    pub fn observe_tick(&self, duration: Duration) {
        histogram!(names::ADMISSION_TICK_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Records a scheduler-lock acquisition attempt.
    pub fn record_lock_attempt(&self, outcome: &'static str) {
        counter!(names::LOCK_ATTEMPTS_TOTAL, labels::OUTCOME => outcome).increment(1);
    }
}
