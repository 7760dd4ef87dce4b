//! Per-route admission control and worker supervision.
//!
//! The controller runs on a fixed sub-second tick. Each tick, under the one
//! engine-wide critical section:
//!
//! 1. Re-filter the pending queue (defensive against stale entries)
//! 2. Reconcile every live worker: drain its message channel, persist
//!    reported progress, and decide the terminal state of workers that have
//!    exited
//! 3. Admit pending tasks in global creation-time order, skipping (not
//!    blocking on) tasks whose route is busy: a work-conserving,
//!    per-resource admission policy rather than a strict global FIFO
//!
//! When the daemon is not active (scheduler lock not held) the tick is a
//! no-op. A failed tick is logged and abandoned; the next tick retries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::executor::Executor;
use crate::lock::ActiveFlag;
use crate::metrics::EngineMetrics;
use crate::registry::{OrchestratorState, TaskRegistry};
use crate::task::TaskState;

/// What one tick did; returned for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Whether the daemon was active when the tick ran.
    pub active: bool,
    /// Tasks admitted this tick.
    pub admitted: usize,
    /// Workers reconciled into a terminal state this tick.
    pub reconciled: usize,
    /// Pending tasks after the tick.
    pub pending: usize,
    /// Live workers after the tick.
    pub running: usize,
}

/// Decides which pending tasks may start and supervises the ones running.
pub struct AdmissionController {
    registry: Arc<TaskRegistry>,
    executor: Arc<Executor>,
    active: ActiveFlag,
    period: Duration,
    metrics: EngineMetrics,
}

impl AdmissionController {
    /// Creates a controller ticking at `period` when driven by [`run`](Self::run).
    #[must_use]
    pub fn new(
        registry: Arc<TaskRegistry>,
        executor: Arc<Executor>,
        active: ActiveFlag,
        period: Duration,
    ) -> Self {
        Self {
            registry,
            executor,
            active,
            period,
            metrics: EngineMetrics::new(),
        }
    }

    /// Runs the tick loop until shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            if let Err(error) = self.tick().await {
                tracing::warn!(%error, "admission tick failed; retrying next period");
            }
        }
        tracing::info!("admission loop stopped");
    }

    /// Performs one admission/supervision pass.
    ///
    /// # Errors
    ///
    /// Propagates store failures; the in-memory registry stays authoritative
    /// and the next tick retries the durable writes that did not land.
    pub async fn tick(&self) -> Result<TickReport> {
        if !self.active.is_active() {
            return Ok(TickReport::default());
        }

        let started = Instant::now();
        let mut report = TickReport {
            active: true,
            ..TickReport::default()
        };

        let mut state = self.registry.lock().await;
        state.refilter_pending();

        report.reconciled = self.reconcile_workers(&mut state).await?;
        report.admitted = self.admit_pending(&mut state).await?;

        state.refilter_pending();
        report.pending = state.pending_count();
        report.running = state.running_count();
        drop(state);

        self.metrics
            .set_queue_depths(report.pending, report.running);
        self.metrics.observe_tick(started.elapsed());
        tracing::debug!(
            admitted = report.admitted,
            reconciled = report.reconciled,
            pending = report.pending,
            running = report.running,
            "tick complete"
        );
        Ok(report)
    }

    /// Drains every live worker's channel and settles the exited ones.
    async fn reconcile_workers(&self, state: &mut OrchestratorState) -> Result<usize> {
        let mut reconciled = 0;

        for id in state.worker_ids() {
            let Some(handle) = state.worker_mut(id) else {
                continue;
            };

            // Check liveness before draining: a finished worker has already
            // buffered everything it will ever send, so the drain below is
            // complete for it.
            let finished = handle.is_finished();
            let operations = handle.drain();
            let was_aborted = handle.was_aborted();
            let failure = handle.failure().cloned();

            if !operations.is_empty() {
                let task = state.task_mut(id)?;
                let progress = task.progress.get_or_insert_with(Default::default);
                for operation in operations {
                    progress.record_operation(operation);
                }
                let snapshot = task.clone();
                self.registry.persist(&snapshot).await?;
            }

            if !finished {
                continue;
            }

            let now = Utc::now();
            let route = state.task(id)?.route();
            let from = state.task(id)?.state;

            let snapshot = if was_aborted {
                // State was already set by the abort operation; do not
                // overwrite, regardless of what the worker reported.
                state.task(id)?.clone()
            } else if let Some(error) = failure {
                let task = state.task_mut(id)?;
                task.error = Some(error);
                let snapshot = state.transition_task(id, TaskState::Failed, now)?;
                self.metrics.record_transition(from, TaskState::Failed);
                snapshot
            } else {
                let snapshot = state.transition_task(id, TaskState::Completed, now)?;
                self.metrics.record_transition(from, TaskState::Completed);
                snapshot
            };

            self.registry.persist(&snapshot).await?;
            state.release_route_slot(&route, id);
            state.remove_worker(id);
            reconciled += 1;
            tracing::info!(task_id = %id, state = %snapshot.state, "task settled");
        }

        Ok(reconciled)
    }

    /// Admits pending tasks in creation-time order, skipping busy routes.
    async fn admit_pending(&self, state: &mut OrchestratorState) -> Result<usize> {
        let mut admitted = 0;

        for id in state.pending_ids() {
            let task = state.task(id)?;
            if task.state != TaskState::Pending {
                continue;
            }
            let route = task.route();
            if !state.route_is_free(&route) {
                tracing::debug!(task_id = %id, route = %route, "route busy; skipping");
                continue;
            }

            let snapshot = state.transition_task(id, TaskState::Running, Utc::now())?;
            self.registry.persist(&snapshot).await?;
            state.grant_route_slot(route, id);
            let handle = self.executor.spawn(&snapshot);
            state.insert_worker(id, handle);
            self.metrics
                .record_transition(TaskState::Pending, TaskState::Running);
            admitted += 1;
            tracing::info!(task_id = %id, "task admitted");
        }

        Ok(admitted)
    }
}
