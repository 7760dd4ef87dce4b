//! Startup recovery: rebuild the registry from the durable store.
//!
//! Invoked once, right after the scheduler lock is acquired. Any persisted
//! task found in `running` state is demoted to `pending`: the worker that
//! ran it belonged to a previous process instance and cannot be reattached.
//! Running state is therefore crash-only: it is never trusted across a
//! restart boundary. No task is silently lost, at the cost of at-least-once
//! execution of a task that was killed mid-copy.

use std::sync::Arc;

use crate::error::Result;
use crate::registry::TaskRegistry;
use crate::task::TaskState;

/// What recovery found and repaired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records loaded from the store.
    pub loaded: usize,
    /// Records demoted from running to pending.
    pub demoted: usize,
    /// Tasks queued for admission after the rebuild.
    pub pending: usize,
}

/// Loads persisted tasks and repairs interrupted ones.
pub struct RecoveryLoader {
    registry: Arc<TaskRegistry>,
}

impl RecoveryLoader {
    /// Creates a loader over the registry to rebuild.
    #[must_use]
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self { registry }
    }

    /// Rebuilds the in-memory registry from the store.
    ///
    /// Demotions are persisted as they are applied, so a crash during
    /// recovery leaves records that the next recovery handles identically.
    ///
    /// # Errors
    ///
    /// Propagates store failures; the caller must not flip the daemon
    /// active if recovery fails.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let store = self.registry.store();
        store.ensure_layout().await?;

        let mut records = store.load_tasks().await?;
        records.sort_by_key(|task| (task.creation_time, task.id));

        let mut report = RecoveryReport {
            loaded: records.len(),
            ..RecoveryReport::default()
        };

        let mut state = self.registry.lock().await;
        for mut task in records {
            if task.state == TaskState::Running {
                task.demote_to_pending();
                store.write_task(&task).await?;
                report.demoted += 1;
                tracing::info!(task_id = %task.id, "demoted interrupted task to pending");
            }
            state.install(task);
        }
        state.sort_pending();
        report.pending = state.pending_count();

        tracing::info!(
            loaded = report.loaded,
            demoted = report.demoted,
            pending = report.pending,
            "recovery complete"
        );
        Ok(report)
    }
}
