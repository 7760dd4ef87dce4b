//! The data-movement collaborator.
//!
//! The engine decides *when* and *whether* a transfer runs; the
//! [`TransferRunner`] decides *how*. Implementations wrap the per-route
//! copy machinery (remote copy operations, pull/push jobs, relay feeds) and
//! report coarse progress through the worker's message channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::cluster::RouteKind;
use crate::executor::WorkerMessage;
use crate::task::{Task, TaskFailure};

/// Worker-side progress reporting handle.
///
/// Wraps the producing end of the worker's message channel; the supervisor
/// persists every reported sub-operation into the task's progress list.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<WorkerMessage>,
}

impl ProgressSender {
    /// Wraps a worker channel.
    #[must_use]
    pub fn new(tx: mpsc::Sender<WorkerMessage>) -> Self {
        Self { tx }
    }

    /// Reports that a sub-operation has started.
    ///
    /// Delivery is best-effort: if the supervisor is gone the report is
    /// dropped, never an error the transfer has to handle.
    pub async fn operation_started(&self, operation: serde_json::Value) {
        let _ = self
            .tx
            .send(WorkerMessage::OperationStarted { operation })
            .await;
    }
}

/// Executes the actual cross-cluster copy for a classified route.
///
/// The runner is an opaque unit of work from the engine's perspective: it
/// reports sub-operations as they start and returns either success or a
/// structured failure. It must tolerate being cancelled at any await point
/// (abort fires the worker's cancellation token) and must not assume it
/// runs at most once per task (recovery re-executes tasks killed mid-copy).
#[async_trait]
pub trait TransferRunner: Send + Sync {
    /// Runs the transfer to completion.
    ///
    /// # Errors
    ///
    /// Returns the failure payload to capture into the task record.
    async fn execute(
        &self,
        task: &Task,
        route: RouteKind,
        progress: &ProgressSender,
    ) -> std::result::Result<(), TaskFailure>;
}

/// Runner that performs no work.
///
/// Reports a single synthetic sub-operation and succeeds. Used by the
/// development wiring and as a baseline in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRunner;

#[async_trait]
impl TransferRunner for NoOpRunner {
    async fn execute(
        &self,
        task: &Task,
        route: RouteKind,
        progress: &ProgressSender,
    ) -> std::result::Result<(), TaskFailure> {
        progress
            .operation_started(serde_json::json!({
                "operation": "noop",
                "task_id": task.id.to_string(),
                "route_kind": format!("{route:?}"),
            }))
            .await;
        Ok(())
    }
}
