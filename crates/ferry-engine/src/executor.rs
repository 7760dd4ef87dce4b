//! Isolated task execution and supervision.
//!
//! Each admitted task runs in its own worker, isolated from the engine and
//! forcibly terminable. The worker owns the producing side of a bounded
//! typed channel carrying the closed [`WorkerMessage`] set; the supervision
//! pass drains the consuming side non-blockingly every tick.
//!
//! The worker re-runs precheck immediately before execution (to catch state
//! drift since submission) and then delegates the actual cross-cluster copy
//! to the [`TransferRunner`](crate::runner::TransferRunner) collaborator.
//! The engine has no visibility into partial copy progress beyond what the
//! worker chooses to report.
//!
//! Abort is cooperative-then-forceful: fire the worker's cancellation token,
//! wait a short grace window, then hard-kill the worker if it is still
//! alive. Data already written by an aborted copy is not rolled back.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ferry_core::TaskId;

use crate::error::Result;
use crate::registry::TaskRegistry;
use crate::runner::{ProgressSender, TransferRunner};
use crate::task::{Task, TaskFailure, TaskState};
use crate::validator::Validator;

/// Messages a worker reports to its supervisor.
///
/// This is a closed set: sub-operation progress and a terminal error. A
/// worker that exits without having sent [`WorkerMessage::Failed`] is
/// considered successful.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// A sub-operation of the transfer has started.
    OperationStarted {
        /// Opaque descriptor of the sub-operation.
        operation: serde_json::Value,
    },
    /// The transfer failed; the worker exits shortly after sending this.
    Failed {
        /// Structured failure payload, captured into the task record.
        error: TaskFailure,
    },
}

/// Supervisor-side handle for one running worker.
///
/// Stored in the orchestrator state and reconciled on every tick.
#[derive(Debug)]
pub struct WorkerHandle {
    join: JoinHandle<()>,
    rx: mpsc::Receiver<WorkerMessage>,
    cancel: CancellationToken,
    aborted: bool,
    failure: Option<TaskFailure>,
}

impl WorkerHandle {
    /// Returns true once the worker has exited.
    ///
    /// When true, every message the worker will ever send has already been
    /// buffered, so a subsequent [`drain`](Self::drain) is complete.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Marks the handle aborted and fires the worker's cancellation token.
    pub fn mark_aborted(&mut self) {
        self.aborted = true;
        self.cancel.cancel();
    }

    /// Returns true when the task was explicitly aborted.
    #[must_use]
    pub const fn was_aborted(&self) -> bool {
        self.aborted
    }

    /// Hard-kills the worker.
    pub fn force_kill(&self) {
        self.join.abort();
    }

    /// Drains all buffered messages without blocking.
    ///
    /// Returns the newly reported sub-operations in order; a terminal error
    /// payload is retained on the handle for the reconcile decision.
    pub fn drain(&mut self) -> Vec<serde_json::Value> {
        let mut operations = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            match message {
                WorkerMessage::OperationStarted { operation } => operations.push(operation),
                WorkerMessage::Failed { error } => self.failure = Some(error),
            }
        }
        operations
    }

    /// Returns the captured terminal error, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&TaskFailure> {
        self.failure.as_ref()
    }
}

/// Bounded capacity of the worker message channel.
const WORKER_CHANNEL_CAPACITY: usize = 64;

/// Spawns and terminates task workers.
pub struct Executor {
    validator: Arc<Validator>,
    runner: Arc<dyn TransferRunner>,
    abort_grace: Duration,
}

impl Executor {
    /// Creates an executor delegating transfers to `runner`.
    #[must_use]
    pub fn new(
        validator: Arc<Validator>,
        runner: Arc<dyn TransferRunner>,
        abort_grace: Duration,
    ) -> Self {
        Self {
            validator,
            runner,
            abort_grace,
        }
    }

    /// Launches a worker for an admitted task.
    ///
    /// The worker re-runs precheck, executes the transfer, and reports over
    /// its channel. It holds no reference to the orchestrator state; all
    /// reconciliation happens supervisor-side.
    #[must_use]
    pub fn spawn(&self, task: &Task) -> WorkerHandle {
        let (tx, rx) = mpsc::channel(WORKER_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let validator = Arc::clone(&self.validator);
        let runner = Arc::clone(&self.runner);
        let task = task.clone();

        let join = tokio::spawn(async move {
            let task_id = task.id;
            tokio::select! {
                () = worker_cancel.cancelled() => {
                    tracing::info!(task_id = %task_id, "worker interrupted");
                }
                () = run_worker(task, validator, runner, tx) => {}
            }
        });

        WorkerHandle {
            join,
            rx,
            cancel,
            aborted: false,
            failure: None,
        }
    }

    /// Aborts a task: mark the worker handle, fire its cancellation token,
    /// transition the task to `aborted` unless it is already terminal, wait
    /// the grace window, then hard-kill a worker that is still alive.
    ///
    /// Aborting an already-terminal task is a no-op, not an error. The
    /// route's concurrency slot stays held until the supervision pass
    /// observes the worker's exit.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::TaskNotFound`] for unknown ids, or a
    /// store failure from persisting the transition.
    pub async fn abort(&self, registry: &TaskRegistry, id: TaskId) -> Result<()> {
        let had_live_worker = {
            let mut state = registry.lock().await;
            if state.task(id)?.state.is_terminal() {
                return Ok(());
            }

            let had_live_worker = match state.worker_mut(id) {
                Some(handle) => {
                    handle.mark_aborted();
                    !handle.is_finished()
                }
                None => false,
            };

            let snapshot = state.transition_task(id, TaskState::Aborted, Utc::now())?;
            registry.persist(&snapshot).await?;
            tracing::info!(task_id = %id, "task aborted");
            had_live_worker
        };

        if had_live_worker {
            // The grace window runs outside the critical section.
            tokio::time::sleep(self.abort_grace).await;
            let state = registry.lock().await;
            if let Some(handle) = state.worker(id) {
                if !handle.is_finished() {
                    tracing::warn!(task_id = %id, "worker ignored interrupt; killing it");
                    handle.force_kill();
                }
            }
        }
        Ok(())
    }
}

/// The worker body: pre-execution precheck, then the delegated transfer.
async fn run_worker(
    task: Task,
    validator: Arc<Validator>,
    runner: Arc<dyn TransferRunner>,
    tx: mpsc::Sender<WorkerMessage>,
) {
    tracing::info!(task_id = %task.id, route = %task.route(), "executing task");

    if let Err(error) = validator.precheck(&task).await {
        tracing::warn!(task_id = %task.id, %error, "pre-execution precheck failed");
        let _ = tx
            .send(WorkerMessage::Failed {
                error: TaskFailure::new(error.to_string()),
            })
            .await;
        return;
    }

    // Precheck guarantees the route classifies.
    let kind = match validator.route_kind(&task) {
        Ok(kind) => kind,
        Err(error) => {
            let _ = tx
                .send(WorkerMessage::Failed {
                    error: TaskFailure::new(error.to_string()),
                })
                .await;
            return;
        }
    };

    let progress = ProgressSender::new(tx.clone());
    match runner.execute(&task, kind, &progress).await {
        Ok(()) => {
            tracing::info!(task_id = %task.id, "task transfer finished");
        }
        Err(failure) => {
            tracing::warn!(task_id = %task.id, error = %failure, "task transfer failed");
            let _ = tx.send(WorkerMessage::Failed { error: failure }).await;
        }
    }
}
