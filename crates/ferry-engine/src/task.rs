//! Transfer task records and their lifecycle state machine.
//!
//! This module provides:
//! - [`Task`]: the durable unit of work, persisted as a full record
//! - [`TaskState`]: the validated state machine
//! - [`Route`]: the (source, destination) cluster pair used for admission
//! - [`TaskFailure`]: the structured failure payload captured on execution
//!   errors
//! - [`TaskRequest`] / [`TaskView`]: the submission and read-back shapes of
//!   the network API surface

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use ferry_core::{Secret, TaskId};

use crate::error::{Error, Result};

/// Task state machine states.
///
/// Transitions are monotonic along:
/// `pending -> running -> {completed, failed, aborted}`, with
/// `pending -> aborted` for cancellation before admission and the restart
/// loop-back edge `{completed, failed, aborted} -> pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Accepted and waiting for its route's concurrency slot.
    Pending,
    /// Admitted; a worker is executing the transfer.
    Running,
    /// The worker finished without reporting an error.
    Completed,
    /// The worker reported a failure; see [`Task::error`].
    Failed,
    /// Cancelled by the submitter or an administrator.
    Aborted,
}

impl TaskState {
    /// Returns true if this is a terminal state.
    ///
    /// Terminal tasks only move again via an explicit restart, or are
    /// removed via deletion.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    /// Returns true if the transition to `target` is legal.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Running | Self::Aborted)
                | (Self::Running, Self::Completed | Self::Failed | Self::Aborted)
                | (Self::Completed | Self::Failed | Self::Aborted, Self::Pending)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// How the transfer is driven for route kinds that support both directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyMethod {
    /// The destination side reads from the source.
    #[default]
    Pull,
    /// The source side writes into the destination.
    Push,
}

impl fmt::Display for CopyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pull => f.write_str("pull"),
            Self::Push => f.write_str("push"),
        }
    }
}

/// An ordered (source cluster, destination cluster) pair identifying a
/// transfer direction.
///
/// The route is the unit of admission control: at most one task per route is
/// running at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    /// Name of the source cluster.
    pub source: String,
    /// Name of the destination cluster.
    pub destination: String,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// Structured failure payload captured when a worker reports an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Machine-readable error code; `1` for uncategorized failures.
    pub code: u32,
    /// Human-readable description.
    pub message: String,
    /// Nested causes, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner: Vec<TaskFailure>,
}

impl TaskFailure {
    /// Creates an uncategorized failure with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 1,
            message: message.into(),
            inner: Vec::new(),
        }
    }

    /// Sets a machine-readable error code.
    #[must_use]
    pub fn with_code(mut self, code: u32) -> Self {
        self.code = code;
        self
    }

    /// Attaches a nested cause.
    #[must_use]
    pub fn with_cause(mut self, cause: TaskFailure) -> Self {
        self.inner.push(cause);
        self
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Append-only execution progress, present only once a task is running.
///
/// Entries are opaque sub-operation descriptors chosen by the transfer
/// routine; the engine never interprets them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    /// Sub-operations started so far, in order.
    pub operations: Vec<serde_json::Value>,
}

impl TaskProgress {
    /// Appends a sub-operation descriptor.
    pub fn record_operation(&mut self, operation: serde_json::Value) {
        self.operations.push(operation);
    }
}

/// A task submission, as decoded from the `POST /tasks/` body by the API
/// layer.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRequest {
    /// Name of the source cluster.
    pub source_cluster: String,
    /// Path of the source table.
    pub source_table: String,
    /// Name of the destination cluster.
    pub destination_cluster: String,
    /// Path of the destination table; absent for key-value delivery routes.
    #[serde(default)]
    pub destination_table: Option<String>,
    /// Source-side credential; defaults to the submission bearer token.
    #[serde(default)]
    pub source_token: Option<Secret>,
    /// Destination-side credential; defaults to the submission bearer token.
    #[serde(default)]
    pub destination_token: Option<Secret>,
    /// Transfer direction; defaults to pull.
    #[serde(default)]
    pub copy_method: Option<CopyMethod>,
    /// Legacy map/reduce account to run under.
    #[serde(default)]
    pub mr_user: Option<String>,
    /// Opaque caller-supplied annotation, never interpreted by the engine.
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

/// The durable unit of work.
///
/// A task's persisted record and its in-memory record are kept
/// write-synchronized by [`crate::registry::TaskRegistry`]: every state
/// mutation is followed by a durable write of the full record inside the
/// same critical section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Opaque unique token, generated at creation, immutable.
    pub id: TaskId,
    /// Name of the source cluster.
    pub source_cluster: String,
    /// Path of the source table.
    pub source_table: String,
    /// Name of the destination cluster.
    pub destination_cluster: String,
    /// Path of the destination table; absent for key-value delivery routes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_table: Option<String>,
    /// Source-side credential. Persisted, never returned to callers.
    pub source_token: Secret,
    /// Destination-side credential. Persisted, never returned to callers.
    pub destination_token: Secret,
    /// Transfer direction.
    #[serde(default)]
    pub copy_method: CopyMethod,
    /// Legacy map/reduce account to run under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mr_user: Option<String>,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Identity of the submitter; `"guest"` when no credential was supplied.
    pub user: String,
    /// When the task was (re-)submitted. Orders the pending queue.
    pub creation_time: DateTime<Utc>,
    /// When the task was last admitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the task last reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,
    /// Structured failure payload, present only in the failed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
    /// Execution progress, present only once running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<TaskProgress>,
    /// Opaque caller-supplied annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl Task {
    /// Builds a pending task from a submission.
    ///
    /// Per-side credentials default to the submission-time bearer token;
    /// the legacy account defaults to the configured one.
    #[must_use]
    pub fn from_request(
        id: TaskId,
        request: TaskRequest,
        user: impl Into<String>,
        bearer: &Secret,
        default_mr_user: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            source_cluster: request.source_cluster,
            source_table: request.source_table,
            destination_cluster: request.destination_cluster,
            destination_table: request.destination_table,
            source_token: request.source_token.unwrap_or_else(|| bearer.clone()),
            destination_token: request.destination_token.unwrap_or_else(|| bearer.clone()),
            copy_method: request.copy_method.unwrap_or_default(),
            mr_user: request
                .mr_user
                .or_else(|| default_mr_user.map(str::to_string)),
            state: TaskState::Pending,
            user: user.into(),
            creation_time: now,
            start_time: None,
            finish_time: None,
            error: None,
            progress: None,
            meta: request.meta,
        }
    }

    /// Returns the task's transfer route.
    #[must_use]
    pub fn route(&self) -> Route {
        Route {
            source: self.source_cluster.clone(),
            destination: self.destination_cluster.clone(),
        }
    }

    /// Transitions to a new state, maintaining the lifecycle timestamps.
    ///
    /// Admission initializes empty progress and sets `start_time`; every
    /// terminal transition sets `finish_time`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] if the edge is not in the
    /// state machine.
    pub fn transition_to(&mut self, target: TaskState, now: DateTime<Utc>) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.state,
                to: target,
                reason: "edge is not part of the task lifecycle",
            });
        }

        match target {
            TaskState::Running => {
                self.start_time = Some(now);
                self.progress = Some(TaskProgress::default());
            }
            TaskState::Completed | TaskState::Failed | TaskState::Aborted => {
                self.finish_time = Some(now);
            }
            TaskState::Pending => {}
        }

        self.state = target;
        Ok(())
    }

    /// Resets a terminal task back to pending for re-execution.
    ///
    /// Assigns a fresh `creation_time` strictly greater than the previous
    /// one (so the task re-enters the queue at the back) and clears
    /// `start_time`, `finish_time`, `error`, and `progress`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] unless the task is in a
    /// terminal state.
    pub fn reset_for_restart(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.state.is_terminal() {
            return Err(Error::InvalidStateTransition {
                from: self.state,
                to: TaskState::Pending,
                reason: "restart requires a terminal state",
            });
        }

        self.creation_time = if now > self.creation_time {
            now
        } else {
            self.creation_time + Duration::milliseconds(1)
        };
        self.start_time = None;
        self.finish_time = None;
        self.error = None;
        self.progress = None;
        self.state = TaskState::Pending;
        Ok(())
    }

    /// Demotes a persisted `running` record to `pending` during recovery.
    ///
    /// Running state is never trusted across a restart boundary: the worker
    /// belonged to a previous process instance and cannot be reattached.
    pub(crate) fn demote_to_pending(&mut self) {
        self.state = TaskState::Pending;
        self.start_time = None;
        self.progress = None;
    }

    /// Returns the caller-facing representation with secrets elided.
    #[must_use]
    pub fn view(&self, queue_index: Option<usize>) -> TaskView {
        TaskView {
            id: self.id,
            source_cluster: self.source_cluster.clone(),
            source_table: self.source_table.clone(),
            destination_cluster: self.destination_cluster.clone(),
            destination_table: self.destination_table.clone(),
            copy_method: self.copy_method,
            mr_user: self.mr_user.clone(),
            state: self.state,
            user: self.user.clone(),
            creation_time: self.creation_time,
            start_time: self.start_time,
            finish_time: self.finish_time,
            error: self.error.clone(),
            progress: self.progress.clone(),
            meta: self.meta.clone(),
            queue_index,
        }
    }
}

/// Caller-facing task representation: the full record minus credentials,
/// plus the task's 1-based position within its own route's pending ordering.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    /// Task identifier.
    pub id: TaskId,
    /// Name of the source cluster.
    pub source_cluster: String,
    /// Path of the source table.
    pub source_table: String,
    /// Name of the destination cluster.
    pub destination_cluster: String,
    /// Path of the destination table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_table: Option<String>,
    /// Transfer direction.
    pub copy_method: CopyMethod,
    /// Legacy map/reduce account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mr_user: Option<String>,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Identity of the submitter.
    pub user: String,
    /// When the task was (re-)submitted.
    pub creation_time: DateTime<Utc>,
    /// When the task was last admitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the task last reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,
    /// Structured failure payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
    /// Execution progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<TaskProgress>,
    /// Opaque caller-supplied annotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    /// 1-based position within the task's own route's pending ordering;
    /// absent unless the task is pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_index: Option<usize>,
}
