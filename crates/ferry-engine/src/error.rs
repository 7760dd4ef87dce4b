//! Error types for the orchestration engine.
//!
//! The error taxonomy mirrors how failures are surfaced:
//!
//! - **User/request errors** (bad parameters, unknown task, permission
//!   denied, precheck rejection) map to client-error statuses in the API
//!   layer and are never retried.
//! - **Authentication errors** are a distinct subtype of user error.
//! - **Infrastructure errors** (lock not held, store unavailability) are
//!   logged and retried by the background loops.
//!
//! Execution failures are *not* represented here: they are captured into the
//! task record as [`crate::task::TaskFailure`] and the task transitions to
//! `failed`.

use ferry_core::TaskId;

use crate::task::TaskState;
use crate::validator::RejectionReason;

/// The result type used throughout ferry-engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A task was not found in the registry.
    #[error("task not found: {id}")]
    TaskNotFound {
        /// The task ID that was looked up.
        id: TaskId,
    },

    /// The request was malformed or missing required fields.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of what made the request invalid.
        message: String,
    },

    /// The supplied credential could not be resolved to a user.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the authentication failure.
        message: String,
    },

    /// The caller is not allowed to perform the operation.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the missing permission.
        message: String,
    },

    /// Precheck rejected the task.
    #[error("precheck failed: {0}")]
    Precheck(#[from] RejectionReason),

    /// An invalid state transition was attempted.
    #[error("invalid state transition: {from} -> {to} ({reason})")]
    InvalidStateTransition {
        /// The current state.
        from: TaskState,
        /// The attempted target state.
        to: TaskState,
        /// The reason the transition is invalid.
        reason: &'static str,
    },

    /// The daemon does not hold the scheduler lock and cannot serve the
    /// operation.
    #[error("daemon is standing by: scheduler lock is not held")]
    NotActive,

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },

    /// An error from ferry-core.
    #[error("core error: {0}")]
    Core(#[from] ferry_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a new invalid-request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Returns true when the error is the caller's fault and should map to a
    /// client-error status, never an automatic retry.
    ///
    /// A [`RejectionReason::MissingRelay`] precheck failure is a deployment
    /// configuration problem, not a user error.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        match self {
            Self::TaskNotFound { .. }
            | Self::InvalidRequest { .. }
            | Self::AuthenticationFailed { .. }
            | Self::PermissionDenied { .. }
            | Self::InvalidStateTransition { .. } => true,
            Self::Precheck(reason) => reason.is_user_error(),
            _ => false,
        }
    }

    /// Returns true for the authentication subtype of user errors.
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}
