//! The operation surface exposed to the network API layer.
//!
//! [`TransferService`] methods correspond 1:1 to the HTTP endpoints the
//! (out-of-scope) API layer serves:
//!
//! | Endpoint | Method |
//! |----------|--------|
//! | `POST /tasks/` | [`TransferService::create`] |
//! | `GET /tasks/` | [`TransferService::list`] |
//! | `GET /tasks/{id}/` | [`TransferService::get`] |
//! | `DELETE /tasks/{id}/` | [`TransferService::delete`] |
//! | `POST /tasks/{id}/abort/` | [`TransferService::abort`] |
//! | `POST /tasks/{id}/restart/` | [`TransferService::restart`] |
//! | `GET /ping/` | [`TransferService::ping`] |
//! | `GET /config/` | [`TransferService::config_view`] |
//!
//! The API layer hands in the raw bearer token (if any); the service
//! resolves it to an identity, falls back to the anonymous guest identity,
//! and enforces same-user-or-admin on the per-task operations. All
//! operations except ping and config require the scheduler lock to be held.

use std::sync::Arc;

use chrono::Utc;

use ferry_core::{Secret, TaskId};

use crate::auth::AccessController;
use crate::config::{Config, ConfigView};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::lock::ActiveFlag;
use crate::registry::TaskRegistry;
use crate::task::{Task, TaskRequest, TaskView};
use crate::validator::Validator;

/// The identity a request is made under.
#[derive(Debug, Clone)]
struct CallerIdentity {
    user: String,
    token: Secret,
}

/// User identity assumed when no credential is supplied.
const GUEST_USER: &str = "guest";

/// Task CRUD operations for the network API layer.
pub struct TransferService {
    registry: Arc<TaskRegistry>,
    validator: Arc<Validator>,
    executor: Arc<Executor>,
    access: Arc<dyn AccessController>,
    active: ActiveFlag,
    config: Arc<Config>,
}

impl TransferService {
    /// Wires the service over the engine's components.
    #[must_use]
    pub fn new(
        registry: Arc<TaskRegistry>,
        validator: Arc<Validator>,
        executor: Arc<Executor>,
        access: Arc<dyn AccessController>,
        active: ActiveFlag,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry,
            validator,
            executor,
            access,
            active,
            config,
        }
    }

    /// Submits a transfer task.
    ///
    /// Runs the full precheck synchronously so that infeasible requests are
    /// rejected immediately and never create persisted state. With
    /// `dry_run`, precheck runs and nothing is mutated; the generated id is
    /// still returned.
    ///
    /// # Errors
    ///
    /// Returns user errors for malformed requests and precheck rejections,
    /// [`Error::NotActive`] while standing by, or store failures.
    pub async fn create(
        &self,
        request: TaskRequest,
        bearer: Option<&str>,
        dry_run: bool,
    ) -> Result<TaskId> {
        self.require_active()?;
        let caller = self.authenticate(bearer).await?;
        validate_request(&request)?;

        let id = TaskId::generate();
        let task = Task::from_request(
            id,
            request,
            caller.user,
            &caller.token,
            self.config.default_mr_user.as_deref(),
            Utc::now(),
        );

        self.validator.precheck(&task).await?;

        if dry_run {
            tracing::info!(task_id = %id, "dry run passed precheck");
            return Ok(id);
        }

        self.registry.create(task).await?;
        tracing::info!(task_id = %id, "task accepted");
        Ok(id)
    }

    /// Lists all tasks, optionally filtered by owner, with secrets elided
    /// and per-route queue positions attached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotActive`] while standing by.
    pub async fn list(&self, user: Option<&str>) -> Result<Vec<TaskView>> {
        self.require_active()?;
        Ok(self.registry.list_views(user).await)
    }

    /// Fetches one task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for unknown ids or
    /// [`Error::NotActive`] while standing by.
    pub async fn get(&self, id: TaskId) -> Result<TaskView> {
        self.require_active()?;
        self.registry.get_view(id).await
    }

    /// Deletes a terminal task: removes the persisted record and the
    /// in-memory entry.
    ///
    /// # Errors
    ///
    /// Returns a user error when the task is not terminal or the caller is
    /// not the owner or an admin.
    pub async fn delete(&self, id: TaskId, bearer: Option<&str>) -> Result<()> {
        self.require_active()?;
        let task = self.registry.get(id).await?;
        self.authorize(&task, bearer).await?;

        if !task.state.is_terminal() {
            return Err(Error::invalid_request(format!(
                "cannot delete task {id} in state {}",
                task.state
            )));
        }

        self.registry.remove(id).await?;
        tracing::info!(task_id = %id, "task deleted");
        Ok(())
    }

    /// Aborts a task. Idempotent: aborting an already-terminal task is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns a user error when the caller is not the owner or an admin.
    pub async fn abort(&self, id: TaskId, bearer: Option<&str>) -> Result<()> {
        self.require_active()?;
        let task = self.registry.get(id).await?;
        self.authorize(&task, bearer).await?;
        self.executor.abort(&self.registry, id).await
    }

    /// Resubmits a terminal task: back to pending with a fresh creation
    /// time and cleared error/progress/finish time.
    ///
    /// Precheck is intentionally not re-run here; the worker re-validates
    /// immediately before execution, so a stale task fails at that point
    /// rather than at restart.
    ///
    /// # Errors
    ///
    /// Returns a user error when the task is not terminal or the caller is
    /// not the owner or an admin.
    pub async fn restart(&self, id: TaskId, bearer: Option<&str>) -> Result<()> {
        self.require_active()?;
        let task = self.registry.get(id).await?;
        self.authorize(&task, bearer).await?;

        let mut state = self.registry.lock().await;
        let record = state.task_mut(id)?;
        record.reset_for_restart(Utc::now())?;
        let snapshot = record.clone();
        self.registry.persist(&snapshot).await?;
        state.enqueue_pending(id);
        tracing::info!(task_id = %id, "task restarted");
        Ok(())
    }

    /// Liveness probe, independent of lock status.
    #[must_use]
    pub fn ping(&self) -> &'static str {
        "OK"
    }

    /// Returns the static configuration for caller discovery.
    #[must_use]
    pub fn config_view(&self) -> ConfigView {
        self.config.view()
    }

    /// Returns true while this instance holds the scheduler lock.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_active()
    }

    fn require_active(&self) -> Result<()> {
        if self.active.is_active() {
            Ok(())
        } else {
            Err(Error::NotActive)
        }
    }

    /// Resolves the bearer token to an identity, defaulting to guest.
    async fn authenticate(&self, bearer: Option<&str>) -> Result<CallerIdentity> {
        let Some(raw) = bearer else {
            return Ok(CallerIdentity {
                user: GUEST_USER.to_string(),
                token: Secret::default(),
            });
        };
        let token = Secret::new(raw);
        match self.access.resolve_user(&token).await? {
            Some(user) => Ok(CallerIdentity { user, token }),
            None => Err(Error::AuthenticationFailed {
                message: "authorization token is not recognized".into(),
            }),
        }
    }

    /// Same-user-or-admin check for the per-task operations.
    async fn authorize(&self, task: &Task, bearer: Option<&str>) -> Result<()> {
        let caller = self.authenticate(bearer).await?;
        if caller.user == task.user || self.access.is_admin(&caller.user).await? {
            Ok(())
        } else {
            Err(Error::PermissionDenied {
                message: format!("task {} belongs to {}", task.id, task.user),
            })
        }
    }
}

/// Request-shape validation that precedes precheck.
fn validate_request(request: &TaskRequest) -> Result<()> {
    for (field, value) in [
        ("source_cluster", &request.source_cluster),
        ("source_table", &request.source_table),
        ("destination_cluster", &request.destination_cluster),
    ] {
        if value.is_empty() {
            return Err(Error::invalid_request(format!(
                "required parameter {field} is missing"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_required_fields_are_rejected() {
        let request = TaskRequest {
            source_cluster: String::new(),
            source_table: "//home/t".into(),
            destination_cluster: "beta".into(),
            destination_table: None,
            source_token: None,
            destination_token: None,
            copy_method: None,
            mr_user: None,
            meta: None,
        };
        let err = validate_request(&request).unwrap_err();
        assert!(err.to_string().contains("source_cluster"));
    }
}
