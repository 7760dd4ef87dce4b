//! In-memory mirror of all known tasks plus its derived indices.
//!
//! All task state lives in one owned [`OrchestratorState`] aggregate behind
//! a single async mutex. The admission/supervision tick, the abort path, and
//! every service operation mutate tasks through that one critical section,
//! and every mutation performs its durable write before the guard is
//! released, so the persisted record and the in-memory record never diverge
//! observably.
//!
//! Derived indices:
//!
//! - `tasks`: id -> record
//! - `pending`: creation-time-ordered ids with state pending
//! - `running_by_route`: route -> running ids (the per-route concurrency
//!   semaphore)
//! - `workers`: id -> live worker handle

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use ferry_core::TaskId;

use crate::error::{Error, Result};
use crate::executor::WorkerHandle;
use crate::store::MetaStore;
use crate::task::{Route, Task, TaskState, TaskView};

/// The one mutable aggregate of the orchestration engine.
///
/// Obtained through [`TaskRegistry::lock`]; composite operations (a
/// supervision pass, an admission pass) hold the guard across all of their
/// in-memory mutations and durable writes.
#[derive(Debug, Default)]
pub struct OrchestratorState {
    tasks: HashMap<TaskId, Task>,
    pending: Vec<TaskId>,
    running_by_route: HashMap<Route, Vec<TaskId>>,
    workers: HashMap<TaskId, WorkerHandle>,
}

impl OrchestratorState {
    /// Looks up a task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for unknown ids.
    pub fn task(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(&id).ok_or(Error::TaskNotFound { id })
    }

    /// Looks up a task mutably.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for unknown ids.
    pub fn task_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks.get_mut(&id).ok_or(Error::TaskNotFound { id })
    }

    /// Applies a validated state transition and returns a snapshot of the
    /// record for persistence.
    ///
    /// Index maintenance (route slots, pending membership) is the caller's
    /// responsibility; the admission and supervision passes grant and
    /// release slots at well-defined points.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] or [`Error::InvalidStateTransition`].
    pub fn transition_task(
        &mut self,
        id: TaskId,
        target: TaskState,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let task = self.task_mut(id)?;
        task.transition_to(target, now)?;
        Ok(task.clone())
    }

    /// Installs a loaded record, indexing it as pending when applicable.
    ///
    /// Used by recovery and task creation.
    pub fn install(&mut self, task: Task) {
        let id = task.id;
        let is_pending = task.state == TaskState::Pending;
        self.tasks.insert(id, task);
        if is_pending {
            self.pending.push(id);
        }
    }

    /// Removes a task from the aggregate and every index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for unknown ids.
    pub fn evict(&mut self, id: TaskId) -> Result<Task> {
        let task = self.tasks.remove(&id).ok_or(Error::TaskNotFound { id })?;
        self.pending.retain(|pending| *pending != id);
        if let Some(slots) = self.running_by_route.get_mut(&task.route()) {
            slots.retain(|running| *running != id);
        }
        self.workers.remove(&id);
        Ok(task)
    }

    /// Drops pending-queue entries whose task is gone or no longer pending.
    ///
    /// Run defensively at the start of every tick.
    pub fn refilter_pending(&mut self) {
        self.pending.retain(|id| {
            self.tasks
                .get(id)
                .is_some_and(|task| task.state == TaskState::Pending)
        });
    }

    /// Appends a task to the pending queue and restores creation-time order.
    pub fn enqueue_pending(&mut self, id: TaskId) {
        self.pending.push(id);
        self.sort_pending();
    }

    /// Sorts the pending queue by creation time.
    ///
    /// The sort is stable, so same-timestamp tasks keep insertion order.
    pub fn sort_pending(&mut self) {
        let tasks = &self.tasks;
        self.pending
            .sort_by_key(|id| tasks.get(id).map(|task| task.creation_time));
    }

    /// Returns the pending ids in admission order.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<TaskId> {
        self.pending.clone()
    }

    /// Returns true when no task is running on the route.
    #[must_use]
    pub fn route_is_free(&self, route: &Route) -> bool {
        self.running_by_route
            .get(route)
            .is_none_or(|slots| slots.is_empty())
    }

    /// Grants the route's concurrency slot to a task.
    pub fn grant_route_slot(&mut self, route: Route, id: TaskId) {
        self.running_by_route.entry(route).or_default().push(id);
    }

    /// Releases the route's concurrency slot.
    ///
    /// Called exactly once per admitted task, at its terminal reconcile,
    /// under the same mutex that granted the slot.
    pub fn release_route_slot(&mut self, route: &Route, id: TaskId) {
        if let Some(slots) = self.running_by_route.get_mut(route) {
            slots.retain(|running| *running != id);
        }
    }

    /// Attaches a spawned worker handle.
    pub fn insert_worker(&mut self, id: TaskId, handle: WorkerHandle) {
        self.workers.insert(id, handle);
    }

    /// Detaches a worker handle.
    pub fn remove_worker(&mut self, id: TaskId) {
        self.workers.remove(&id);
    }

    /// Returns the ids that currently have a live worker handle.
    #[must_use]
    pub fn worker_ids(&self) -> Vec<TaskId> {
        self.workers.keys().copied().collect()
    }

    /// Returns a worker handle.
    #[must_use]
    pub fn worker(&self, id: TaskId) -> Option<&WorkerHandle> {
        self.workers.get(&id)
    }

    /// Returns a worker handle mutably.
    #[must_use]
    pub fn worker_mut(&mut self, id: TaskId) -> Option<&mut WorkerHandle> {
        self.workers.get_mut(&id)
    }

    /// Returns the number of live workers.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.workers.len()
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Computes a pending task's 1-based position within its own route's
    /// ordering.
    ///
    /// A task currently running on the route occupies the positions ahead
    /// of every queued one: the task behind a single running transfer
    /// reports `queue_index = 2` until that transfer reaches a terminal
    /// state. Returns `None` for tasks that are not queued.
    #[must_use]
    pub fn queue_index(&self, id: TaskId) -> Option<usize> {
        let route = self.tasks.get(&id)?.route();
        let mut index = self.running_by_route.get(&route).map_or(0, Vec::len);
        for pending in &self.pending {
            let Some(task) = self.tasks.get(pending) else {
                continue;
            };
            if task.route() == route {
                index += 1;
            }
            if *pending == id {
                return Some(index);
            }
        }
        None
    }

    /// Builds the caller-facing view of a task.
    #[must_use]
    pub fn view(&self, task: &Task) -> TaskView {
        task.view(self.queue_index(task.id))
    }
}

/// The durable task registry: one critical section shared by the admission
/// tick, the executor's supervision, and the service operations.
pub struct TaskRegistry {
    state: Mutex<OrchestratorState>,
    store: Arc<dyn MetaStore>,
}

impl TaskRegistry {
    /// Creates an empty registry over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MetaStore>) -> Self {
        Self {
            state: Mutex::new(OrchestratorState::default()),
            store,
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn MetaStore> {
        Arc::clone(&self.store)
    }

    /// Acquires the engine-wide critical section.
    ///
    /// Lock order: never call back into the store from outside the guard
    /// while composing with other locks; durable writes happen while the
    /// guard is held, and the guard is the only lock the engine takes.
    pub async fn lock(&self) -> MutexGuard<'_, OrchestratorState> {
        self.state.lock().await
    }

    /// Durably writes a task's full record.
    ///
    /// Call while holding the guard that performed the mutation.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn persist(&self, task: &Task) -> Result<()> {
        self.store.write_task(task).await
    }

    /// Registers a new task and persists it.
    ///
    /// # Errors
    ///
    /// Returns an internal error on id collision, or a store failure.
    pub async fn create(&self, task: Task) -> Result<()> {
        let mut state = self.lock().await;
        if state.task(task.id).is_ok() {
            return Err(Error::internal(format!(
                "task id collision: {} already exists",
                task.id
            )));
        }
        self.store.write_task(&task).await?;
        state.install(task);
        state.sort_pending();
        Ok(())
    }

    /// Returns a copy of a task's record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for unknown ids.
    pub async fn get(&self, id: TaskId) -> Result<Task> {
        let state = self.lock().await;
        state.task(id).cloned()
    }

    /// Returns the caller-facing view of a task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for unknown ids.
    pub async fn get_view(&self, id: TaskId) -> Result<TaskView> {
        let state = self.lock().await;
        let task = state.task(id)?;
        Ok(state.view(task))
    }

    /// Returns views of all tasks, optionally filtered by owner, in
    /// creation-time order.
    pub async fn list_views(&self, user: Option<&str>) -> Vec<TaskView> {
        let state = self.lock().await;
        let mut tasks: Vec<&Task> = state
            .tasks
            .values()
            .filter(|task| user.is_none_or(|user| task.user == user))
            .collect();
        tasks.sort_by_key(|task| (task.creation_time, task.id));
        tasks.into_iter().map(|task| state.view(task)).collect()
    }

    /// Applies a validated state transition and persists the full record in
    /// the same critical section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`], [`Error::InvalidStateTransition`],
    /// or a store failure.
    pub async fn set_state(
        &self,
        id: TaskId,
        target: TaskState,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let mut state = self.lock().await;
        let snapshot = state.transition_task(id, target, now)?;
        self.store.write_task(&snapshot).await?;
        Ok(snapshot)
    }

    /// Replaces a task's record wholesale and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for unknown ids, or a store failure.
    pub async fn update(&self, task: Task) -> Result<()> {
        let mut state = self.lock().await;
        state.task(task.id)?;
        self.store.write_task(&task).await?;
        state.tasks.insert(task.id, task);
        Ok(())
    }

    /// Removes a task from the store and every in-memory index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for unknown ids, or a store failure.
    pub async fn remove(&self, id: TaskId) -> Result<Task> {
        let mut state = self.lock().await;
        state.task(id)?;
        self.store.remove_task(id).await?;
        state.evict(id)
    }
}
