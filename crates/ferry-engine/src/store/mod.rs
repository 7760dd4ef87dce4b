//! Pluggable durable storage for task records and the scheduler lock.
//!
//! The [`MetaStore`] trait wraps the external hierarchical metadata store:
//! one record per task keyed by id under a dedicated namespace, one
//! exclusive lock node, and discovery attributes on the lock node.
//!
//! ## Design Principles
//!
//! - **Full-record writes**: every persisted mutation writes the whole task
//!   record, last-writer-wins, so recovery only ever reads complete records
//! - **Lock, not leases**: the scheduler lock is session-scoped in the real
//!   store; holding it is what makes a daemon instance active
//! - **Testability**: [`memory::InMemoryMetaStore`] for tests and
//!   development, the real store adapter in deployment

pub mod memory;

use async_trait::async_trait;

use ferry_core::TaskId;

use crate::error::Result;
use crate::task::Task;

/// Outcome of an exclusive-lock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAttempt {
    /// This instance now holds the scheduler lock.
    Acquired,
    /// Another instance holds the lock.
    Conflict {
        /// Identifier of the current holder, if the store reports one.
        holder: Option<String>,
    },
}

impl LockAttempt {
    /// Returns true if the lock was acquired.
    #[must_use]
    pub const fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired)
    }
}

/// Storage abstraction over the external metadata store.
///
/// Writes are fast key-value puts by contract; the registry performs them
/// while holding its critical section, which keeps the persisted record and
/// the in-memory record write-synchronized.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Creates the task namespace and lock node if they are missing.
    async fn ensure_layout(&self) -> Result<()>;

    /// Reads every persisted task record.
    async fn load_tasks(&self) -> Result<Vec<Task>>;

    /// Writes a task's full record (insert or replace).
    async fn write_task(&self, task: &Task) -> Result<()>;

    /// Removes a task's record.
    ///
    /// Removing an absent record is not an error; deletion is idempotent.
    async fn remove_task(&self, id: TaskId) -> Result<()>;

    /// Attempts to take the exclusive scheduler lock for `instance_id`.
    ///
    /// Re-acquiring a lock already held by the same instance succeeds.
    async fn try_lock(&self, instance_id: &str) -> Result<LockAttempt>;

    /// Releases the scheduler lock if `instance_id` holds it.
    async fn release_lock(&self, instance_id: &str) -> Result<()>;

    /// Publishes a discovery attribute on the lock node (e.g. the active
    /// instance's network address).
    async fn set_lock_attribute(&self, key: &str, value: &str) -> Result<()>;
}
