//! In-memory metadata store for testing and development.
//!
//! This module provides [`InMemoryMetaStore`], a simple in-memory
//! implementation of the [`MetaStore`] trait.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, no cross-process lock
//! - **Single-process only**: The "exclusive" lock only excludes instances
//!   sharing this store object

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use ferry_core::TaskId;

use super::{LockAttempt, MetaStore};
use crate::error::{Error, Result};
use crate::task::Task;

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<TaskId, Task>,
    lock_holder: Option<String>,
    attributes: HashMap<String, String>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// In-memory metadata store for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryMetaStore {
    inner: RwLock<Inner>,
}

impl InMemoryMetaStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record directly, bypassing the registry.
    ///
    /// Used by recovery tests to stage the records a previous process
    /// instance would have left behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn seed_task(&self, task: Task) -> Result<()> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        inner.tasks.insert(task.id, task);
        Ok(())
    }

    /// Returns the number of persisted records.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn task_count(&self) -> Result<usize> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.tasks.len())
    }

    /// Returns a persisted record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn persisted_task(&self, id: TaskId) -> Result<Option<Task>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.tasks.get(&id).cloned())
    }

    /// Returns the current lock holder.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn lock_holder(&self) -> Result<Option<String>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.lock_holder.clone())
    }

    /// Returns a lock-node attribute.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn lock_attribute(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.attributes.get(key).cloned())
    }
}

#[async_trait]
impl MetaStore for InMemoryMetaStore {
    async fn ensure_layout(&self) -> Result<()> {
        Ok(())
    }

    async fn load_tasks(&self) -> Result<Vec<Task>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.tasks.values().cloned().collect())
    }

    async fn write_task(&self, task: &Task) -> Result<()> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        inner.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn remove_task(&self, id: TaskId) -> Result<()> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        inner.tasks.remove(&id);
        Ok(())
    }

    async fn try_lock(&self, instance_id: &str) -> Result<LockAttempt> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        match &inner.lock_holder {
            Some(holder) if holder != instance_id => Ok(LockAttempt::Conflict {
                holder: Some(holder.clone()),
            }),
            _ => {
                inner.lock_holder = Some(instance_id.to_string());
                Ok(LockAttempt::Acquired)
            }
        }
    }

    async fn release_lock(&self, instance_id: &str) -> Result<()> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        if inner.lock_holder.as_deref() == Some(instance_id) {
            inner.lock_holder = None;
        }
        Ok(())
    }

    async fn set_lock_attribute(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        inner.attributes.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ferry_core::Secret;

    use crate::task::{TaskRequest, TaskState};

    fn task() -> Task {
        Task::from_request(
            TaskId::generate(),
            TaskRequest {
                source_cluster: "alpha".into(),
                source_table: "//home/t".into(),
                destination_cluster: "beta".into(),
                destination_table: Some("//home/t_copy".into()),
                source_token: None,
                destination_token: None,
                copy_method: None,
                mr_user: None,
                meta: None,
            },
            "alice",
            &Secret::default(),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn records_round_trip() {
        let store = InMemoryMetaStore::new();
        let task = task();
        store.write_task(&task).await.unwrap();

        let loaded = store.load_tasks().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, task.id);
        assert_eq!(loaded[0].state, TaskState::Pending);

        store.remove_task(task.id).await.unwrap();
        assert_eq!(store.task_count().unwrap(), 0);
        // Idempotent removal.
        store.remove_task(task.id).await.unwrap();
    }

    #[tokio::test]
    async fn lock_excludes_other_instances() {
        let store = InMemoryMetaStore::new();

        assert!(store.try_lock("a").await.unwrap().is_acquired());
        // Re-entrant for the same instance.
        assert!(store.try_lock("a").await.unwrap().is_acquired());

        let attempt = store.try_lock("b").await.unwrap();
        assert_eq!(
            attempt,
            LockAttempt::Conflict {
                holder: Some("a".into())
            }
        );

        // Releasing someone else's lock is a no-op.
        store.release_lock("b").await.unwrap();
        assert_eq!(store.lock_holder().unwrap().as_deref(), Some("a"));

        store.release_lock("a").await.unwrap();
        assert!(store.try_lock("b").await.unwrap().is_acquired());
    }

    #[tokio::test]
    async fn lock_attributes_are_stored() {
        let store = InMemoryMetaStore::new();
        store.set_lock_attribute("address", "host:5010").await.unwrap();
        assert_eq!(
            store.lock_attribute("address").unwrap().as_deref(),
            Some("host:5010")
        );
    }
}
