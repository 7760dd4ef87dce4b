//! In-memory cluster client for testing and development.
//!
//! This module provides [`InMemoryClusterClient`], a fixture-backed
//! implementation of the [`ClusterClient`] trait.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No real cluster is contacted
//! - **Fixture-driven**: Tables, directories, and grants are whatever the
//!   test (or the development wiring in `ferryd`) declares

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use ferry_core::Secret;

use super::{ClusterClient, ClusterKind};
use crate::error::{Error, Result};

/// A fixture table.
#[derive(Debug, Clone)]
struct TableFixture {
    row_count: u64,
    columns: Vec<String>,
}

#[derive(Debug, Default)]
struct Fixtures {
    tables: HashMap<String, TableFixture>,
    directories: HashSet<String>,
    /// (directory, user) pairs allowed to write.
    writers: HashSet<(String, String)>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// In-memory cluster client for tests and development.
///
/// Fixtures can be declared at construction time with the builder methods
/// and mutated afterwards to simulate state drift between submission-time
/// and execution-time prechecks (a dropped table, a revoked grant).
///
/// ## Example
///
/// ```rust
/// use ferry_engine::cluster::memory::InMemoryClusterClient;
/// use ferry_engine::cluster::ClusterKind;
///
/// let alpha = InMemoryClusterClient::new("alpha", ClusterKind::Tabular)
///     .with_table("//home/data/events", 42, &["key", "value"])
///     .with_directory("//home/data")
///     .allow_write("//home/data", "alice");
/// ```
#[derive(Debug)]
pub struct InMemoryClusterClient {
    name: String,
    kind: ClusterKind,
    fixtures: RwLock<Fixtures>,
}

impl InMemoryClusterClient {
    /// Creates a client with no fixtures.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ClusterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fixtures: RwLock::new(Fixtures::default()),
        }
    }

    /// Declares a table with the given row count and columns.
    ///
    /// # Panics
    ///
    /// Panics if the fixture lock is poisoned (test-only type).
    #[must_use]
    pub fn with_table(self, path: impl Into<String>, row_count: u64, columns: &[&str]) -> Self {
        self.fixtures.write().unwrap().tables.insert(
            path.into(),
            TableFixture {
                row_count,
                columns: columns.iter().map(ToString::to_string).collect(),
            },
        );
        self
    }

    /// Declares an existing directory.
    ///
    /// # Panics
    ///
    /// Panics if the fixture lock is poisoned (test-only type).
    #[must_use]
    pub fn with_directory(self, path: impl Into<String>) -> Self {
        self.fixtures.write().unwrap().directories.insert(path.into());
        self
    }

    /// Grants `user` write access under `path`.
    ///
    /// # Panics
    ///
    /// Panics if the fixture lock is poisoned (test-only type).
    #[must_use]
    pub fn allow_write(self, path: impl Into<String>, user: impl Into<String>) -> Self {
        self.fixtures
            .write()
            .unwrap()
            .writers
            .insert((path.into(), user.into()));
        self
    }

    /// Revokes a previously declared write grant, simulating permission
    /// drift between submission and execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the fixture lock is poisoned.
    pub fn revoke_write(&self, path: &str, user: &str) -> Result<()> {
        self.fixtures
            .write()
            .map_err(poison_err)?
            .writers
            .remove(&(path.to_string(), user.to_string()));
        Ok(())
    }

    /// Overwrites a table's row count, simulating data drift.
    ///
    /// # Errors
    ///
    /// Returns an error if the fixture lock is poisoned or the table is not
    /// declared.
    pub fn set_row_count(&self, path: &str, row_count: u64) -> Result<()> {
        let mut fixtures = self.fixtures.write().map_err(poison_err)?;
        let table = fixtures
            .tables
            .get_mut(path)
            .ok_or_else(|| Error::internal(format!("fixture table {path} is not declared")))?;
        table.row_count = row_count;
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for InMemoryClusterClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClusterKind {
        self.kind
    }

    async fn is_empty(&self, table: &str, _token: &Secret) -> Result<bool> {
        let fixtures = self.fixtures.read().map_err(poison_err)?;
        Ok(fixtures
            .tables
            .get(table)
            .is_none_or(|fixture| fixture.row_count == 0))
    }

    async fn sample_columns(&self, table: &str, _token: &Secret) -> Result<Vec<String>> {
        let fixtures = self.fixtures.read().map_err(poison_err)?;
        fixtures
            .tables
            .get(table)
            .map(|fixture| fixture.columns.clone())
            .ok_or_else(|| Error::storage(format!("table {table} does not exist")))
    }

    async fn directory_exists(&self, path: &str, _token: &Secret) -> Result<bool> {
        let fixtures = self.fixtures.read().map_err(poison_err)?;
        Ok(fixtures.directories.contains(path))
    }

    async fn check_write_permission(&self, user: &str, path: &str) -> Result<bool> {
        let fixtures = self.fixtures.read().map_err(poison_err)?;
        Ok(fixtures
            .writers
            .contains(&(path.to_string(), user.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_table_counts_as_empty() {
        let client = InMemoryClusterClient::new("alpha", ClusterKind::Tabular);
        assert!(client.is_empty("//no/such", &Secret::default()).await.unwrap());
    }

    #[tokio::test]
    async fn declared_table_reports_fixture_state() {
        let client = InMemoryClusterClient::new("alpha", ClusterKind::Tabular)
            .with_table("//home/t", 3, &["key", "value"]);
        let token = Secret::default();

        assert!(!client.is_empty("//home/t", &token).await.unwrap());
        assert_eq!(
            client.sample_columns("//home/t", &token).await.unwrap(),
            vec!["key", "value"]
        );

        client.set_row_count("//home/t", 0).unwrap();
        assert!(client.is_empty("//home/t", &token).await.unwrap());
    }

    #[tokio::test]
    async fn write_grants_can_be_revoked() {
        let client = InMemoryClusterClient::new("alpha", ClusterKind::Tabular)
            .with_directory("//home")
            .allow_write("//home", "alice");

        assert!(client.check_write_permission("alice", "//home").await.unwrap());
        client.revoke_write("//home", "alice").unwrap();
        assert!(!client.check_write_permission("alice", "//home").await.unwrap());
    }
}
