//! Cluster capability abstraction for validation and route classification.
//!
//! This module provides:
//!
//! - [`ClusterKind`]: the closed set of supported cluster families
//! - [`ClusterClient`]: the capability interface the engine needs from a
//!   per-cluster SDK (existence, emptiness, schema sampling, permission
//!   predicates)
//! - [`RouteKind`]: the exhaustive classification of supported
//!   (source kind, destination kind, copy method) combinations
//! - [`ClusterSet`]: the registry of configured cluster clients
//!
//! ## Design Principles
//!
//! - **Fail closed**: an unclassifiable cluster-kind pair is a rejection,
//!   never a silent no-op
//! - **Opaque SDKs**: the engine dispatches on capabilities, not on cluster
//!   name strings
//! - **Testability**: [`memory::InMemoryClusterClient`] stands in for real
//!   SDKs in tests and development

pub mod memory;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ferry_core::Secret;

use crate::error::Result;
use crate::task::CopyMethod;

/// The closed set of cluster families Ferry can move data between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    /// Distributed tabular store (row counts, schemas, directory ACLs).
    Tabular,
    /// Legacy map/reduce storage (fixed key/subkey/value records).
    MapReduce,
    /// Key-value delivery system (destination only, fed through a relay).
    KeyValue,
}

impl fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tabular => "tabular",
            Self::MapReduce => "map_reduce",
            Self::KeyValue => "key_value",
        };
        f.write_str(name)
    }
}

/// The exhaustive classification of supported transfer combinations.
///
/// Classification is the single place that decides which cluster-kind pairs
/// the engine knows how to drive; everything else dispatches on the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// Tabular to tabular remote copy.
    TabularToTabular,
    /// Tabular to legacy storage, destination-driven.
    TabularToMapReducePull,
    /// Tabular to legacy storage, source-driven.
    TabularToMapReducePush,
    /// Legacy storage to tabular, destination-driven.
    MapReduceToTabular,
    /// Legacy storage to legacy storage native remote copy.
    MapReduceToMapReduce,
    /// Tabular to key-value delivery through the transmission relay.
    TabularToKeyValue,
}

impl RouteKind {
    /// Classifies a (source kind, destination kind, copy method) triple.
    ///
    /// Push is only meaningful for tabular -> map/reduce; every other
    /// supported pair is destination-driven. Returns `None` for combinations
    /// the engine cannot drive; callers must treat that as a rejection
    /// (fail closed).
    #[must_use]
    pub const fn classify(
        source: ClusterKind,
        destination: ClusterKind,
        method: CopyMethod,
    ) -> Option<Self> {
        match (source, destination, method) {
            (ClusterKind::Tabular, ClusterKind::Tabular, CopyMethod::Pull) => {
                Some(Self::TabularToTabular)
            }
            (ClusterKind::Tabular, ClusterKind::MapReduce, CopyMethod::Pull) => {
                Some(Self::TabularToMapReducePull)
            }
            (ClusterKind::Tabular, ClusterKind::MapReduce, CopyMethod::Push) => {
                Some(Self::TabularToMapReducePush)
            }
            (ClusterKind::MapReduce, ClusterKind::Tabular, CopyMethod::Pull) => {
                Some(Self::MapReduceToTabular)
            }
            (ClusterKind::MapReduce, ClusterKind::MapReduce, CopyMethod::Pull) => {
                Some(Self::MapReduceToMapReduce)
            }
            (ClusterKind::Tabular, ClusterKind::KeyValue, CopyMethod::Pull) => {
                Some(Self::TabularToKeyValue)
            }
            _ => None,
        }
    }

    /// Returns true when the cluster-kind pair is supported with at least
    /// one copy method.
    #[must_use]
    pub const fn pair_is_supported(source: ClusterKind, destination: ClusterKind) -> bool {
        Self::classify(source, destination, CopyMethod::Pull).is_some()
    }
}

/// The column set a legacy map/reduce record can represent.
pub const LEGACY_COLUMNS: [&str; 3] = ["key", "subkey", "value"];

/// Capability interface for a configured storage cluster.
///
/// Implementations wrap the per-cluster SDK. All predicates run against the
/// cluster with the caller-scoped credential; implementations must not cache
/// authorization decisions across credentials.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// The cluster's configured name.
    fn name(&self) -> &str;

    /// The cluster family.
    fn kind(&self) -> ClusterKind;

    /// Returns true when the table is absent or holds no data.
    ///
    /// Emptiness is cluster-family-specific: a row-count query for tabular
    /// stores, a size probe for legacy storage.
    async fn is_empty(&self, table: &str, token: &Secret) -> Result<bool>;

    /// Samples the column names of a tabular table.
    async fn sample_columns(&self, table: &str, token: &Secret) -> Result<Vec<String>>;

    /// Returns true when the directory exists.
    async fn directory_exists(&self, path: &str, token: &Secret) -> Result<bool>;

    /// Returns true when `user` may write under `path`.
    async fn check_write_permission(&self, user: &str, path: &str) -> Result<bool>;
}

/// The registry of configured cluster clients, keyed by cluster name.
#[derive(Clone, Default)]
pub struct ClusterSet {
    clusters: HashMap<String, Arc<dyn ClusterClient>>,
}

impl ClusterSet {
    /// Creates an empty cluster set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client under its own name.
    #[must_use]
    pub fn with(mut self, client: Arc<dyn ClusterClient>) -> Self {
        self.clusters.insert(client.name().to_string(), client);
        self
    }

    /// Looks up a client by cluster name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ClusterClient>> {
        self.clusters.get(name)
    }

    /// Returns the registered cluster names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clusters.keys().map(String::as_str)
    }

    /// Returns the number of registered clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Returns true when no clusters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

impl fmt::Debug for ClusterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSet")
            .field("clusters", &self.clusters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Returns the parent directory of a table path.
///
/// `//home/data/events` -> `//home/data`. A path with no separator has an
/// empty parent.
#[must_use]
pub fn parent_directory(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_supported_pairs() {
        use ClusterKind::{KeyValue, MapReduce, Tabular};

        assert_eq!(
            RouteKind::classify(Tabular, Tabular, CopyMethod::Pull),
            Some(RouteKind::TabularToTabular)
        );
        assert_eq!(
            RouteKind::classify(Tabular, MapReduce, CopyMethod::Push),
            Some(RouteKind::TabularToMapReducePush)
        );
        assert_eq!(
            RouteKind::classify(Tabular, MapReduce, CopyMethod::Pull),
            Some(RouteKind::TabularToMapReducePull)
        );
        assert_eq!(
            RouteKind::classify(MapReduce, Tabular, CopyMethod::Pull),
            Some(RouteKind::MapReduceToTabular)
        );
        assert_eq!(
            RouteKind::classify(MapReduce, MapReduce, CopyMethod::Pull),
            Some(RouteKind::MapReduceToMapReduce)
        );
        assert_eq!(
            RouteKind::classify(Tabular, KeyValue, CopyMethod::Pull),
            Some(RouteKind::TabularToKeyValue)
        );
    }

    #[test]
    fn classify_fails_closed() {
        use ClusterKind::{KeyValue, MapReduce, Tabular};

        assert_eq!(RouteKind::classify(KeyValue, Tabular, CopyMethod::Pull), None);
        assert_eq!(RouteKind::classify(KeyValue, KeyValue, CopyMethod::Pull), None);
        assert_eq!(RouteKind::classify(MapReduce, KeyValue, CopyMethod::Pull), None);
        assert!(!RouteKind::pair_is_supported(KeyValue, Tabular));
        assert!(RouteKind::pair_is_supported(Tabular, KeyValue));
    }

    #[test]
    fn push_is_only_supported_into_legacy_storage() {
        use ClusterKind::{MapReduce, Tabular};

        assert_eq!(RouteKind::classify(Tabular, Tabular, CopyMethod::Push), None);
        assert_eq!(RouteKind::classify(MapReduce, Tabular, CopyMethod::Push), None);
        assert_eq!(RouteKind::classify(MapReduce, MapReduce, CopyMethod::Push), None);
    }

    #[test]
    fn parent_directory_of_table_paths() {
        assert_eq!(parent_directory("//home/data/events"), "//home/data");
        assert_eq!(parent_directory("//home"), "/");
        assert_eq!(parent_directory("flat"), "");
    }
}
