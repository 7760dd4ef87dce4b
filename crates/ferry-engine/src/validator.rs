//! Precheck: feasibility validation before a task is accepted and again
//! before it is executed.
//!
//! Checks run in a fixed order and short-circuit on the first failure:
//!
//! 1. Route classification: both clusters registered, destination reachable
//!    in the availability graph, cluster-kind pair supported, copy method
//!    supported for the pair
//! 2. Source non-emptiness (cluster-family-specific probe)
//! 3. Schema subset check for transfers into legacy storage
//! 4. Destination directory existence and write permission for tabular
//!    destinations
//! 5. Relay presence for key-value delivery destinations
//!
//! Rejections are the closed [`RejectionReason`] enumeration so that callers
//! branch on variants, never on message strings. Infrastructure failures
//! (store or SDK I/O) surface as ordinary engine errors, distinct from
//! rejections.

use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::AccessController;
use crate::cluster::{
    parent_directory, ClusterClient, ClusterKind, ClusterSet, RouteKind, LEGACY_COLUMNS,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::task::{CopyMethod, Task};

/// Why precheck rejected a task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionReason {
    /// The copy method is not supported for the route's cluster-kind pair.
    #[error("copy method {method} is not supported for route {source_cluster} -> {destination}")]
    InvalidMethod {
        /// The requested method.
        method: CopyMethod,
        /// Source cluster name.
        source_cluster: String,
        /// Destination cluster name.
        destination: String,
    },

    /// The route is not present in the availability graph, or the engine
    /// cannot drive the cluster-kind pair.
    #[error("cluster {destination} is not available from {source_cluster}")]
    UnknownRoute {
        /// Source cluster name.
        source_cluster: String,
        /// Destination cluster name.
        destination: String,
    },

    /// The source table is missing or holds no data.
    #[error("source table {table} is empty")]
    EmptySource {
        /// The probed table path.
        table: String,
    },

    /// The source columns cannot be represented in legacy storage.
    #[error("columns of {table} must be a subset of (key, subkey, value); found {columns:?}")]
    SchemaMismatch {
        /// The sampled table path.
        table: String,
        /// The sampled column names.
        columns: Vec<String>,
    },

    /// The destination identity may not write to the destination directory.
    #[error("no permission to write to {path}; please log in or request access")]
    PermissionDenied {
        /// The directory the write permission was checked on.
        path: String,
    },

    /// No transmission relay is configured for key-value delivery.
    ///
    /// This is a deployment configuration error, not a user error.
    #[error("transmission relay for key-value delivery is not configured")]
    MissingRelay,
}

impl RejectionReason {
    /// Returns true when the rejection is the submitter's fault.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        !matches!(self, Self::MissingRelay)
    }
}

/// Runs route-reachability, emptiness, schema, and permission checks.
pub struct Validator {
    clusters: ClusterSet,
    availability_graph: HashMap<String, Vec<String>>,
    relay_configured: bool,
    access: Arc<dyn AccessController>,
}

impl Validator {
    /// Creates a validator over the configured clusters and graph.
    #[must_use]
    pub fn new(clusters: ClusterSet, config: &Config, access: Arc<dyn AccessController>) -> Self {
        Self {
            clusters,
            availability_graph: config.availability_graph.clone(),
            relay_configured: config.relay.is_some(),
            access,
        }
    }

    /// Classifies the task's route, rejecting unknown clusters, unreachable
    /// destinations, unsupported pairs, and unsupported methods.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precheck`] with [`RejectionReason::UnknownRoute`] or
    /// [`RejectionReason::InvalidMethod`].
    pub fn route_kind(&self, task: &Task) -> Result<RouteKind> {
        let (source, destination) = self.route_clients(task)?;

        let reachable = self
            .availability_graph
            .get(&task.source_cluster)
            .is_some_and(|destinations| destinations.contains(&task.destination_cluster));
        if !reachable || !RouteKind::pair_is_supported(source.kind(), destination.kind()) {
            return Err(self.unknown_route(task));
        }

        RouteKind::classify(source.kind(), destination.kind(), task.copy_method).ok_or_else(|| {
            Error::Precheck(RejectionReason::InvalidMethod {
                method: task.copy_method,
                source_cluster: task.source_cluster.clone(),
                destination: task.destination_cluster.clone(),
            })
        })
    }

    /// Runs the full precheck.
    ///
    /// Invoked synchronously at submission time, and again inside the worker
    /// immediately before execution to catch state drift (revoked
    /// permissions, dropped tables) between submission and scheduling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precheck`] for rejections and other variants for
    /// infrastructure failures encountered while probing.
    pub async fn precheck(&self, task: &Task) -> Result<()> {
        let kind = self.route_kind(task)?;
        let (source, destination) = self.route_clients(task)?;

        if destination.kind() != ClusterKind::KeyValue && task.destination_table.is_none() {
            return Err(Error::invalid_request(format!(
                "destination_table is required for {} destinations",
                destination.kind()
            )));
        }

        if source
            .is_empty(&task.source_table, &task.source_token)
            .await?
        {
            return Err(Error::Precheck(RejectionReason::EmptySource {
                table: task.source_table.clone(),
            }));
        }

        if matches!(
            kind,
            RouteKind::TabularToMapReducePull | RouteKind::TabularToMapReducePush
        ) {
            let columns = source
                .sample_columns(&task.source_table, &task.source_token)
                .await?;
            let representable = columns
                .iter()
                .all(|column| LEGACY_COLUMNS.contains(&column.as_str()));
            if !representable {
                return Err(Error::Precheck(RejectionReason::SchemaMismatch {
                    table: task.source_table.clone(),
                    columns,
                }));
            }
        }

        if destination.kind() == ClusterKind::Tabular {
            self.check_tabular_destination(task, destination).await?;
        }

        if destination.kind() == ClusterKind::KeyValue && !self.relay_configured {
            return Err(Error::Precheck(RejectionReason::MissingRelay));
        }

        Ok(())
    }

    async fn check_tabular_destination(
        &self,
        task: &Task,
        destination: &Arc<dyn ClusterClient>,
    ) -> Result<()> {
        let table = task.destination_table.as_deref().ok_or_else(|| {
            Error::invalid_request("destination_table is required for tabular destinations")
        })?;
        let directory = parent_directory(table);

        if !destination
            .directory_exists(directory, &task.destination_token)
            .await?
        {
            return Err(Error::invalid_request(format!(
                "destination directory {directory} does not exist"
            )));
        }

        let Some(user) = self.access.resolve_user(&task.destination_token).await? else {
            return Err(Error::Precheck(RejectionReason::PermissionDenied {
                path: directory.to_string(),
            }));
        };
        if !destination.check_write_permission(&user, directory).await? {
            return Err(Error::Precheck(RejectionReason::PermissionDenied {
                path: directory.to_string(),
            }));
        }
        Ok(())
    }

    fn route_clients(&self, task: &Task) -> Result<(&Arc<dyn ClusterClient>, &Arc<dyn ClusterClient>)> {
        let source = self
            .clusters
            .get(&task.source_cluster)
            .ok_or_else(|| self.unknown_route(task))?;
        let destination = self
            .clusters
            .get(&task.destination_cluster)
            .ok_or_else(|| self.unknown_route(task))?;
        Ok((source, destination))
    }

    fn unknown_route(&self, task: &Task) -> Error {
        Error::Precheck(RejectionReason::UnknownRoute {
            source_cluster: task.source_cluster.clone(),
            destination: task.destination_cluster.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ferry_core::{Secret, TaskId};

    use crate::auth::StaticAccessController;
    use crate::cluster::memory::InMemoryClusterClient;
    use crate::config::{ClusterConfig, RelayConfig};
    use crate::task::TaskRequest;

    fn fixture() -> (Validator, Arc<InMemoryClusterClient>) {
        let alpha = Arc::new(
            InMemoryClusterClient::new("alpha", ClusterKind::Tabular)
                .with_table("//home/data/events", 100, &["key", "value"])
                .with_table("//home/data/empty", 0, &["key"])
                .with_table("//home/data/wide", 5, &["key", "value", "extra"])
                .with_directory("//home/data")
                .allow_write("//home/data", "alice"),
        );
        let gamma = Arc::new(
            InMemoryClusterClient::new("gamma", ClusterKind::Tabular)
                .with_directory("//home/data")
                .allow_write("//home/data", "alice"),
        );
        let beta = Arc::new(InMemoryClusterClient::new("beta", ClusterKind::MapReduce));
        let kv = Arc::new(InMemoryClusterClient::new("kv", ClusterKind::KeyValue));

        let clusters = ClusterSet::new()
            .with(alpha)
            .with(gamma.clone())
            .with(beta)
            .with(kv);

        let mut config = Config::default();
        for name in ["alpha", "gamma", "beta", "kv"] {
            let kind = match name {
                "beta" => ClusterKind::MapReduce,
                "kv" => ClusterKind::KeyValue,
                _ => ClusterKind::Tabular,
            };
            config.clusters.insert(
                name.to_string(),
                ClusterConfig {
                    kind,
                    options: serde_json::Value::Null,
                },
            );
        }
        config.availability_graph.insert(
            "alpha".into(),
            vec!["gamma".into(), "beta".into(), "kv".into()],
        );
        config
            .availability_graph
            .insert("beta".into(), vec!["alpha".into()]);
        config.relay = Some(RelayConfig {
            proxy: "relay.example.net".into(),
            token: None,
        });

        let access = Arc::new(StaticAccessController::new().with_user("tok-alice", "alice"));
        (Validator::new(clusters, &config, access), gamma)
    }

    fn task(source: &str, table: &str, destination: &str, dest_table: Option<&str>) -> Task {
        Task::from_request(
            TaskId::generate(),
            TaskRequest {
                source_cluster: source.into(),
                source_table: table.into(),
                destination_cluster: destination.into(),
                destination_table: dest_table.map(Into::into),
                source_token: None,
                destination_token: None,
                copy_method: None,
                mr_user: None,
                meta: None,
            },
            "alice",
            &Secret::new("tok-alice"),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn accepts_a_feasible_task() {
        let (validator, _) = fixture();
        let task = task(
            "alpha",
            "//home/data/events",
            "gamma",
            Some("//home/data/events_copy"),
        );
        validator.precheck(&task).await.unwrap();
        assert_eq!(
            validator.route_kind(&task).unwrap(),
            RouteKind::TabularToTabular
        );
    }

    #[tokio::test]
    async fn rejects_unreachable_route() {
        let (validator, _) = fixture();
        // gamma has no outgoing edges in the graph.
        let task = task(
            "gamma",
            "//home/data/events",
            "alpha",
            Some("//home/data/x"),
        );
        let err = validator.precheck(&task).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Precheck(RejectionReason::UnknownRoute { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_unknown_cluster() {
        let (validator, _) = fixture();
        let task = task("alpha", "//home/data/events", "ghost", Some("//x/y"));
        let err = validator.precheck(&task).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Precheck(RejectionReason::UnknownRoute { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_unsupported_method() {
        let (validator, _) = fixture();
        let mut task = task(
            "alpha",
            "//home/data/events",
            "gamma",
            Some("//home/data/copy"),
        );
        task.copy_method = CopyMethod::Push;
        let err = validator.precheck(&task).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Precheck(RejectionReason::InvalidMethod { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_empty_source() {
        let (validator, _) = fixture();
        let task_empty = task(
            "alpha",
            "//home/data/empty",
            "gamma",
            Some("//home/data/copy"),
        );
        let err = validator.precheck(&task_empty).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Precheck(RejectionReason::EmptySource { .. })
        ));

        // A missing table counts as empty, not as a distinct error.
        let task_missing = task(
            "alpha",
            "//home/data/missing",
            "gamma",
            Some("//home/data/copy"),
        );
        let err = validator.precheck(&task_missing).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Precheck(RejectionReason::EmptySource { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_wide_schema_into_legacy_storage() {
        let (validator, _) = fixture();
        let task = task("alpha", "//home/data/wide", "beta", Some("users/copy"));
        let err = validator.precheck(&task).await.unwrap_err();
        let Error::Precheck(RejectionReason::SchemaMismatch { columns, .. }) = err else {
            panic!("expected schema mismatch, got {err}");
        };
        assert!(columns.contains(&"extra".to_string()));
    }

    #[tokio::test]
    async fn narrow_schema_is_accepted_into_legacy_storage() {
        let (validator, _) = fixture();
        let task = task("alpha", "//home/data/events", "beta", Some("users/copy"));
        validator.precheck(&task).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_missing_destination_directory() {
        let (validator, _) = fixture();
        let task = task(
            "alpha",
            "//home/data/events",
            "gamma",
            Some("//no/such/place"),
        );
        let err = validator.precheck(&task).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn rejects_unresolvable_destination_token() {
        let (validator, _) = fixture();
        let mut task = task(
            "alpha",
            "//home/data/events",
            "gamma",
            Some("//home/data/copy"),
        );
        task.destination_token = Secret::new("unknown-token");
        let err = validator.precheck(&task).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Precheck(RejectionReason::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_write_permission_revoked_after_submission() {
        let (validator, gamma) = fixture();
        let task = task(
            "alpha",
            "//home/data/events",
            "gamma",
            Some("//home/data/copy"),
        );
        // Passes at submission time.
        validator.precheck(&task).await.unwrap();

        // The grant drifts away before execution; the pre-execution precheck
        // must catch it.
        gamma.revoke_write("//home/data", "alice").unwrap();
        let err = validator.precheck(&task).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Precheck(RejectionReason::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn missing_relay_is_a_configuration_rejection() {
        let (validator, _) = fixture();
        // Rebuild without a relay.
        let mut config = Config::default();
        config.availability_graph = validator.availability_graph.clone();
        for name in ["alpha", "gamma", "beta", "kv"] {
            let kind = match name {
                "beta" => ClusterKind::MapReduce,
                "kv" => ClusterKind::KeyValue,
                _ => ClusterKind::Tabular,
            };
            config.clusters.insert(
                name.to_string(),
                ClusterConfig {
                    kind,
                    options: serde_json::Value::Null,
                },
            );
        }
        let access = Arc::new(StaticAccessController::new());
        let validator = Validator::new(validator.clusters.clone(), &config, access);

        let task = task("alpha", "//home/data/events", "kv", None);
        let err = validator.precheck(&task).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Precheck(RejectionReason::MissingRelay)
        ));
        assert!(!err.is_user_error());
    }

    #[tokio::test]
    async fn relay_satisfies_key_value_destination() {
        let (validator, _) = fixture();
        let task = task("alpha", "//home/data/events", "kv", None);
        validator.precheck(&task).await.unwrap();
    }
}
