//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ferry_core::TaskId;
use ferry_engine::admission::AdmissionController;
use ferry_engine::auth::StaticAccessController;
use ferry_engine::cluster::memory::InMemoryClusterClient;
use ferry_engine::cluster::{ClusterKind, ClusterSet, RouteKind};
use ferry_engine::config::{ClusterConfig, Config, RelayConfig, TimingConfig};
use ferry_engine::executor::Executor;
use ferry_engine::lock::ActiveFlag;
use ferry_engine::registry::TaskRegistry;
use ferry_engine::runner::{ProgressSender, TransferRunner};
use ferry_engine::service::TransferService;
use ferry_engine::store::memory::InMemoryMetaStore;
use ferry_engine::task::{Task, TaskFailure, TaskRequest, TaskState};
use ferry_engine::validator::Validator;

/// A runner whose behavior is scripted per source table: succeed (default),
/// fail with a payload, or stall for a while before succeeding.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    failures: Mutex<HashMap<String, TaskFailure>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes transfers from `table` fail with `message`.
    pub fn fail_table(&self, table: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(table.to_string(), TaskFailure::new(message));
    }

    /// Clears a scripted failure.
    pub fn heal_table(&self, table: &str) {
        self.failures.lock().unwrap().remove(table);
    }

    /// Makes transfers from `table` stall before completing.
    pub fn delay_table(&self, table: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(table.to_string(), delay);
    }
}

#[async_trait]
impl TransferRunner for ScriptedRunner {
    async fn execute(
        &self,
        task: &Task,
        _route: RouteKind,
        progress: &ProgressSender,
    ) -> Result<(), TaskFailure> {
        progress
            .operation_started(serde_json::json!({
                "operation": format!("copy {}", task.source_table),
            }))
            .await;

        let delay = self.delays.lock().unwrap().get(&task.source_table).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get(&task.source_table)
            .cloned();
        match failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

/// A fully wired engine over in-memory ports, already active (the lock
/// manager is exercised separately), with the tick loop NOT spawned so that
/// tests drive `admission.tick()` deterministically.
pub struct Harness {
    pub store: Arc<InMemoryMetaStore>,
    pub registry: Arc<TaskRegistry>,
    pub admission: AdmissionController,
    pub service: TransferService,
    pub active: ActiveFlag,
    pub runner: Arc<ScriptedRunner>,
    /// The tabular source cluster, for simulating data drift.
    pub alpha: Arc<InMemoryClusterClient>,
    /// The tabular destination cluster, for simulating permission drift.
    pub gamma: Arc<InMemoryClusterClient>,
}

pub fn harness() -> Harness {
    harness_with_store(Arc::new(InMemoryMetaStore::new()))
}

/// Builds a harness over an existing store, so a test can simulate a daemon
/// restart by wiring a second engine instance to the records the first one
/// left behind.
pub fn harness_with_store(store: Arc<InMemoryMetaStore>) -> Harness {
    let alpha = Arc::new(
        InMemoryClusterClient::new("alpha", ClusterKind::Tabular)
            .with_table("//home/data/events", 100, &["key", "value"])
            .with_table("//home/data/clicks", 50, &["key", "subkey", "value"])
            .with_table("//home/data/metrics", 10, &["key", "value"])
            .with_table("//home/data/empty", 0, &["key"]),
    );
    let delta = Arc::new(
        InMemoryClusterClient::new("delta", ClusterKind::Tabular)
            .with_table("//home/data/events", 7, &["key", "value"])
            .with_table("//home/data/mirror", 12, &["key", "value"]),
    );
    let gamma = Arc::new(
        InMemoryClusterClient::new("gamma", ClusterKind::Tabular)
            .with_directory("//home/data")
            .allow_write("//home/data", "alice")
            .allow_write("//home/data", "bob"),
    );
    let beta = Arc::new(InMemoryClusterClient::new("beta", ClusterKind::MapReduce));
    let kv = Arc::new(InMemoryClusterClient::new("kv", ClusterKind::KeyValue));

    let clusters = ClusterSet::new()
        .with(alpha.clone())
        .with(delta)
        .with(gamma.clone())
        .with(beta)
        .with(kv);

    let mut config = Config {
        default_mr_user: Some("robot-legacy".into()),
        relay: Some(RelayConfig {
            proxy: "relay.example.net".into(),
            token: None,
        }),
        timing: TimingConfig {
            admission_period_ms: 20,
            lock_retry_secs: 1,
            abort_grace_ms: 50,
        },
        ..Config::default()
    };
    for (name, kind) in [
        ("alpha", ClusterKind::Tabular),
        ("delta", ClusterKind::Tabular),
        ("gamma", ClusterKind::Tabular),
        ("beta", ClusterKind::MapReduce),
        ("kv", ClusterKind::KeyValue),
    ] {
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
        vec!["beta".into(), "gamma".into(), "kv".into()],
    );
    config
        .availability_graph
        .insert("delta".into(), vec!["beta".into(), "gamma".into()]);

    let access = Arc::new(
        StaticAccessController::new()
            .with_user("tok-alice", "alice")
            .with_user("tok-bob", "bob")
            .with_user("tok-ops", "ops")
            .with_admin("ops"),
    );
    let config = Arc::new(config);

    let registry = Arc::new(TaskRegistry::new(store.clone()));
    let validator = Arc::new(Validator::new(clusters, &config, access.clone()));
    let runner = Arc::new(ScriptedRunner::new());
    let executor = Arc::new(Executor::new(
        validator.clone(),
        runner.clone(),
        config.timing.abort_grace(),
    ));
    let active = ActiveFlag::new();
    active.set(true);

    let admission = AdmissionController::new(
        registry.clone(),
        executor.clone(),
        active.clone(),
        config.timing.admission_period(),
    );
    let service = TransferService::new(
        registry.clone(),
        validator,
        executor,
        access,
        active.clone(),
        Arc::clone(&config),
    );

    Harness {
        store,
        registry,
        admission,
        service,
        active,
        runner,
        alpha,
        gamma,
    }
}

/// A submission from alpha's tabular store into beta's legacy storage:
/// feasible without any destination-side grant.
pub fn request_to_legacy(table: &str) -> TaskRequest {
    TaskRequest {
        source_cluster: "alpha".into(),
        source_table: table.into(),
        destination_cluster: "beta".into(),
        destination_table: Some("users/copy".into()),
        source_token: None,
        destination_token: None,
        copy_method: None,
        mr_user: None,
        meta: None,
    }
}

/// A submission into gamma's tabular store; requires a resolvable
/// destination token with a write grant on `//home/data`.
pub fn request_to_tabular(table: &str) -> TaskRequest {
    TaskRequest {
        source_cluster: "alpha".into(),
        source_table: table.into(),
        destination_cluster: "gamma".into(),
        destination_table: Some("//home/data/copy".into()),
        source_token: None,
        destination_token: None,
        copy_method: None,
        mr_user: None,
        meta: None,
    }
}

/// Ticks the controller until the task reaches `state`, or panics after a
/// generous timeout.
pub async fn settle(harness: &Harness, id: TaskId, state: TaskState) {
    let deadline = Duration::from_secs(10);
    let outcome = tokio::time::timeout(deadline, async {
        loop {
            harness.admission.tick().await.expect("tick failed");
            let task = harness.registry.get(id).await.expect("task vanished");
            if task.state == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        outcome.is_ok(),
        "task {id} did not reach {state} within {deadline:?} (currently {})",
        harness
            .registry
            .get(id)
            .await
            .map(|t| t.state.to_string())
            .unwrap_or_else(|_| "gone".into())
    );
}
