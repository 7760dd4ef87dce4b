//! Daemon configuration.
//!
//! Configuration is a single JSON document: the registered clusters, the
//! availability graph that says which destinations are reachable from which
//! sources, the optional key-value transmission relay, the durable-store
//! namespace, and timing knobs for the background loops.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ferry_core::Secret;

use crate::cluster::ClusterKind;
use crate::error::{Error, Result};

/// Log output format, selectable from the configuration file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON structured logs.
    Json,
    /// Pretty-printed logs.
    #[default]
    Pretty,
}

impl From<LogFormat> for ferry_core::observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// A registered cluster: its family plus opaque SDK options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// The cluster family.
    pub kind: ClusterKind,
    /// SDK-specific options, passed through to the client constructor.
    #[serde(default)]
    pub options: serde_json::Value,
}

/// The transmission relay used for transfers into the key-value delivery
/// system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay endpoint.
    pub proxy: String,
    /// Credential for the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Secret>,
}

/// Timing knobs for the background loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Admission/supervision tick period, milliseconds.
    #[serde(default = "default_admission_period_ms")]
    pub admission_period_ms: u64,
    /// Sleep between scheduler-lock acquisition attempts, seconds.
    #[serde(default = "default_lock_retry_secs")]
    pub lock_retry_secs: u64,
    /// Grace period between the abort signal and a forced worker kill,
    /// milliseconds.
    #[serde(default = "default_abort_grace_ms")]
    pub abort_grace_ms: u64,
}

fn default_admission_period_ms() -> u64 {
    500
}

fn default_lock_retry_secs() -> u64 {
    10
}

fn default_abort_grace_ms() -> u64 {
    500
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            admission_period_ms: default_admission_period_ms(),
            lock_retry_secs: default_lock_retry_secs(),
            abort_grace_ms: default_abort_grace_ms(),
        }
    }
}

impl TimingConfig {
    /// Admission/supervision tick period.
    #[must_use]
    pub const fn admission_period(&self) -> Duration {
        Duration::from_millis(self.admission_period_ms)
    }

    /// Sleep between lock acquisition attempts.
    ///
    /// Intentionally fixed rather than exponential: lock contention is
    /// expected to be rare and short.
    #[must_use]
    pub const fn lock_retry(&self) -> Duration {
        Duration::from_secs(self.lock_retry_secs)
    }

    /// Abort grace window.
    #[must_use]
    pub const fn abort_grace(&self) -> Duration {
        Duration::from_millis(self.abort_grace_ms)
    }
}

/// Daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Registered clusters by name.
    #[serde(default)]
    pub clusters: HashMap<String, ClusterConfig>,
    /// Directed adjacency: source cluster -> reachable destination clusters.
    #[serde(default)]
    pub availability_graph: HashMap<String, Vec<String>>,
    /// Transmission relay for key-value delivery destinations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<RelayConfig>,
    /// Legacy map/reduce account used when a submission omits one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mr_user: Option<String>,
    /// Durable-store namespace holding task records and the lock node.
    #[serde(default = "default_store_path")]
    pub store_path: String,
    /// Network address published on the lock node for discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_address: Option<String>,
    /// Background loop timing.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_store_path() -> String {
    "//sys/ferry".to_string()
}

impl Config {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file cannot be read, or a
    /// serialization error if it is not valid configuration JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::storage(format!("cannot read config {}: {e}", path.display()))
        })?;
        serde_json::from_str(&contents).map_err(|e| Error::Serialization {
            message: format!("cannot parse config {}: {e}", path.display()),
        })
    }

    /// Validates internal consistency.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error when the availability graph
    /// references a cluster that is not registered.
    pub fn validate(&self) -> Result<()> {
        for (source, destinations) in &self.availability_graph {
            if !self.clusters.contains_key(source) {
                return Err(Error::invalid_request(format!(
                    "availability graph references unknown cluster {source}"
                )));
            }
            for destination in destinations {
                if !self.clusters.contains_key(destination) {
                    return Err(Error::invalid_request(format!(
                        "availability graph references unknown cluster {destination}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns the registered kind of a cluster, if any.
    #[must_use]
    pub fn cluster_kind(&self, name: &str) -> Option<ClusterKind> {
        self.clusters.get(name).map(|c| c.kind)
    }

    /// Returns the caller-facing configuration: clusters by kind and the
    /// availability graph, with credentials and SDK options elided.
    #[must_use]
    pub fn view(&self) -> ConfigView {
        ConfigView {
            clusters: self
                .clusters
                .iter()
                .map(|(name, cluster)| (name.clone(), cluster.kind))
                .collect(),
            availability_graph: self
                .availability_graph
                .iter()
                .map(|(source, destinations)| {
                    let mut destinations = destinations.clone();
                    destinations.sort();
                    (source.clone(), destinations)
                })
                .collect(),
        }
    }
}

/// The discovery document served to callers: which clusters exist and which
/// routes are available.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigView {
    /// Registered clusters by kind.
    pub clusters: BTreeMap<String, ClusterKind>,
    /// Directed adjacency of available routes.
    pub availability_graph: BTreeMap<String, Vec<String>>,
}
