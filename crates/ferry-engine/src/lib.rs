//! # ferry-engine
//!
//! Task orchestration engine for the Ferry transfer daemon.
//!
//! Ferry coordinates bulk data-transfer tasks between heterogeneous storage
//! clusters: a distributed tabular store, a legacy map/reduce storage system,
//! and a key-value delivery system. Multiple daemon instances may run for
//! availability, but only the instance holding the cluster-wide scheduler
//! lock admits and executes work.
//!
//! This crate implements the orchestration core:
//!
//! - **Lock Manager**: single-active-writer election via the durable store's
//!   lock primitive
//! - **Task Registry**: the durable task state machine and its derived
//!   indices, all mutated under one critical section
//! - **Admission Control**: per-route concurrency limits with work-conserving
//!   FIFO ordering
//! - **Execution Supervision**: one isolated worker per running task,
//!   reporting progress and failure over a typed message channel
//! - **Crash Recovery**: persisted `running` tasks are demoted to `pending`
//!   on lock acquisition, so a restart never loses work
//!
//! ## Guarantees
//!
//! - At most one task per (source, destination) route is running at any
//!   instant
//! - Every task state mutation is durably written inside the critical
//!   section that performed it
//! - A task killed mid-transfer is re-executed after restart (at-least-once)
//!
//! ## External Collaborators
//!
//! The network API layer, the per-cluster client SDKs, the data-movement
//! routines, and the metadata store are out of scope; each is modeled as a
//! trait port ([`store::MetaStore`], [`cluster::ClusterClient`],
//!  [`runner::TransferRunner`], [`auth::AccessController`]) with an
//! in-memory implementation for development and tests.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ferry_engine::auth::StaticAccessController;
//! use ferry_engine::cluster::ClusterSet;
//! use ferry_engine::config::Config;
//! use ferry_engine::error::Result;
//! use ferry_engine::runner::NoOpRunner;
//! use ferry_engine::runtime::{Daemon, DaemonPorts};
//! use ferry_engine::store::memory::InMemoryMetaStore;
//!
//! # async fn run() -> Result<()> {
//! let config = Config::default();
//! let ports = DaemonPorts {
//!     store: Arc::new(InMemoryMetaStore::new()),
//!     clusters: ClusterSet::default(),
//!     access: Arc::new(StaticAccessController::new()),
//!     runner: Arc::new(NoOpRunner),
//! };
//! let daemon = Daemon::start(config, ports)?;
//! let service = daemon.service();
//! let _ = service.ping();
//! daemon.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod admission;
pub mod auth;
pub mod cluster;
pub mod config;
pub mod error;
pub mod executor;
pub mod lock;
pub mod metrics;
pub mod recovery;
pub mod registry;
pub mod runner;
pub mod runtime;
pub mod service;
pub mod store;
pub mod task;
pub mod validator;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::admission::AdmissionController;
    pub use crate::auth::AccessController;
    pub use crate::cluster::{ClusterClient, ClusterKind, ClusterSet, RouteKind};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::executor::{Executor, WorkerMessage};
    pub use crate::lock::{ActiveFlag, LockManager};
    pub use crate::recovery::RecoveryLoader;
    pub use crate::registry::TaskRegistry;
    pub use crate::runner::TransferRunner;
    pub use crate::runtime::{Daemon, DaemonPorts};
    pub use crate::service::TransferService;
    pub use crate::store::MetaStore;
    pub use crate::task::{CopyMethod, Route, Task, TaskRequest, TaskState, TaskView};
    pub use crate::validator::{RejectionReason, Validator};
}
