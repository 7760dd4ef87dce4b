//! Daemon assembly: wire the ports, spawn the background loops.
//!
//! [`Daemon::start`] builds the registry, validator, executor, recovery
//! loader, lock manager, and admission controller from a [`Config`] and a
//! set of [`DaemonPorts`], then spawns the two long-lived loops:
//!
//! - the lock-holder loop ([`crate::lock::LockManager::run`])
//! - the admission/supervision tick loop
//!   ([`crate::admission::AdmissionController::run`])
//!
//! The service facade handed to the API layer shares the same registry and
//! active flag, so requests observe exactly what the loops observe.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::admission::AdmissionController;
use crate::auth::AccessController;
use crate::cluster::ClusterSet;
use crate::config::Config;
use crate::error::Result;
use crate::executor::Executor;
use crate::lock::{ActiveFlag, LockManager};
use crate::recovery::RecoveryLoader;
use crate::registry::TaskRegistry;
use crate::runner::TransferRunner;
use crate::service::TransferService;
use crate::store::MetaStore;
use crate::validator::Validator;

/// The external collaborators a daemon instance is wired with.
pub struct DaemonPorts {
    /// Durable metadata store adapter.
    pub store: Arc<dyn MetaStore>,
    /// Configured cluster clients.
    pub clusters: ClusterSet,
    /// Credential resolution and admin ACLs.
    pub access: Arc<dyn AccessController>,
    /// The data-movement routines.
    pub runner: Arc<dyn TransferRunner>,
}

/// A running daemon instance.
pub struct Daemon {
    service: Arc<TransferService>,
    active: ActiveFlag,
    shutdown: CancellationToken,
    loops: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// Validates the configuration, wires the components, and spawns the
    /// background loops.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a user error when the configuration is inconsistent.
    pub fn start(config: Config, ports: DaemonPorts) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let registry = Arc::new(TaskRegistry::new(Arc::clone(&ports.store)));
        let validator = Arc::new(Validator::new(
            ports.clusters.clone(),
            &config,
            Arc::clone(&ports.access),
        ));
        let executor = Arc::new(Executor::new(
            Arc::clone(&validator),
            Arc::clone(&ports.runner),
            config.timing.abort_grace(),
        ));
        let active = ActiveFlag::new();

        let lock = LockManager::new(
            Arc::clone(&ports.store),
            RecoveryLoader::new(Arc::clone(&registry)),
            active.clone(),
            config.advertise_address.clone(),
            config.timing.lock_retry(),
        );
        let admission = AdmissionController::new(
            Arc::clone(&registry),
            Arc::clone(&executor),
            active.clone(),
            config.timing.admission_period(),
        );

        let shutdown = CancellationToken::new();
        let loops = vec![
            tokio::spawn(lock.run(shutdown.clone())),
            tokio::spawn(admission.run(shutdown.clone())),
        ];

        let service = Arc::new(TransferService::new(
            registry,
            validator,
            executor,
            ports.access,
            active.clone(),
            config,
        ));

        Ok(Self {
            service,
            active,
            shutdown,
            loops,
        })
    }

    /// Returns the operation surface for the API layer.
    #[must_use]
    pub fn service(&self) -> Arc<TransferService> {
        Arc::clone(&self.service)
    }

    /// Returns true while this instance holds the scheduler lock.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_active()
    }

    /// Signals the loops to stop and waits for them.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.loops {
            let _ = task.await;
        }
        tracing::info!("daemon stopped");
    }
}
