//! Scheduler-lock acquisition: the single-active-writer pattern.
//!
//! Every daemon instance runs a [`LockManager`]; only the instance that
//! wins the store's exclusive lock becomes active. Acquisition retries on
//! conflict with a fixed sleep (contention is expected to be rare and
//! short, so no exponential backoff), and gives up on any other failure:
//! the process stays inactive and a supervising process manager is expected
//! to restart it. Losing the lock is not re-acquired within a run.
//!
//! Once acquired: run recovery, flip the shared [`ActiveFlag`], publish
//! this instance's network address on the lock node for discovery, then
//! idle until shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::metrics::EngineMetrics;
use crate::recovery::RecoveryLoader;
use crate::store::{LockAttempt, MetaStore};

/// Shared flag that is true only while this instance holds the scheduler
/// lock.
///
/// The admission loop and the service consult it; everything that mutates
/// tasks is a no-op (or an error to the caller) while the flag is down.
#[derive(Debug, Clone, Default)]
pub struct ActiveFlag(Arc<AtomicBool>);

impl ActiveFlag {
    /// Creates a flag in the inactive position.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while the scheduler lock is held.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Flips the flag.
    pub fn set(&self, active: bool) {
        self.0.store(active, Ordering::SeqCst);
    }
}

/// Acquires and holds the cluster-wide exclusive scheduler lock.
pub struct LockManager {
    store: Arc<dyn MetaStore>,
    recovery: RecoveryLoader,
    active: ActiveFlag,
    instance_id: String,
    advertise_address: Option<String>,
    retry: Duration,
    metrics: EngineMetrics,
}

impl LockManager {
    /// Creates a manager with a freshly generated instance identity.
    #[must_use]
    pub fn new(
        store: Arc<dyn MetaStore>,
        recovery: RecoveryLoader,
        active: ActiveFlag,
        advertise_address: Option<String>,
        retry: Duration,
    ) -> Self {
        Self {
            store,
            recovery,
            active,
            instance_id: Ulid::new().to_string(),
            advertise_address,
            retry,
            metrics: EngineMetrics::new(),
        }
    }

    /// Returns this instance's lock identity.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Blocks until this instance holds the lock or the process is
    /// terminating, then holds it until shutdown.
    ///
    /// Run on a background tokio task; the function only returns when the
    /// daemon is shutting down or acquisition failed fatally.
    pub async fn run(self, shutdown: CancellationToken) {
        if !self.acquire(&shutdown).await {
            return;
        }

        tracing::info!(instance = %self.instance_id, "scheduler lock acquired");

        match self.recovery.recover().await {
            Ok(_) => {}
            Err(error) => {
                tracing::error!(%error, "recovery failed; staying inactive");
                let _ = self.store.release_lock(&self.instance_id).await;
                return;
            }
        }

        self.active.set(true);

        if let Some(address) = &self.advertise_address {
            // Discovery only; the daemon stays active even if publication
            // fails.
            if let Err(error) = self.store.set_lock_attribute("address", address).await {
                tracing::warn!(%error, "failed to publish instance address");
            }
        }

        shutdown.cancelled().await;

        self.active.set(false);
        if let Err(error) = self.store.release_lock(&self.instance_id).await {
            tracing::warn!(%error, "failed to release scheduler lock on shutdown");
        }
        tracing::info!("scheduler lock released");
    }

    /// The acquisition loop. Returns false when the process should stay
    /// inactive (fatal store error or shutdown).
    async fn acquire(&self, shutdown: &CancellationToken) -> bool {
        loop {
            if shutdown.is_cancelled() {
                return false;
            }
            match self.store.try_lock(&self.instance_id).await {
                Ok(LockAttempt::Acquired) => {
                    self.metrics.record_lock_attempt("acquired");
                    return true;
                }
                Ok(LockAttempt::Conflict { holder }) => {
                    self.metrics.record_lock_attempt("conflict");
                    tracing::info!(
                        holder = holder.as_deref().unwrap_or("unknown"),
                        "scheduler lock held elsewhere; standing by"
                    );
                    tokio::select! {
                        () = shutdown.cancelled() => return false,
                        () = tokio::time::sleep(self.retry) => {}
                    }
                }
                Err(error) => {
                    self.metrics.record_lock_attempt("error");
                    tracing::error!(%error, "scheduler lock acquisition failed; staying inactive");
                    return false;
                }
            }
        }
    }
}
