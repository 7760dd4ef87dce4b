//! Ferry transfer daemon.
//!
//! Loads the JSON configuration, wires the development backends (in-memory
//! store, fixture cluster clients, no-op runner), and runs the orchestration
//! engine until ctrl-c. Production deployments substitute the real store
//! adapter, cluster SDKs, and copy routines at this seam.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use ferry_core::observability::init_logging;
use ferry_engine::auth::StaticAccessController;
use ferry_engine::cluster::memory::InMemoryClusterClient;
use ferry_engine::cluster::ClusterSet;
use ferry_engine::config::Config;
use ferry_engine::error::{Error, Result};
use ferry_engine::runner::NoOpRunner;
use ferry_engine::runtime::{Daemon, DaemonPorts};
use ferry_engine::store::memory::InMemoryMetaStore;

/// Transfer orchestration daemon.
#[derive(Debug, Parser)]
#[command(name = "ferryd", about = "Coordinates bulk data transfers between storage clusters")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    init_logging(config.logging.format.into());
    tracing::info!(
        clusters = config.clusters.len(),
        store_path = %config.store_path,
        "starting ferryd"
    );

    let mut clusters = ClusterSet::new();
    for (name, cluster) in &config.clusters {
        clusters = clusters.with(Arc::new(InMemoryClusterClient::new(name, cluster.kind)));
    }

    let ports = DaemonPorts {
        store: Arc::new(InMemoryMetaStore::new()),
        clusters,
        access: Arc::new(StaticAccessController::new()),
        runner: Arc::new(NoOpRunner),
    };

    let daemon = Daemon::start(config, ports)?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::internal(format!("cannot listen for ctrl-c: {e}")))?;
    tracing::info!("shutdown requested");
    daemon.shutdown().await;
    Ok(())
}
