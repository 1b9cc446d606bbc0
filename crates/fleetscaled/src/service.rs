//! Assembles the autoscaler from command-line settings.
//!
//! 1. Loads (or writes) the scaling configuration
//! 2. Loads the cluster registry
//! 3. Opens the history store under the data directory
//! 4. Wires the collector and fleet-agent adapters into an `Autoscaler`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use fleetscale_adapters::{
    CollectorTelemetry, DEFAULT_PRESTO_PORT, DryRunFleet, HttpFleet, JsonClient,
};
use fleetscale_autoscale::{Autoscaler, FleetAdapter};
use fleetscale_core::{ClusterRegistry, ConfigStore, SettingsHandle};
use fleetscale_state::StateStore;
use tokio::sync::watch;
use tracing::info;

/// History database file inside the data directory.
pub const HISTORY_DB: &str = "fleetscale.redb";

/// Settings shared by every subcommand that talks to clusters.
#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    /// Scaling configuration file (written with defaults if missing).
    #[arg(long, default_value = "/etc/fleetscale/autoscaling.toml")]
    pub config: PathBuf,

    /// Cluster registry (TOML `[[cluster]]` tables or a JSON array).
    #[arg(long, default_value = "/etc/fleetscale/clusters.toml")]
    pub clusters: PathBuf,

    /// Data directory for the history store.
    #[arg(long, default_value = "/var/lib/fleetscale")]
    pub data_dir: PathBuf,

    /// Base URL of the telemetry collector.
    #[arg(long, default_value = "http://127.0.0.1:9100")]
    pub collector_url: String,

    /// Base URL of the fleet agent.
    #[arg(long, default_value = "http://127.0.0.1:9200")]
    pub fleet_url: String,

    /// REST port of the query engine on worker nodes.
    #[arg(long, default_value_t = DEFAULT_PRESTO_PORT)]
    pub presto_port: u16,

    /// Timeout for each outbound call, in seconds.
    #[arg(long, default_value = "10")]
    pub call_timeout: u64,

    /// Overall deadline for one cluster's tick, in seconds.
    #[arg(long, default_value = "120")]
    pub tick_deadline: u64,
}

pub fn build_autoscaler(args: &ServiceArgs, dry_run: bool) -> anyhow::Result<Autoscaler> {
    let settings = SettingsHandle::from_store(ConfigStore::new(&args.config))?;
    info!(path = ?args.config, "scaling configuration loaded");

    let registry = ClusterRegistry::from_file(&args.clusters)?;
    info!(path = ?args.clusters, clusters = registry.len(), "cluster registry loaded");

    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("creating data directory {}", args.data_dir.display()))?;
    let db_path = args.data_dir.join(HISTORY_DB);
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "history store opened");

    let client = JsonClient::new(Duration::from_secs(args.call_timeout));
    let telemetry = CollectorTelemetry::new(&args.collector_url, store, client.clone());
    let http_fleet =
        HttpFleet::new(&args.fleet_url, client).with_presto_port(args.presto_port);
    let fleet: Arc<dyn FleetAdapter> = if dry_run {
        info!("dry run: fleet mutations will only be logged");
        Arc::new(DryRunFleet::new(http_fleet))
    } else {
        Arc::new(http_fleet)
    };

    Ok(Autoscaler::new(
        Arc::new(registry),
        Arc::new(settings),
        Arc::new(telemetry),
        fleet,
    )
    .with_tick_deadline(Duration::from_secs(args.tick_deadline)))
}

/// Run the control loop until Ctrl-C.
pub async fn run(args: ServiceArgs, dry_run: bool) -> anyhow::Result<()> {
    info!(dry_run, "fleetscale daemon starting");
    let autoscaler = build_autoscaler(&args, dry_run)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(async move {
        autoscaler.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    loop_handle.await?;
    info!("fleetscale daemon stopped");
    Ok(())
}
