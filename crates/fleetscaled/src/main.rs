//! fleetscaled — the fleetscale daemon.
//!
//! Resizes the task-node pools of registered query-engine clusters from
//! operator-written scaling expressions.
//!
//! # Usage
//!
//! ```text
//! fleetscaled run --config /etc/fleetscale/autoscaling.toml --clusters /etc/fleetscale/clusters.toml
//! fleetscaled tick --dry-run
//! fleetscaled history --cluster j-2AXXXXXXGAPLF --limit 20
//! fleetscaled restart-node --cluster j-2AXXXXXXGAPLF --host ip-10-0-3-17
//! fleetscaled init-config --config ./autoscaling.toml
//! ```

mod service;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fleetscale_core::{ConfigStore, ScalingConfig};
use fleetscale_state::StateStore;
use tracing::info;

use crate::service::{HISTORY_DB, ServiceArgs};

#[derive(Parser)]
#[command(name = "fleetscaled", about = "fleetscale task-node autoscaler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scaling loop until interrupted.
    Run {
        #[command(flatten)]
        args: ServiceArgs,

        /// Log fleet mutations instead of sending them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a single tick and print the outcomes as JSON.
    Tick {
        #[command(flatten)]
        args: ServiceArgs,

        #[arg(long)]
        dry_run: bool,
    },

    /// Print stored scaling decisions for a cluster, newest first.
    History {
        #[arg(long, default_value = "/var/lib/fleetscale")]
        data_dir: PathBuf,

        #[arg(long)]
        cluster: String,

        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// Gracefully shut down one task node of a registered cluster.
    RestartNode {
        #[command(flatten)]
        args: ServiceArgs,

        #[arg(long)]
        cluster: String,

        /// Host name of the node as reported by the collector.
        #[arg(long)]
        host: String,
    },

    /// Write the default scaling configuration.
    InitConfig {
        #[arg(long, default_value = "/etc/fleetscale/autoscaling.toml")]
        config: PathBuf,

        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,fleetscaled=debug,fleetscale=debug")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { args, dry_run } => service::run(args, dry_run).await,
        Command::Tick { args, dry_run } => {
            let autoscaler = service::build_autoscaler(&args, dry_run)?;
            let outcomes = autoscaler.tick().await;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
            Ok(())
        }
        Command::History {
            data_dir,
            cluster,
            limit,
        } => {
            let store = StateStore::open(&data_dir.join(HISTORY_DB))?;
            let records = store.list_history(&cluster, limit)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
        Command::RestartNode {
            args,
            cluster,
            host,
        } => {
            let autoscaler = service::build_autoscaler(&args, false)?;
            let stopped = autoscaler.restart_node(&cluster, &host).await?;
            println!("{}", serde_json::to_string_pretty(&stopped)?);
            Ok(())
        }
        Command::InitConfig { config, force } => {
            let store = ConfigStore::new(config);
            if store.path().exists() && !force {
                anyhow::bail!(
                    "{} already exists, pass --force to overwrite",
                    store.path().display()
                );
            }
            store.save(&ScalingConfig::default())?;
            info!(path = ?store.path(), "default configuration written");
            Ok(())
        }
    }
}
