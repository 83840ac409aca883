//! phx-files - cluster file catalog command-line tool
//!
//! Lists images and experiment files across the minimega mesh, copies,
//! syncs and deletes files, and moves VM interfaces between VLANs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use phx_common::config::ConfigResolver;
use phx_files::catalog::FilesSettings;
use phx_files::network::NetworkBridge;
use phx_files::{
    ClusterFiles, ClusterRunner, CopyStatus, ImageKind, MeshClusterFiles, MinimegaCli,
    TransferOptions,
};
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for phx-files
#[derive(Parser, Debug)]
#[command(name = "phx-files")]
#[command(about = "Cluster-wide image and experiment file catalog")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "PHX_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List VM and container images in the base files directory
    Images {
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
    /// List an experiment's files
    Files {
        exp: String,
        /// Filter expression, e.g. `category:"VM Disk Snapshot" and >1gb`
        #[arg(short, long, default_value = "")]
        filter: String,
    },
    /// List snapshot stems with both disk and memory halves
    Snapshots { exp: String },
    /// Copy a file onto a node and wait for it to arrive
    Copy { path: String, dest: String },
    /// Fetch a file onto every mesh node
    Sync { path: String },
    /// Delete a file from every node
    Delete { path: String },
    /// Connect a VM interface to a VLAN
    Connect {
        exp: String,
        vm: String,
        iface: usize,
        vlan: String,
        #[arg(long)]
        bridge: Option<String>,
    },
    /// Disconnect a VM interface
    Disconnect { exp: String, vm: String, iface: usize },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Vm,
    Container,
}

impl From<KindArg> for ImageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Vm => ImageKind::VmImage,
            KindArg::Container => ImageKind::ContainerImage,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigResolver::new()
        .resolve(args.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("phx_files={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!(
        minimega = %config.minimega_path.display(),
        base = %config.minimega_base.display(),
        "Using minimega"
    );

    let runner: Arc<dyn ClusterRunner> = Arc::new(MinimegaCli::from_config(&config));
    let files = MeshClusterFiles::new(runner.clone(), FilesSettings::from_config(&config));

    match args.command {
        Command::Images { kind } => {
            let mut images = files
                .get_images(kind.map(ImageKind::from))
                .await
                .context("Failed to list images")?;
            images.sort_by(|a, b| a.name.cmp(&b.name));

            print_output(args.json, &images, |image| {
                format!(
                    "{:<40} {:<16} {:>14}  {}",
                    image.name,
                    image.kind.to_string(),
                    image.size,
                    image.full_path
                )
            })?;
        }
        Command::Files { exp, filter } => {
            let mut listed = files
                .get_experiment_file_names(&exp, &filter)
                .await
                .with_context(|| format!("Failed to list files for experiment {}", exp))?;
            listed.sort_by(|a, b| a.name.cmp(&b.name));

            print_output(args.json, &listed, |file| {
                format!(
                    "{:<40} {:<20} {:>14}  {}",
                    file.name,
                    file.category.label(),
                    file.size,
                    file.date
                )
            })?;
        }
        Command::Snapshots { exp } => {
            let mut stems = files
                .get_experiment_snapshots(&exp)
                .await
                .with_context(|| format!("Failed to list snapshots for experiment {}", exp))?;
            stems.sort();

            print_output(args.json, &stems, String::clone)?;
        }
        Command::Copy { path, dest } => {
            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_signal(cancel.clone()));

            let settings = files.settings();
            let options = TransferOptions {
                poll_interval: settings.poll_interval,
                timeout: settings.transfer_timeout,
                cancel: Some(cancel),
            };
            let status: &CopyStatus = &|fraction: f64| eprintln!("{:>5.1}%", fraction * 100.0);

            files
                .copy_file_with(&path, &dest, Some(status), &options)
                .await
                .with_context(|| format!("Failed to copy {} to {}", path, dest))?;
            info!("Copied {} to {}", path, dest);
        }
        Command::Sync { path } => {
            files
                .sync_file(&path, None)
                .await
                .with_context(|| format!("Failed to sync {}", path))?;
        }
        Command::Delete { path } => {
            files
                .delete_file(&path)
                .await
                .with_context(|| format!("Failed to delete {}", path))?;
        }
        Command::Connect {
            exp,
            vm,
            iface,
            vlan,
            bridge,
        } => {
            NetworkBridge::from_config(&config, runner)
                .connect(&exp, &vm, iface, &vlan, bridge.as_deref())
                .await
                .context("Failed to connect interface")?;
        }
        Command::Disconnect { exp, vm, iface } => {
            NetworkBridge::from_config(&config, runner)
                .disconnect(&exp, &vm, iface)
                .await
                .context("Failed to disconnect interface")?;
        }
    }

    Ok(())
}

/// Print items as pretty JSON or one formatted line each
fn print_output<T: Serialize>(json: bool, items: &[T], line: impl Fn(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items).context("Failed to encode output")?);
    } else {
        for item in items {
            println!("{}", line(item));
        }
    }
    Ok(())
}

/// Cancel the running transfer on Ctrl+C
async fn cancel_on_signal(cancel: CancellationToken) {
    if signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, cancelling transfer");
        cancel.cancel();
    }
}
