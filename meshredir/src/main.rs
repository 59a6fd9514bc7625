use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use tokio::signal;

use meshredir_common::OriginQuery;

mod config;
mod loader;
mod origin;
mod registry;

use crate::config::PodsFile;
use crate::loader::LoaderConfig;
use crate::origin::OriginLookup;
use crate::registry::PodRegistry;

#[derive(Parser)]
#[command(name = "meshredir")]
#[command(about = "In-kernel sidecar traffic redirection")]
#[command(version)]
struct Cli {
    /// Directory the data plane maps are pinned under
    #[arg(long, default_value = "/sys/fs/bpf/meshredir")]
    pin_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and attach the hook programs, then wait for Ctrl-C
    Run {
        /// Compiled hook object
        object: PathBuf,
        /// cgroup v2 directory the socket hooks attach to
        #[arg(long, default_value = "/sys/fs/cgroup")]
        cgroup: PathBuf,
        /// Interface for the egress origin tagger; skipped when absent
        #[arg(long)]
        iface: Option<String>,
        /// Pods file applied to the Pod Registry after attaching
        #[arg(long)]
        pods: Option<PathBuf>,
    },
    /// Edit the Pod Registry of a running data plane
    Pods {
        #[command(subcommand)]
        action: PodsAction,
    },
    /// Look up the original destination of a connection
    Origin {
        #[arg(long)]
        cookie: Option<u64>,
        /// Application end of the redirected connection
        #[arg(long, requires = "dst")]
        src: Option<SocketAddr>,
        /// Sidecar end of the redirected connection
        #[arg(long, requires = "src")]
        dst: Option<SocketAddr>,
        #[arg(long)]
        mark: Option<u32>,
    },
}

#[derive(Subcommand)]
enum PodsAction {
    /// Insert or update every pod listed in a pods file
    Apply { file: PathBuf },
    /// Remove pods by address
    Delete { pods: Vec<IpAddr> },
    /// Print the registered configuration of pods
    Show { pods: Vec<IpAddr> },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            object,
            cgroup,
            iface,
            pods,
        } => {
            let config = LoaderConfig {
                object,
                cgroup,
                pin_dir: cli.pin_dir.clone(),
                iface,
            };
            let _bpf = loader::load(&config)?;

            if let Some(pods) = pods {
                apply_pods(&cli.pin_dir, &pods)?;
            }

            info!("Waiting for Ctrl-C...");
            signal::ctrl_c().await?;
            info!("Exiting...");
        }
        Commands::Pods { action } => match action {
            PodsAction::Apply { file } => apply_pods(&cli.pin_dir, &file)?,
            PodsAction::Delete { pods } => {
                let mut registry = PodRegistry::open(&cli.pin_dir)?;
                for pod in pods {
                    if !registry.remove(pod)? {
                        info!("pod {pod} was not registered");
                    }
                }
            }
            PodsAction::Show { pods } => {
                let registry = PodRegistry::open(&cli.pin_dir)?;
                for pod in pods {
                    match registry.get(pod)? {
                        Some(config) => println!("{pod}: {config:?}"),
                        None => println!("{pod}: not registered"),
                    }
                }
            }
        },
        Commands::Origin {
            cookie,
            src,
            dst,
            mark,
        } => {
            let lookup = OriginLookup::open(&cli.pin_dir)?;
            let query = OriginQuery {
                cookie,
                pair: src.zip(dst).map(|(src, dst)| origin::tuple_key(src, dst)),
                mark,
            };
            match lookup.recover(&query) {
                Some(recovered) => println!(
                    "{} ({:?}, {:?})",
                    origin::origin_addr(&recovered.origin),
                    recovered.source,
                    recovered.origin.provenance()
                ),
                None => println!("not mesh-managed"),
            }
        }
    }

    Ok(())
}

fn apply_pods(pin_dir: &std::path::Path, file: &std::path::Path) -> anyhow::Result<()> {
    let entries = PodsFile::load(file)?
        .entries()
        .with_context(|| format!("in {}", file.display()))?;
    PodRegistry::open(pin_dir)?.apply(&entries)?;
    Ok(())
}
