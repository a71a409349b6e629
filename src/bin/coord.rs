//! Coordinator binary

use clap::{Parser, Subcommand};
use ringkv::common::{parse_duration, Config, NodeSpec, ReconcileMode};
use ringkv::Coordinator;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ringkv-coord")]
#[command(about = "ringkv coordinator: placement, versioning and quorum replication")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start coordinator server
    Serve {
        /// Coordinator name
        #[arg(long)]
        id: Option<String>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Storage nodes as `host:port` or `host:port=weight` (comma-separated)
        #[arg(long = "node", value_delimiter = ',')]
        nodes: Vec<String>,

        /// Virtual nodes per unit of weight
        #[arg(long)]
        virtual_nodes: Option<usize>,

        /// Replication factor
        #[arg(long)]
        n: Option<usize>,

        /// Read quorum
        #[arg(long)]
        r: Option<usize>,

        /// Write quorum
        #[arg(long)]
        w: Option<usize>,

        /// Upper bound on one quorum operation (e.g. 2s, 750ms)
        #[arg(long)]
        quorum_timeout: Option<String>,

        /// Timeout for a single node call (e.g. 1s)
        #[arg(long)]
        rpc_timeout: Option<String>,

        /// Cache node base URL (empty disables)
        #[arg(long)]
        cache_url: Option<String>,

        /// Drop versions dominated by another returned version
        #[arg(long)]
        prune_dominated: bool,

        /// Skip copying stored versions into the cache at startup
        #[arg(long)]
        no_rehydrate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve {
            id,
            bind,
            nodes,
            virtual_nodes,
            n,
            r,
            w,
            quorum_timeout,
            rpc_timeout,
            cache_url,
            prune_dominated,
            no_rehydrate,
        } => {
            // File and environment first, CLI arguments win
            let mut coord_config = config.coordinator;
            if let Some(id) = id {
                coord_config.node_id = id;
            }
            if let Some(bind) = bind {
                coord_config.bind_addr = bind;
            }
            if !nodes.is_empty() {
                coord_config.nodes = nodes
                    .iter()
                    .map(|s| NodeSpec::parse(s))
                    .collect::<ringkv::Result<_>>()?;
            }
            if let Some(v) = virtual_nodes {
                coord_config.virtual_nodes = v;
            }
            if let Some(n) = n {
                coord_config.quorum.n = n;
            }
            if let Some(r) = r {
                coord_config.quorum.r = r;
            }
            if let Some(w) = w {
                coord_config.quorum.w = w;
            }
            if let Some(t) = quorum_timeout {
                coord_config.quorum_timeout_ms = parse_duration(&t)?.as_millis() as u64;
            }
            if let Some(t) = rpc_timeout {
                coord_config.rpc_timeout_ms = parse_duration(&t)?.as_millis() as u64;
            }
            if let Some(url) = cache_url {
                coord_config.cache_url = url;
            }
            if prune_dominated {
                coord_config.reconcile = ReconcileMode::PruneDominated;
            }
            if no_rehydrate {
                coord_config.rehydrate_on_start = false;
            }

            Coordinator::new(coord_config).serve().await?;
        }
    }

    Ok(())
}
