//! chunkmesh Node Daemon
//!
//! Runs a group of storage nodes that:
//! - Register with the hub on consecutive ports
//! - Serve uploads, downloads, chunk requests and searches over TCP
//! - Replicate files from the rest of their subnet on request
//! - Report metrics via a Prometheus endpoint (optional)

use chunkmesh_node::{init_metrics, start_nodes, MetricsServer, NodeConfig, Readiness};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chunkmesh-node")]
#[command(about = "chunkmesh storage node daemon")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hub address as host:port (overrides config file)
    #[arg(long)]
    hub: Option<String>,

    /// Number of nodes to start (overrides config file)
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Owner reported to the hub (overrides config file)
    #[arg(short, long)]
    owner: Option<String>,

    /// Chunk size in bytes (overrides config file)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("chunkmesh node daemon starting...");

    // Load configuration
    // Priority: CLI args > environment > config file > defaults
    let config = NodeConfig::load(cli.config.as_deref())?
        .with_env_overrides()
        .with_overrides(cli.hub, cli.count, cli.owner, cli.chunk_size)?;
    config.validate()?;

    info!(
        hub = %config.hub_id(),
        nodes = config.nodes.count,
        first_port = config.nodes.starting_port as usize + 1,
        chunk_size = config.storage.chunk_size,
        "Configuration loaded"
    );

    let readiness = Readiness::new(config.nodes.count);

    // Start metrics server
    if config.metrics.enabled {
        let server = MetricsServer::new(config.metrics.port)?;
        init_metrics();
        let readiness = readiness.clone();
        tokio::spawn(async move {
            if let Err(e) = server.start(readiness).await {
                error!(error = %e, "Metrics server error");
            }
        });
    }

    let nodes = start_nodes(&config, &readiness).await?;

    info!(count = nodes.len(), "chunkmesh nodes running");

    let services: Vec<_> = nodes.iter().map(|n| (n.index, n.service.clone())).collect();
    let handles = nodes.into_iter().map(|n| n.handle);

    // Wait for Ctrl-C or for every listener to stop
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        results = futures::future::join_all(handles) => {
            for result in results {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(error = %e, "Node stopped"),
                    Err(e) => warn!(error = %e, "Node task ended"),
                }
            }
        }
    }

    for (index, service) in services {
        let stats = service.store().stats();
        info!(
            node = index,
            files = stats.file_count,
            bytes = stats.bytes_stored,
            chunk_reads = stats.chunk_reads,
            "Node shut down"
        );
    }

    Ok(())
}
