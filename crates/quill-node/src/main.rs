//! Quill Node - proposal version control over HTTP.

use anyhow::Context;
use clap::Parser;
use quill_node::{config::Config, observability::init_logging, Node};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Quill Node - collaborative proposal editing
#[derive(Parser, Debug)]
#[command(name = "quill-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "quill.yaml")]
    config: PathBuf,

    /// API listen address (overrides the configuration file)
    #[arg(long)]
    api_addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(Some(&args.config))
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(addr) = args.api_addr {
        config.server.listen_addr = addr;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.json = true;
    }

    init_logging(&config.logging.level, config.logging.json);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting Quill node");
    tracing::info!(
        api_addr = %config.server.listen_addr,
        granularity = ?config.merge.granularity,
        external_index = config.sync.index_url.is_some(),
        "node configuration"
    );

    let node = Node::new(&config).context("building node")?;
    node.run(shutdown_signal()).await.context("serving HTTP API")?;

    tracing::info!("Quill node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
