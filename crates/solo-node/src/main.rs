//! Solo Node - single-leader development chain.

use anyhow::Context;
use clap::Parser;
use solo_node::logging::{init_logging, LogFormat};
use solo_node::{Node, NodeConfig};
use std::path::PathBuf;

/// Solo Node - produces blocks on a fixed interval with a single leader
#[derive(Parser, Debug)]
#[command(name = "solo-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error), overrides the file
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(level) = args.log_level {
        config.log_level = level;
        config.validate()?;
    }

    init_logging(&config.log_level, LogFormat::parse(&config.log_format));
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting solo node");

    let node = Node::launch(&config).await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");

    node.shutdown().await?;
    Ok(())
}
