//! Coordinator binary

use anyhow::Result;
use chunkfs::common::{config, CoordinatorConfig};
use chunkfs::Coordinator;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "chunkfs-coord")]
#[command(about = "chunkfs metadata coordinator")]
#[command(version)]
struct Args {
    /// JSON config file; when given, the other tuning flags are ignored
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Target replica count per chunk
    #[arg(long, default_value = "3")]
    replication: usize,

    /// Heartbeat silence (seconds) after which a node is declared dead
    #[arg(long, default_value = "15")]
    heartbeat_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &args.config {
        Some(path) => config::from_file(path)?,
        None => CoordinatorConfig {
            bind_addr: format!("0.0.0.0:{}", args.port).parse()?,
            replication_factor: args.replication,
            heartbeat_timeout_secs: args.heartbeat_timeout,
            ..Default::default()
        },
    };

    Coordinator::new(config).serve().await?;
    Ok(())
}
