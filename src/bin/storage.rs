//! Storage server binary

use anyhow::{bail, Result};
use chunkfs::common::{config, StorageConfig};
use chunkfs::StorageServer;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "chunkfs-storage")]
#[command(about = "chunkfs storage node")]
#[command(version)]
struct Args {
    /// JSON config file; when given, the other node flags are ignored
    #[arg(long)]
    config: Option<PathBuf>,

    /// Node ID: the listen port, or a full host:port identity
    #[arg(long, required_unless_present = "config")]
    id: Option<String>,

    /// Coordinator address
    #[arg(long, default_value = "localhost:8000")]
    controller: String,

    /// Data directory for chunk files
    #[arg(long, required_unless_present = "config")]
    data: Option<PathBuf>,

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
        None => {
            let (Some(id), Some(data)) = (args.id.as_deref(), args.data.clone()) else {
                bail!("--id and --data are required without --config");
            };

            // A bare port doubles as the identity; a host:port is advertised as-is.
            let (bind_addr, advertise_addr) = if let Some((_, port)) = id.rsplit_once(':') {
                let port: u16 = port.parse()?;
                (format!("0.0.0.0:{}", port), Some(id.to_string()))
            } else {
                match id.parse::<u16>() {
                    Ok(port) => (format!("0.0.0.0:{}", port), None),
                    Err(_) => bail!("--id must be a port or host:port, got {:?}", id),
                }
            };

            StorageConfig {
                bind_addr: bind_addr.parse()?,
                advertise_addr,
                controller_addr: args.controller,
                data_dir: data,
                heartbeat_interval_secs: 5,
                io_timeout_ms: 30_000,
            }
        }
    };

    StorageServer::new(config).serve().await?;
    Ok(())
}
