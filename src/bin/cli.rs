//! Interactive client shell

use anyhow::Result;
use chunkfs::client::{self, CoordinatorClient};
use chunkfs::common::{format_bytes, ClientConfig};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "chunkfs")]
#[command(about = "chunkfs client shell")]
#[command(version)]
struct Args {
    /// Coordinator address
    #[arg(long, default_value = "localhost:8000")]
    controller: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

const HELP: &str = "\
Commands:
  store <path> [chunk_size]      split and store a local file
  retrieve <name> <out_path>     reassemble a stored file
  list                           list stored files
  delete <name>                  delete a stored file
  status                         show storage node status
  exit";

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

    let config = ClientConfig::new(args.controller);
    let default_chunk_size = config.chunk_size;
    let client = CoordinatorClient::new(config);

    println!("chunkfs {} (type a command, or `exit`)", chunkfs::VERSION);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "store" => {
                if parts.len() < 2 || parts.len() > 3 {
                    println!("Usage: store <path> [chunk_size]");
                    continue;
                }
                let chunk_size = match parts.get(2) {
                    Some(raw) => match raw.parse::<u32>() {
                        Ok(size) if size > 0 => size,
                        _ => {
                            println!("Invalid chunk size: {}", raw);
                            continue;
                        }
                    },
                    None => default_chunk_size,
                };
                match client::store_file(&client, &PathBuf::from(parts[1]), chunk_size).await {
                    Ok(report) => println!(
                        "Stored {} ({}, {} chunks)",
                        report.filename,
                        format_bytes(report.size),
                        report.chunks
                    ),
                    Err(e) => println!("store failed: {}", e),
                }
            }

            "retrieve" => {
                if parts.len() != 3 {
                    println!("Usage: retrieve <name> <out_path>");
                    continue;
                }
                match client::retrieve_file(&client, parts[1], &PathBuf::from(parts[2])).await {
                    Ok(report) => println!(
                        "Retrieved {} ({}, {} chunks) to {}",
                        report.filename,
                        format_bytes(report.size),
                        report.chunks,
                        parts[2]
                    ),
                    Err(e) => println!("retrieve failed: {}", e),
                }
            }

            "list" => match client.list().await {
                Ok(files) => {
                    println!("Name\tSize\tChunks");
                    println!("----\t----\t------");
                    for file in files {
                        println!("{}\t{}\t{}", file.filename, file.size, file.num_chunks);
                    }
                }
                Err(e) => println!("list failed: {}", e),
            },

            "delete" => {
                if parts.len() != 2 {
                    println!("Usage: delete <name>");
                    continue;
                }
                match client.delete(parts[1]).await {
                    Ok(()) => println!("Deleted {}", parts[1]),
                    Err(e) => println!("delete failed: {}", e),
                }
            }

            "status" => match client.node_status().await {
                Ok(status) => {
                    println!("Node ID\tFree Space\tRequests Handled");
                    println!("-------\t----------\t----------------");
                    for node in &status.nodes {
                        println!(
                            "{}\t{}\t{}",
                            node.node_id,
                            format_bytes(node.free_space),
                            node.requests_processed
                        );
                    }
                    println!("\nTotal available space: {}", format_bytes(status.total_space));
                }
                Err(e) => println!("status failed: {}", e),
            },

            "help" => println!("{}", HELP),

            "exit" | "quit" => break,

            other => println!("Unknown command: {} (try `help`)", other),
        }
    }

    Ok(())
}
