//! Configuration for chunkfs components

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default chunk size: 64 MiB
pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024 * 1024;

/// Default replication factor
pub const DEFAULT_REPLICATION: usize = 3;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bind address for the TCP listener
    pub bind_addr: SocketAddr,

    /// Target replica count per chunk
    #[serde(default = "default_replication")]
    pub replication_factor: usize,

    /// Heartbeat silence after which a node is declared dead
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,

    /// Failure-detector cadence
    #[serde(default = "default_detector_interval")]
    pub detector_interval_secs: u64,

    /// Re-replication sweep cadence
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Per-socket read/write deadline (milliseconds)
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,
}

fn default_replication() -> usize {
    DEFAULT_REPLICATION
}
fn default_heartbeat_timeout() -> u64 {
    15
}
fn default_detector_interval() -> u64 {
    5
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_io_timeout() -> u64 {
    30_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".parse().unwrap(),
            replication_factor: default_replication(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            detector_interval_secs: default_detector_interval(),
            sweep_interval_secs: default_sweep_interval(),
            io_timeout_ms: default_io_timeout(),
        }
    }
}

impl CoordinatorConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn detector_interval(&self) -> Duration {
        Duration::from_secs(self.detector_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.replication_factor == 0 {
            return Err(crate::Error::Validation(
                "replication_factor must be at least 1".into(),
            ));
        }
        if self.heartbeat_timeout_secs == 0 {
            return Err(crate::Error::Validation(
                "heartbeat_timeout_secs must be nonzero".into(),
            ));
        }
        Ok(())
    }
}

/// Storage server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bind address for the TCP listener
    pub bind_addr: SocketAddr,

    /// Identity advertised in heartbeats and dialed by peers.
    /// Derived from the bound listener address when absent (tests bind port 0).
    #[serde(default)]
    pub advertise_addr: Option<String>,

    /// Coordinator address
    pub controller_addr: String,

    /// Data directory for chunk files
    pub data_dir: PathBuf,

    /// Heartbeat cadence
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Per-socket read/write deadline (milliseconds)
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,
}

fn default_heartbeat_interval() -> u64 {
    5
}

impl StorageConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.controller_addr.is_empty() {
            return Err(crate::Error::Validation(
                "controller_addr is required".into(),
            ));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(crate::Error::Validation("data_dir is required".into()));
        }
        Ok(())
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Coordinator address
    pub controller_addr: String,

    /// Chunk size used when the store command does not name one
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Per-socket read/write deadline (milliseconds)
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,
}

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

impl ClientConfig {
    pub fn new(controller_addr: impl Into<String>) -> Self {
        Self {
            controller_addr: controller_addr.into(),
            chunk_size: default_chunk_size(),
            io_timeout_ms: default_io_timeout(),
        }
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

/// Load a config of any role from a JSON file
pub fn from_file<T: serde::de::DeserializeOwned>(
    path: impl AsRef<std::path::Path>,
) -> crate::Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| crate::Error::Validation(format!("failed to parse config: {}", e)))
}

/// Save a config of any role to a JSON file
pub fn to_file<T: Serialize>(config: &T, path: impl AsRef<std::path::Path>) -> crate::Result<()> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| crate::Error::Validation(format!("failed to serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
