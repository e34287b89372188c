//! Shared test-cluster scaffolding: a real coordinator and storage servers
//! on loopback, ephemeral ports, scratch data directories.

use chunkfs::client::CoordinatorClient;
use chunkfs::common::{ClientConfig, CoordinatorConfig, StorageConfig};
use chunkfs::coordinator::{Coordinator, CoordinatorHandle};
use chunkfs::storage::{StorageHandle, StorageServer};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

pub struct ClusterSpec {
    pub nodes: usize,
    pub replication: usize,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub detector_interval_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            nodes: 3,
            replication: 3,
            heartbeat_interval_secs: 1,
            heartbeat_timeout_secs: 3,
            detector_interval_secs: 1,
            sweep_interval_secs: 2,
        }
    }
}

pub struct TestCluster {
    pub coordinator: CoordinatorHandle,
    pub nodes: Vec<Option<StorageHandle>>,
    pub dirs: Vec<TempDir>,
    pub client: CoordinatorClient,
}

pub async fn start_cluster(spec: ClusterSpec) -> TestCluster {
    let coordinator = Coordinator::new(CoordinatorConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        replication_factor: spec.replication,
        heartbeat_timeout_secs: spec.heartbeat_timeout_secs,
        detector_interval_secs: spec.detector_interval_secs,
        sweep_interval_secs: spec.sweep_interval_secs,
        io_timeout_ms: 5_000,
    })
    .start()
    .await
    .unwrap();

    let controller_addr = coordinator.addr.to_string();

    let mut nodes = Vec::new();
    let mut dirs = Vec::new();
    for _ in 0..spec.nodes {
        let dir = TempDir::new().unwrap();
        let handle = StorageServer::new(StorageConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            advertise_addr: None,
            controller_addr: controller_addr.clone(),
            data_dir: dir.path().to_path_buf(),
            heartbeat_interval_secs: spec.heartbeat_interval_secs,
            io_timeout_ms: 5_000,
        })
        .start()
        .await
        .unwrap();
        nodes.push(Some(handle));
        dirs.push(dir);
    }

    let client = CoordinatorClient::new(ClientConfig {
        controller_addr,
        chunk_size: 64 * 1024,
        io_timeout_ms: 5_000,
    });

    let cluster = TestCluster {
        coordinator,
        nodes,
        dirs,
        client,
    };
    cluster.wait_for_nodes(spec.nodes).await;
    cluster
}

impl TestCluster {
    /// Block until the coordinator's status lists exactly `expected` nodes
    pub async fn wait_for_nodes(&self, expected: usize) {
        for _ in 0..200 {
            if let Ok(status) = self.client.node_status().await {
                if status.nodes.len() == expected {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("cluster never reached {} registered nodes", expected);
    }

    /// Identity of the node at `index`
    pub fn node_id(&self, index: usize) -> String {
        self.nodes[index].as_ref().unwrap().node_id.clone()
    }

    /// Index of the node with identity `node_id`
    pub fn index_of(&self, node_id: &str) -> usize {
        self.nodes
            .iter()
            .position(|n| n.as_ref().map(|h| h.node_id.as_str()) == Some(node_id))
            .unwrap_or_else(|| panic!("no live node with id {}", node_id))
    }

    /// Stop one storage server; its data directory stays on disk
    pub fn kill(&mut self, index: usize) {
        self.nodes[index] = None;
    }

    pub fn data_dir(&self, index: usize) -> PathBuf {
        self.dirs[index].path().to_path_buf()
    }

    pub fn live_node_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .flatten()
            .map(|h| h.node_id.clone())
            .collect()
    }
}

/// Write `len` patterned bytes to `dir/name` and return the path
pub async fn write_input(dir: &TempDir, name: &str, len: usize) -> PathBuf {
    let path = dir.path().join(name);
    let contents: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    tokio::fs::write(&path, &contents).await.unwrap();
    path
}
