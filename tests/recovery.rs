//! Failure detection, re-replication and corruption failover

mod support;

use chunkfs::client::{self, api};
use chunkfs::common::{Error, DIGEST_LEN};
use std::collections::HashSet;
use std::time::Duration;
use support::{start_cluster, write_input, ClusterSpec};
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn silent_node_disappears_from_status() {
    let mut cluster = start_cluster(ClusterSpec::default()).await;

    let dead_id = cluster.node_id(0);
    cluster.kill(0);

    for _ in 0..200 {
        let status = cluster.client.node_status().await.unwrap();
        let listed: Vec<&str> = status.nodes.iter().map(|n| n.node_id.as_str()).collect();
        if !listed.contains(&dead_id.as_str()) {
            assert_eq!(status.nodes.len(), 2);
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("dead node {} never left the status listing", dead_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn killed_replica_is_restored_on_live_nodes() {
    // Four nodes at R=3 leave one spare to repair onto
    let mut cluster = start_cluster(ClusterSpec {
        nodes: 4,
        ..Default::default()
    })
    .await;
    let scratch = TempDir::new().unwrap();

    let input = write_input(&scratch, "precious.bin", 40 * 1024).await;
    client::store_file(&cluster.client, &input, 16 * 1024)
        .await
        .unwrap();

    // Kill a node holding chunk 0
    let locations = cluster.client.locate("precious.bin").await.unwrap();
    let victim_id = locations[0].storage_nodes[0].clone();
    let victim_index = cluster.index_of(&victim_id);
    cluster.kill(victim_index);

    // Detector removes it, then the sweep restores three live replicas
    let mut converged = false;
    for _ in 0..300 {
        let live: HashSet<String> = cluster.live_node_ids().into_iter().collect();
        let locations = cluster.client.locate("precious.bin").await.unwrap();
        let healthy = locations.iter().all(|location| {
            let distinct: HashSet<&String> = location.storage_nodes.iter().collect();
            location.storage_nodes.len() == 3
                && distinct.len() == 3
                && location.storage_nodes.iter().all(|n| live.contains(n))
        });
        if healthy {
            converged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(converged, "replica lists never converged to 3 live nodes");

    // The repaired copies are real: the file still reads back intact
    let out = scratch.path().join("precious.out");
    client::retrieve_file(&cluster.client, "precious.bin", &out)
        .await
        .unwrap();
    assert_eq!(
        tokio::fs::read(&input).await.unwrap(),
        tokio::fs::read(&out).await.unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn corrupted_replica_fails_over() {
    let cluster = start_cluster(ClusterSpec::default()).await;
    let scratch = TempDir::new().unwrap();

    let input = write_input(&scratch, "fragile.bin", 1024 * 1024).await;
    client::store_file(&cluster.client, &input, 2 * 1024 * 1024)
        .await
        .unwrap();

    // Flip one payload byte in the first replica's chunk file
    let locations = cluster.client.locate("fragile.bin").await.unwrap();
    let dirty_id = locations[0].storage_nodes[0].clone();
    let dirty_index = cluster.index_of(&dirty_id);
    let chunk_path = cluster.data_dir(dirty_index).join("fragile.bin_0");
    let mut raw = tokio::fs::read(&chunk_path).await.unwrap();
    raw[DIGEST_LEN + 8] ^= 0x01;
    tokio::fs::write(&chunk_path, &raw).await.unwrap();

    // Direct read from the tampered replica reports corruption, no bytes
    let err = api::retrieve_chunk(&dirty_id, "fragile.bin", 0, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ChunkCorrupted { .. }), "got {:?}", err);

    // The workflow fails over to a clean replica and returns correct bytes
    let out = scratch.path().join("fragile.out");
    client::retrieve_file(&cluster.client, "fragile.bin", &out)
        .await
        .unwrap();
    assert_eq!(
        tokio::fs::read(&input).await.unwrap(),
        tokio::fs::read(&out).await.unwrap()
    );

    // The tampered file was quarantined, not served again
    assert!(!chunk_path.exists());
    assert!(cluster
        .data_dir(dirty_index)
        .join("fragile.bin_0.corrupt")
        .exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restarted_node_reports_existing_chunks() {
    let mut cluster = start_cluster(ClusterSpec::default()).await;
    let scratch = TempDir::new().unwrap();

    let input = write_input(&scratch, "durable.bin", 8 * 1024).await;
    client::store_file(&cluster.client, &input, 64 * 1024)
        .await
        .unwrap();

    // Stop a node; its chunk files stay on disk
    let dead_id = cluster.node_id(2);
    cluster.kill(2);
    assert!(cluster.data_dir(2).join("durable.bin_0").exists());

    // Wait for the detector to drop it
    for _ in 0..200 {
        let status = cluster.client.node_status().await.unwrap();
        if !status.nodes.iter().any(|n| n.node_id == dead_id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // Bring a replacement up over the same data directory
    let handle = chunkfs::StorageServer::new(chunkfs::common::StorageConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        advertise_addr: None,
        controller_addr: cluster.coordinator.addr.to_string(),
        data_dir: cluster.data_dir(2),
        heartbeat_interval_secs: 1,
        io_timeout_ms: 5_000,
    })
    .start()
    .await
    .unwrap();

    // The rescan found the chunk and the node serves it again
    assert!(handle.store.contains("durable.bin", 0));
    let data = api::retrieve_chunk(&handle.node_id, "durable.bin", 0, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(data, tokio::fs::read(&input).await.unwrap());
}
