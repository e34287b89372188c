//! Heartbeat producer
//!
//! Every cycle the storage server reports identity, free space, the served
//! counter and any chunk files newly observed on disk. The connection to the
//! coordinator is reused across beats; a send failure drops it, requeues the
//! unreported file names and retries on the next cycle. Heartbeat failures
//! never shut the server down.

use crate::proto::frame::MsgType;
use crate::proto::message::Heartbeat;
use crate::proto::net;
use crate::storage::chunk_store::ChunkStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

pub async fn run(
    node_id: String,
    controller_addr: String,
    store: Arc<ChunkStore>,
    interval: Duration,
    io_timeout: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut conn: Option<TcpStream> = None;

    loop {
        ticker.tick().await;

        let free_space = match store.free_space() {
            Ok(free) => free,
            Err(e) => {
                tracing::warn!("free-space probe failed: {}", e);
                0
            }
        };
        let (requests_processed, new_files) = store.heartbeat_sample();

        let heartbeat = Heartbeat {
            node_id: node_id.clone(),
            free_space,
            requests_processed,
            new_files: new_files.clone(),
        };

        if conn.is_none() {
            match net::connect(&controller_addr, io_timeout).await {
                Ok(stream) => conn = Some(stream),
                Err(e) => {
                    tracing::warn!("heartbeat connect to {} failed: {}", controller_addr, e);
                    store.requeue_report(new_files);
                    continue;
                }
            }
        }

        let stream = conn.as_mut().unwrap();
        if let Err(e) = net::send_timed(stream, MsgType::Heartbeat, &heartbeat, io_timeout).await {
            tracing::warn!("heartbeat send failed, reconnecting next cycle: {}", e);
            conn = None;
            store.requeue_report(new_files);
        }
    }
}
