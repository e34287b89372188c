//! Storage server
//!
//! Serves chunk stores and retrievals over framed TCP, forwards pipeline
//! stores to downstream replicas, executes coordinator repair orders, and
//! heartbeats the coordinator. A store is acknowledged only when the local
//! write is durable and every downstream hop has acknowledged.

use crate::common::{validate_filename, Error, Result, StorageConfig};
use crate::proto::frame::{self, MsgType};
use crate::proto::message::{
    self, ChunkDeleteRequest, ChunkDeleteResponse, ChunkReplicateRequest, ChunkReplicateResponse,
    ChunkRetrieveRequest, ChunkRetrieveResponse, ChunkStoreRequest, ChunkStoreResponse,
};
use crate::proto::net;
use crate::storage::chunk_store::ChunkStore;
use crate::storage::heartbeat;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub struct StorageServer {
    config: StorageConfig,
}

/// A running storage server. Dropping the handle stops every task.
pub struct StorageHandle {
    pub node_id: String,
    pub addr: SocketAddr,
    pub store: Arc<ChunkStore>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for StorageHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl StorageServer {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Scan the data directory, bind, start heartbeating, and return
    pub async fn start(self) -> Result<StorageHandle> {
        self.config.validate()?;

        let store = Arc::new(ChunkStore::open(&self.config.data_dir)?);
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let addr = listener.local_addr()?;

        let node_id = match &self.config.advertise_addr {
            Some(id) => id.clone(),
            None if addr.ip().is_unspecified() => format!("127.0.0.1:{}", addr.port()),
            None => addr.to_string(),
        };

        tracing::info!("Storage node {} listening on {}", node_id, addr);
        tracing::info!("  Data dir: {}", self.config.data_dir.display());
        tracing::info!("  Coordinator: {}", self.config.controller_addr);

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(heartbeat::run(
            node_id.clone(),
            self.config.controller_addr.clone(),
            store.clone(),
            self.config.heartbeat_interval(),
            self.config.io_timeout(),
        )));
        tasks.push(tokio::spawn(accept_loop(
            listener,
            store.clone(),
            self.config.clone(),
        )));

        Ok(StorageHandle {
            node_id,
            addr,
            store,
            tasks,
        })
    }

    /// Run until the process exits
    pub async fn serve(self) -> Result<()> {
        let _handle = self.start().await?;
        std::future::pending::<()>().await;
        unreachable!()
    }
}

async fn accept_loop(listener: TcpListener, store: Arc<ChunkStore>, config: StorageConfig) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let store = store.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, store, config).await;
                });
            }
            Err(e) => {
                tracing::warn!("accept failed: {}", e);
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    store: Arc<ChunkStore>,
    config: StorageConfig,
) {
    let idle = config.io_timeout();

    loop {
        let (msg_type, payload) =
            match tokio::time::timeout(idle, frame::read_frame(&mut stream)).await {
                Err(_) => {
                    tracing::debug!("connection from {} idle, closing", peer);
                    return;
                }
                Ok(Err(Error::Io(e))) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return;
                }
                Ok(Err(e)) => {
                    tracing::debug!("connection from {} failed: {}", peer, e);
                    return;
                }
                Ok(Ok(f)) => f,
            };

        let response = match dispatch(&store, &config, msg_type, &payload).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("dropping connection from {}: {}", peer, e);
                return;
            }
        };

        let (resp_type, resp_payload) = response;
        let write = frame::write_frame(&mut stream, resp_type, &resp_payload);
        match tokio::time::timeout(config.io_timeout(), write).await {
            Err(_) | Ok(Err(_)) => {
                tracing::debug!("response to {} not delivered", peer);
                return;
            }
            Ok(Ok(())) => {}
        }
    }
}

async fn dispatch(
    store: &Arc<ChunkStore>,
    config: &StorageConfig,
    msg_type: MsgType,
    payload: &[u8],
) -> Result<(MsgType, Vec<u8>)> {
    match msg_type {
        MsgType::ChunkStore => {
            let req: ChunkStoreRequest = message::decode(payload)?;
            let response = handle_chunk_store(store, config, req).await;
            Ok((MsgType::ChunkStore, message::encode(&response)?))
        }
        MsgType::ChunkRetrieve => {
            let req: ChunkRetrieveRequest = message::decode(payload)?;
            let response = handle_chunk_retrieve(store, req).await;
            Ok((MsgType::ChunkRetrieve, message::encode(&response)?))
        }
        MsgType::ChunkReplicate => {
            let req: ChunkReplicateRequest = message::decode(payload)?;
            let response = handle_chunk_replicate(store, config, req).await;
            Ok((MsgType::ChunkReplicate, message::encode(&response)?))
        }
        MsgType::ChunkDelete => {
            let req: ChunkDeleteRequest = message::decode(payload)?;
            let response = handle_chunk_delete(store, req).await;
            Ok((MsgType::ChunkDelete, message::encode(&response)?))
        }
        other => Err(Error::Protocol(format!(
            "unexpected message type at storage node: {:?}",
            other
        ))),
    }
}

/// Store locally and forward down the pipeline at the same time; succeed
/// only when both have.
async fn handle_chunk_store(
    store: &Arc<ChunkStore>,
    config: &StorageConfig,
    req: ChunkStoreRequest,
) -> ChunkStoreResponse {
    if let Err(e) = validate_filename(&req.filename) {
        return ChunkStoreResponse {
            success: false,
            error: e.to_wire(),
        };
    }

    let data = Arc::new(req.data);
    let chunk = req.chunk_number;

    let local = {
        let store = store.clone();
        let filename = req.filename.clone();
        let data = data.clone();
        tokio::task::spawn_blocking(move || store.store(&filename, chunk, &data))
    };
    let downstream = forward_store(
        req.filename.clone(),
        chunk,
        data.clone(),
        req.replica_nodes,
        config.io_timeout(),
    );

    let (local_result, downstream_result) = tokio::join!(local, downstream);

    let result = match local_result {
        Ok(result) => result.and(downstream_result),
        Err(e) => Err(Error::Protocol(format!("store task failed: {}", e))),
    };

    match result {
        Ok(()) => ChunkStoreResponse {
            success: true,
            error: String::new(),
        },
        Err(e) => {
            tracing::warn!("chunk store {}_{} failed: {}", req.filename, chunk, e);
            ChunkStoreResponse {
                success: false,
                error: e.to_wire(),
            }
        }
    }
}

/// Send the chunk to the next hop with the rest of the pipeline as its tail.
///
/// The receive deadline scales with the remaining pipeline depth so an
/// upstream hop always outwaits the hops below it.
async fn forward_store(
    filename: String,
    chunk: u32,
    data: Arc<Vec<u8>>,
    mut pipeline: Vec<String>,
    io_timeout: Duration,
) -> Result<()> {
    if pipeline.is_empty() {
        return Ok(());
    }
    let next = pipeline.remove(0);
    let deadline = io_timeout * (pipeline.len() as u32 + 2);

    let req = ChunkStoreRequest {
        filename,
        chunk_number: chunk,
        data: data.as_ref().clone(),
        replica_nodes: pipeline,
    };

    let resp: ChunkStoreResponse = net::request(
        &next,
        MsgType::ChunkStore,
        &req,
        MsgType::ChunkStore,
        deadline,
    )
    .await
    .map_err(|e| Error::DownstreamFailed {
        node: next.clone(),
        reason: e.to_string(),
    })?;

    message::check_error(&resp.error).map_err(|e| Error::DownstreamFailed {
        node: next,
        reason: e.to_string(),
    })
}

async fn handle_chunk_retrieve(
    store: &Arc<ChunkStore>,
    req: ChunkRetrieveRequest,
) -> ChunkRetrieveResponse {
    let result = {
        let store = store.clone();
        let filename = req.filename.clone();
        tokio::task::spawn_blocking(move || store.retrieve(&filename, req.chunk_number)).await
    };

    match result {
        Ok(Ok(data)) => ChunkRetrieveResponse {
            data,
            error: String::new(),
        },
        Ok(Err(e)) => ChunkRetrieveResponse {
            data: Vec::new(),
            error: e.to_wire(),
        },
        Err(e) => ChunkRetrieveResponse {
            data: Vec::new(),
            error: Error::Protocol(format!("retrieve task failed: {}", e)).to_wire(),
        },
    }
}

/// Coordinator repair order: read the local replica and push it down a
/// pipeline of new targets.
async fn handle_chunk_replicate(
    store: &Arc<ChunkStore>,
    config: &StorageConfig,
    req: ChunkReplicateRequest,
) -> ChunkReplicateResponse {
    let read = {
        let store = store.clone();
        let filename = req.filename.clone();
        tokio::task::spawn_blocking(move || store.retrieve(&filename, req.chunk_number)).await
    };

    let data = match read {
        Ok(Ok(data)) => data,
        Ok(Err(e)) => {
            return ChunkReplicateResponse {
                success: false,
                error: e.to_wire(),
            }
        }
        Err(e) => {
            return ChunkReplicateResponse {
                success: false,
                error: Error::Protocol(format!("replicate task failed: {}", e)).to_wire(),
            }
        }
    };

    let result = forward_store(
        req.filename.clone(),
        req.chunk_number,
        Arc::new(data),
        req.targets,
        config.io_timeout(),
    )
    .await;

    match result {
        Ok(()) => {
            tracing::info!("replicated {}_{} on order", req.filename, req.chunk_number);
            ChunkReplicateResponse {
                success: true,
                error: String::new(),
            }
        }
        Err(e) => ChunkReplicateResponse {
            success: false,
            error: e.to_wire(),
        },
    }
}

async fn handle_chunk_delete(
    store: &Arc<ChunkStore>,
    req: ChunkDeleteRequest,
) -> ChunkDeleteResponse {
    let result = {
        let store = store.clone();
        let filename = req.filename.clone();
        tokio::task::spawn_blocking(move || store.remove_file(&filename)).await
    };

    match result {
        Ok(Ok(removed)) => {
            if removed > 0 {
                tracing::info!("dropped {} chunks of {}", removed, req.filename);
            }
            ChunkDeleteResponse {
                success: true,
                error: String::new(),
            }
        }
        Ok(Err(e)) => ChunkDeleteResponse {
            success: false,
            error: e.to_wire(),
        },
        Err(e) => ChunkDeleteResponse {
            success: false,
            error: Error::Protocol(format!("delete task failed: {}", e)).to_wire(),
        },
    }
}
