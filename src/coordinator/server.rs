//! Coordinator server
//!
//! Accepts framed TCP connections from clients and storage servers, owns the
//! node registry and file catalog behind one reader/writer lock, and runs the
//! failure detector and re-replication sweep as periodic tasks. The lock is
//! never held across network I/O: repair and delete propagation snapshot what
//! they need, drop the lock, then talk to storage servers.

use crate::common::{chunk_count, validate_filename, CoordinatorConfig, Error, Result};
use crate::coordinator::catalog::{Catalog, FileRecord};
use crate::coordinator::placement;
use crate::coordinator::registry::NodeRegistry;
use crate::proto::frame::{self, MsgType};
use crate::proto::message::{
    ChunkDeleteRequest, ChunkDeleteResponse, ChunkPlacement, ChunkReplicateRequest,
    ChunkReplicateResponse, DeleteRequest, DeleteResponse, Heartbeat, ListResponse,
    NodeStatusResponse, RetrievalRequest, RetrievalResponse, StorageRequest, StorageResponse,
};
use crate::proto::{message, net};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Registry and catalog under the coordinator's single lock
#[derive(Debug, Default)]
pub struct ClusterState {
    pub registry: NodeRegistry,
    pub catalog: Catalog,
}

type Shared = Arc<RwLock<ClusterState>>;

/// A directed re-replication order: `source` pushes the chunk to `add`,
/// and on acknowledgment the catalog list becomes `keep ∪ add`.
#[derive(Debug, Clone)]
struct RepairOrder {
    filename: String,
    chunk: u32,
    source: String,
    keep: Vec<String>,
    add: Vec<String>,
}

pub struct Coordinator {
    config: CoordinatorConfig,
    state: Shared,
}

/// A running coordinator. Dropping the handle stops every task.
pub struct CoordinatorHandle {
    pub addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ClusterState::default())),
        }
    }

    /// Bind, spawn the accept loop and background tasks, and return
    pub async fn start(self) -> Result<CoordinatorHandle> {
        self.config.validate()?;

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let addr = listener.local_addr()?;

        tracing::info!("Coordinator listening on {}", addr);
        tracing::info!("  Replication factor: {}", self.config.replication_factor);
        tracing::info!(
            "  Heartbeat timeout: {}s, sweep every {}s",
            self.config.heartbeat_timeout_secs,
            self.config.sweep_interval_secs
        );

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(run_failure_detector(
            self.state.clone(),
            self.config.clone(),
        )));
        tasks.push(tokio::spawn(run_replication_sweep(
            self.state.clone(),
            self.config.clone(),
        )));
        tasks.push(tokio::spawn(accept_loop(
            listener,
            self.state.clone(),
            self.config.clone(),
        )));

        Ok(CoordinatorHandle { addr, tasks })
    }

    /// Run until the process exits
    pub async fn serve(self) -> Result<()> {
        let _handle = self.start().await?;
        std::future::pending::<()>().await;
        unreachable!()
    }
}

async fn accept_loop(listener: TcpListener, state: Shared, config: CoordinatorConfig) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let state = state.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, state, config).await;
                });
            }
            Err(e) => {
                tracing::warn!("accept failed: {}", e);
            }
        }
    }
}

/// Service one connection until it closes, errors, or goes idle.
///
/// A single connection may carry many sequential requests; heartbeat
/// connections stay open between 5s beats, so the idle allowance is a
/// multiple of the heartbeat timeout rather than the plain I/O deadline.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    state: Shared,
    config: CoordinatorConfig,
) {
    let idle = config.io_timeout().max(config.heartbeat_timeout() * 5);

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

        let response = match dispatch(&state, &config, msg_type, &payload) {
            Ok(response) => response,
            Err(e) => {
                // Malformed payloads and unexpected tags are fatal to the
                // connection but never to cluster state.
                tracing::warn!("dropping connection from {}: {}", peer, e);
                return;
            }
        };

        if let Some((resp_type, resp_payload)) = response {
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
}

/// Handle one request; `None` means no response (heartbeats)
fn dispatch(
    state: &Shared,
    config: &CoordinatorConfig,
    msg_type: MsgType,
    payload: &[u8],
) -> Result<Option<(MsgType, Vec<u8>)>> {
    match msg_type {
        MsgType::Heartbeat => {
            handle_heartbeat(state, payload)?;
            Ok(None)
        }
        MsgType::StorageRequest => {
            let response = handle_storage_request(state, config, payload)?;
            Ok(Some((MsgType::StorageResponse, message::encode(&response)?)))
        }
        MsgType::RetrievalRequest => {
            let response = handle_retrieval_request(state, payload)?;
            Ok(Some((
                MsgType::RetrievalResponse,
                message::encode(&response)?,
            )))
        }
        MsgType::DeleteRequest => {
            let response = handle_delete_request(state, config, payload)?;
            Ok(Some((MsgType::DeleteResponse, message::encode(&response)?)))
        }
        MsgType::ListRequest => {
            let guard = state.read().unwrap();
            let response = ListResponse {
                files: guard.catalog.list(),
                error: String::new(),
            };
            drop(guard);
            Ok(Some((MsgType::ListResponse, message::encode(&response)?)))
        }
        MsgType::NodeStatusRequest => {
            let guard = state.read().unwrap();
            let (nodes, total_space) = guard.registry.reports();
            drop(guard);
            let response = NodeStatusResponse {
                nodes,
                total_space,
                error: String::new(),
            };
            Ok(Some((
                MsgType::NodeStatusResponse,
                message::encode(&response)?,
            )))
        }
        other => Err(Error::Protocol(format!(
            "unexpected message type at coordinator: {:?}",
            other
        ))),
    }
}

fn handle_heartbeat(state: &Shared, payload: &[u8]) -> Result<()> {
    let hb: Heartbeat = message::decode(payload)?;

    let is_new = {
        let mut guard = state.write().unwrap();
        guard.registry.observe_heartbeat(
            &hb.node_id,
            hb.free_space,
            hb.requests_processed,
            Instant::now(),
        )
    };

    if is_new {
        tracing::info!("new node joined: {}", hb.node_id);
    }
    for filename in &hb.new_files {
        // Informational; reports for files the catalog no longer knows
        // (missed delete propagation) are ignored.
        tracing::debug!("node {} reported chunk file {}", hb.node_id, filename);
    }
    Ok(())
}

fn handle_storage_request(
    state: &Shared,
    config: &CoordinatorConfig,
    payload: &[u8],
) -> Result<StorageResponse> {
    let req: StorageRequest = message::decode(payload)?;

    match admit_file(state, config, &req) {
        Ok(placements) => Ok(StorageResponse {
            chunk_placements: placements,
            error: String::new(),
        }),
        Err(e) => Ok(StorageResponse {
            chunk_placements: Vec::new(),
            error: e.to_wire(),
        }),
    }
}

/// Admit a file: pick R nodes per chunk and install the record atomically.
/// Any per-chunk capacity failure aborts the whole admission.
fn admit_file(
    state: &Shared,
    config: &CoordinatorConfig,
    req: &StorageRequest,
) -> Result<Vec<ChunkPlacement>> {
    validate_filename(&req.filename)?;
    if req.chunk_size == 0 {
        return Err(Error::Validation("chunk_size must be nonzero".into()));
    }
    let num_chunks = chunk_count(req.file_size, req.chunk_size);
    if num_chunks > u32::MAX as u64 {
        return Err(Error::Validation(format!(
            "file would need {} chunks",
            num_chunks
        )));
    }

    let mut guard = state.write().unwrap();
    let ClusterState { registry, catalog } = &mut *guard;

    if catalog.contains(&req.filename) {
        return Err(Error::FileExists(req.filename.clone()));
    }

    let none = HashSet::new();
    let mut placements = Vec::with_capacity(num_chunks as usize);
    let mut chunks = BTreeMap::new();
    for chunk in 0..num_chunks as u32 {
        let nodes = placement::select_nodes(
            registry,
            req.chunk_size as u64,
            config.replication_factor,
            &none,
        )?;
        chunks.insert(chunk, nodes.clone());
        placements.push(ChunkPlacement {
            chunk_number: chunk,
            storage_nodes: nodes,
        });
    }

    catalog.admit(
        &req.filename,
        FileRecord {
            size: req.file_size,
            chunk_size: req.chunk_size,
            chunks,
        },
    )?;

    tracing::info!(
        "admitted {} ({} bytes, {} chunks)",
        req.filename,
        req.file_size,
        num_chunks
    );
    Ok(placements)
}

fn handle_retrieval_request(state: &Shared, payload: &[u8]) -> Result<RetrievalResponse> {
    let req: RetrievalRequest = message::decode(payload)?;

    let located = {
        let guard = state.read().unwrap();
        guard.catalog.locate(&req.filename)
    };

    match located {
        Ok(chunks) => Ok(RetrievalResponse {
            chunks,
            error: String::new(),
        }),
        Err(e) => Ok(RetrievalResponse {
            chunks: Vec::new(),
            error: e.to_wire(),
        }),
    }
}

fn handle_delete_request(
    state: &Shared,
    config: &CoordinatorConfig,
    payload: &[u8],
) -> Result<DeleteResponse> {
    let req: DeleteRequest = message::decode(payload)?;

    let removed = {
        let mut guard = state.write().unwrap();
        guard.catalog.remove(&req.filename)
    };

    match removed {
        Ok(record) => {
            let mut holders: HashSet<String> = HashSet::new();
            for nodes in record.chunks.values() {
                holders.extend(nodes.iter().cloned());
            }
            tracing::info!("deleted {} ({} chunks)", req.filename, record.chunks.len());

            // Best-effort chunk cleanup; leaked chunks are tolerated.
            let filename = req.filename.clone();
            let io_timeout = config.io_timeout();
            tokio::spawn(async move {
                propagate_delete(holders, filename, io_timeout).await;
            });

            Ok(DeleteResponse {
                success: true,
                error: String::new(),
            })
        }
        Err(e) => Ok(DeleteResponse {
            success: false,
            error: e.to_wire(),
        }),
    }
}

async fn propagate_delete(holders: HashSet<String>, filename: String, io_timeout: Duration) {
    for node in holders {
        let req = ChunkDeleteRequest {
            filename: filename.clone(),
        };
        let result = net::request::<_, ChunkDeleteResponse>(
            &node,
            MsgType::ChunkDelete,
            &req,
            MsgType::ChunkDelete,
            io_timeout,
        )
        .await;

        match result {
            Ok(resp) if resp.error.is_empty() => {
                tracing::debug!("node {} dropped chunks of {}", node, filename);
            }
            Ok(resp) => {
                tracing::debug!("node {} kept chunks of {}: {}", node, filename, resp.error);
            }
            Err(e) => {
                tracing::debug!("delete propagation to {} skipped: {}", node, e);
            }
        }
    }
}

/// Periodic task: drop nodes past the heartbeat timeout, then schedule
/// repairs for every chunk that named them.
async fn run_failure_detector(state: Shared, config: CoordinatorConfig) {
    let mut ticker = tokio::time::interval(config.detector_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let orders = {
            let mut guard = state.write().unwrap();
            let dead = guard
                .registry
                .expire(Instant::now(), config.heartbeat_timeout());
            if dead.is_empty() {
                continue;
            }
            for node in &dead {
                tracing::warn!("node {} missed heartbeats, removed from registry", node);
            }
            if dead.iter().any(|node| guard.catalog.names_node(node)) {
                plan_repairs(&guard, config.replication_factor)
            } else {
                Vec::new()
            }
        };

        dispatch_repairs(&state, &config, orders);
    }
}

/// Periodic task: restore any chunk below the replication target,
/// independent of failure-driven repairs.
async fn run_replication_sweep(state: Shared, config: CoordinatorConfig) {
    let mut ticker = tokio::time::interval(config.sweep_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval() fires immediately; nothing is under-replicated before the
    // first admission, so let the first tick pass like any other.

    loop {
        ticker.tick().await;

        let orders = {
            let guard = state.read().unwrap();
            plan_repairs(&guard, config.replication_factor)
        };

        dispatch_repairs(&state, &config, orders);
    }
}

/// Compute repair orders from a consistent view of the cluster.
///
/// Orders are advisory: targets are recomputed from current membership on
/// every pass, so duplicate or stale orders converge to the same outcome.
fn plan_repairs(state: &ClusterState, target: usize) -> Vec<RepairOrder> {
    let live: HashSet<String> = state
        .registry
        .records()
        .map(|n| n.node_id.clone())
        .collect();

    state
        .catalog
        .under_replicated(&live, target)
        .into_iter()
        .filter_map(|needy| {
            if needy.live.is_empty() {
                tracing::warn!(
                    "chunk {}_{} has no live replicas, cannot repair",
                    needy.filename,
                    needy.chunk
                );
                return None;
            }

            let chunk_size = state.catalog.get(&needy.filename)?.chunk_size as u64;
            let exclude: HashSet<String> = needy.live.iter().cloned().collect();
            let missing = target - needy.live.len();

            match placement::select_nodes(&state.registry, chunk_size, missing, &exclude) {
                Ok(add) => Some(RepairOrder {
                    filename: needy.filename,
                    chunk: needy.chunk,
                    source: needy.live[0].clone(),
                    keep: needy.live,
                    add,
                }),
                Err(e) => {
                    tracing::debug!(
                        "repair of {}_{} deferred: {}",
                        needy.filename,
                        needy.chunk,
                        e
                    );
                    None
                }
            }
        })
        .collect()
}

fn dispatch_repairs(state: &Shared, config: &CoordinatorConfig, orders: Vec<RepairOrder>) {
    for order in orders {
        let state = state.clone();
        let io_timeout = config.io_timeout();
        tokio::spawn(async move {
            execute_repair(state, io_timeout, order).await;
        });
    }
}

/// Push one chunk from a live source to its new targets, then rewrite the
/// catalog entry. A failed push leaves the old list for the next sweep.
async fn execute_repair(state: Shared, io_timeout: Duration, order: RepairOrder) {
    let req = ChunkReplicateRequest {
        filename: order.filename.clone(),
        chunk_number: order.chunk,
        targets: order.add.clone(),
    };

    let result = async {
        let resp = net::request::<_, ChunkReplicateResponse>(
            &order.source,
            MsgType::ChunkReplicate,
            &req,
            MsgType::ChunkReplicate,
            io_timeout,
        )
        .await?;
        message::check_error(&resp.error)
    }
    .await;

    match result {
        Ok(()) => {
            let mut replicas = order.keep.clone();
            replicas.extend(order.add.iter().cloned());
            let applied = state
                .write()
                .unwrap()
                .catalog
                .apply_repair(&order.filename, order.chunk, replicas);
            if applied {
                tracing::info!(
                    "re-replicated {}_{} via {} to {:?}",
                    order.filename,
                    order.chunk,
                    order.source,
                    order.add
                );
            }
        }
        Err(e) => {
            tracing::warn!(
                "re-replication of {}_{} via {} failed: {}",
                order.filename,
                order.chunk,
                order.source,
                e
            );
        }
    }
}
