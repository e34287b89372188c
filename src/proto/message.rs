//! Payload schemas and codec helpers
//!
//! Payloads are serde structs carried as bincode inside frames. Response
//! types carry an `error` field; an empty string means success and a
//! non-empty string is the stable wire form of an [`Error`](crate::Error).

use crate::common::{Error, Result};
use crate::proto::frame::{self, MsgType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

/// Liveness and telemetry from a storage server. One-way; no response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub node_id: String,
    pub free_space: u64,
    pub requests_processed: u64,
    /// Chunk file names first observed on disk since the previous heartbeat
    pub new_files: Vec<String>,
}

/// Client → coordinator: admit a new file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageRequest {
    pub filename: String,
    pub file_size: u64,
    pub chunk_size: u32,
}

/// Ordered replica set for one chunk, head first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPlacement {
    pub chunk_number: u32,
    pub storage_nodes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageResponse {
    pub chunk_placements: Vec<ChunkPlacement>,
    pub error: String,
}

/// Client → coordinator: locate an existing file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkLocation {
    pub chunk_number: u32,
    pub storage_nodes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub chunks: Vec<ChunkLocation>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub filename: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub size: u64,
    pub num_chunks: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse {
    pub files: Vec<FileInfo>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStatusRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    pub node_id: String,
    pub free_space: u64,
    pub requests_processed: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStatusResponse {
    pub nodes: Vec<NodeReport>,
    pub total_space: u64,
    pub error: String,
}

/// Store a chunk on the receiving node and pipeline it down `replica_nodes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkStoreRequest {
    pub filename: String,
    pub chunk_number: u32,
    pub data: Vec<u8>,
    /// Remaining pipeline, head first; each hop consumes its own position
    pub replica_nodes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkStoreResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRetrieveRequest {
    pub filename: String,
    pub chunk_number: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkRetrieveResponse {
    pub data: Vec<u8>,
    pub error: String,
}

/// Coordinator → storage: push a locally held chunk to `targets`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkReplicateRequest {
    pub filename: String,
    pub chunk_number: u32,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkReplicateResponse {
    pub success: bool,
    pub error: String,
}

/// Coordinator → storage: drop every chunk of a deleted file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDeleteRequest {
    pub filename: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDeleteResponse {
    pub success: bool,
    pub error: String,
}

/// Encode a payload with bincode
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    bincode::serialize(msg).map_err(|e| Error::Protocol(format!("encode failed: {}", e)))
}

/// Decode a payload with bincode
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    bincode::deserialize(payload).map_err(|e| Error::Protocol(format!("decode failed: {}", e)))
}

/// Encode and send one message
pub async fn send<W, T>(writer: &mut W, msg_type: MsgType, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = encode(msg)?;
    frame::write_frame(writer, msg_type, &payload).await
}

/// Receive one message, requiring a specific type tag
pub async fn recv_expect<R, T>(reader: &mut R, expect: MsgType) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let (msg_type, payload) = frame::read_frame(reader).await?;
    if msg_type != expect {
        return Err(Error::Protocol(format!(
            "unexpected response type: {:?} (wanted {:?})",
            msg_type, expect
        )));
    }
    decode(&payload)
}

/// Turn a response `error` field into a `Result`
pub fn check_error(error: &str) -> Result<()> {
    if error.is_empty() {
        Ok(())
    } else {
        Err(Error::from_wire(error))
    }
}
