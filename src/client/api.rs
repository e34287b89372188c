//! Request plumbing for the client
//!
//! Thin one-shot request/response calls to the coordinator and to storage
//! nodes. The client owns no durable state; every call opens a fresh
//! connection and closes it.

use crate::common::{ClientConfig, Result};
use crate::proto::frame::MsgType;
use crate::proto::message::{
    check_error, ChunkLocation, ChunkPlacement, ChunkRetrieveRequest, ChunkRetrieveResponse,
    ChunkStoreRequest, ChunkStoreResponse, DeleteRequest, DeleteResponse, FileInfo, ListRequest,
    ListResponse, NodeStatusRequest, NodeStatusResponse, RetrievalRequest, RetrievalResponse,
    StorageRequest, StorageResponse,
};
use crate::proto::net;
use std::time::Duration;

/// Client handle on the coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    config: ClientConfig,
}

impl CoordinatorClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Admit a file and get its per-chunk placements, head first
    pub async fn request_placement(
        &self,
        filename: &str,
        file_size: u64,
        chunk_size: u32,
    ) -> Result<Vec<ChunkPlacement>> {
        let req = StorageRequest {
            filename: filename.to_string(),
            file_size,
            chunk_size,
        };
        let resp: StorageResponse = self
            .call(MsgType::StorageRequest, &req, MsgType::StorageResponse)
            .await?;
        check_error(&resp.error)?;

        let mut placements = resp.chunk_placements;
        placements.sort_by_key(|p| p.chunk_number);
        Ok(placements)
    }

    /// Current replica locations for every chunk of a file
    pub async fn locate(&self, filename: &str) -> Result<Vec<ChunkLocation>> {
        let req = RetrievalRequest {
            filename: filename.to_string(),
        };
        let resp: RetrievalResponse = self
            .call(MsgType::RetrievalRequest, &req, MsgType::RetrievalResponse)
            .await?;
        check_error(&resp.error)?;

        let mut chunks = resp.chunks;
        chunks.sort_by_key(|c| c.chunk_number);
        Ok(chunks)
    }

    pub async fn delete(&self, filename: &str) -> Result<()> {
        let req = DeleteRequest {
            filename: filename.to_string(),
        };
        let resp: DeleteResponse = self
            .call(MsgType::DeleteRequest, &req, MsgType::DeleteResponse)
            .await?;
        check_error(&resp.error)
    }

    pub async fn list(&self) -> Result<Vec<FileInfo>> {
        let resp: ListResponse = self
            .call(MsgType::ListRequest, &ListRequest {}, MsgType::ListResponse)
            .await?;
        check_error(&resp.error)?;
        Ok(resp.files)
    }

    pub async fn node_status(&self) -> Result<NodeStatusResponse> {
        let resp: NodeStatusResponse = self
            .call(
                MsgType::NodeStatusRequest,
                &NodeStatusRequest {},
                MsgType::NodeStatusResponse,
            )
            .await?;
        check_error(&resp.error)?;
        Ok(resp)
    }

    async fn call<Req, Resp>(&self, req_type: MsgType, req: &Req, resp_type: MsgType) -> Result<Resp>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        net::request(
            &self.config.controller_addr,
            req_type,
            req,
            resp_type,
            self.config.io_timeout(),
        )
        .await
    }
}

/// Push one chunk to the head of its placement list; `pipeline` is the tail
/// the head will fan out to.
pub async fn store_chunk(
    node: &str,
    filename: &str,
    chunk: u32,
    data: Vec<u8>,
    pipeline: Vec<String>,
    io_timeout: Duration,
) -> Result<()> {
    // Outwait the whole pipeline below the head.
    let deadline = io_timeout * (pipeline.len() as u32 + 2);
    let req = ChunkStoreRequest {
        filename: filename.to_string(),
        chunk_number: chunk,
        data,
        replica_nodes: pipeline,
    };
    let resp: ChunkStoreResponse = net::request(
        node,
        MsgType::ChunkStore,
        &req,
        MsgType::ChunkStore,
        deadline,
    )
    .await?;
    check_error(&resp.error)
}

/// Pull one chunk from a single replica
pub async fn retrieve_chunk(
    node: &str,
    filename: &str,
    chunk: u32,
    io_timeout: Duration,
) -> Result<Vec<u8>> {
    let req = ChunkRetrieveRequest {
        filename: filename.to_string(),
        chunk_number: chunk,
    };
    let resp: ChunkRetrieveResponse = net::request(
        node,
        MsgType::ChunkRetrieve,
        &req,
        MsgType::ChunkRetrieve,
        io_timeout,
    )
    .await?;
    check_error(&resp.error)?;
    Ok(resp.data)
}
