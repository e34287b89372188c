//! Store and retrieve workflows
//!
//! Files are split into fixed-size chunks read by offset; chunks move in
//! parallel, one task each. A store succeeds only when every chunk landed on
//! its full pipeline; a retrieve tries each replica in placement order and
//! fails over on per-replica errors.

use crate::client::api::{self, CoordinatorClient};
use crate::common::{validate_filename, Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::task::JoinSet;

/// Outcome of a successful store
#[derive(Debug, Clone)]
pub struct StoreReport {
    pub filename: String,
    pub size: u64,
    pub chunks: u32,
}

/// Outcome of a successful retrieve
#[derive(Debug, Clone)]
pub struct RetrieveReport {
    pub filename: String,
    pub size: u64,
    pub chunks: u32,
}

/// Split a local file and push every chunk to its placement pipeline.
///
/// The file name in the store is the path's base name. Failures are
/// aggregated into one error naming every failing chunk index.
pub async fn store_file(
    client: &CoordinatorClient,
    path: &Path,
    chunk_size: u32,
) -> Result<StoreReport> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Validation(format!("invalid path {:?}", path)))?
        .to_string();
    validate_filename(&filename)?;

    let size = tokio::fs::metadata(path).await?.len();

    let placements = client
        .request_placement(&filename, size, chunk_size)
        .await?;

    let io_timeout = client.config().io_timeout();
    let mut tasks: JoinSet<(u32, Result<()>)> = JoinSet::new();
    for placement in placements {
        let path = path.to_path_buf();
        let filename = filename.clone();
        let chunk = placement.chunk_number;
        let mut nodes = placement.storage_nodes;

        tasks.spawn(async move {
            let result = async {
                let data = read_chunk_at(&path, chunk, chunk_size, size).await?;
                if nodes.is_empty() {
                    return Err(Error::Protocol(format!("chunk {} has no placement", chunk)));
                }
                let head = nodes.remove(0);
                api::store_chunk(&head, &filename, chunk, data, nodes, io_timeout).await
            }
            .await;
            (chunk, result)
        });
    }

    let mut failed: Vec<(u32, Error)> = Vec::new();
    let mut stored = 0u32;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(()))) => stored += 1,
            Ok((chunk, Err(e))) => failed.push((chunk, e)),
            Err(e) => failed.push((u32::MAX, Error::Protocol(format!("task failed: {}", e)))),
        }
    }

    if !failed.is_empty() {
        failed.sort_by_key(|(chunk, _)| *chunk);
        let chunks: Vec<u32> = failed.iter().map(|(chunk, _)| *chunk).collect();
        let last = failed.last().map(|(_, e)| e.to_string()).unwrap_or_default();
        return Err(Error::TransferFailed { chunks, last });
    }

    Ok(StoreReport {
        filename,
        size,
        chunks: stored,
    })
}

/// Fetch every chunk in parallel with per-replica failover, then write the
/// output file in ascending chunk order.
pub async fn retrieve_file(
    client: &CoordinatorClient,
    filename: &str,
    out_path: &Path,
) -> Result<RetrieveReport> {
    let locations = client.locate(filename).await?;
    let num_chunks = locations.len() as u32;
    let io_timeout = client.config().io_timeout();

    let mut tasks: JoinSet<(u32, Result<Vec<u8>>)> = JoinSet::new();
    for location in locations {
        let filename = filename.to_string();
        let chunk = location.chunk_number;
        let nodes = location.storage_nodes;

        tasks.spawn(async move {
            let mut last: Option<Error> = None;
            for node in &nodes {
                match api::retrieve_chunk(node, &filename, chunk, io_timeout).await {
                    Ok(data) => return (chunk, Ok(data)),
                    Err(e) if e.is_failover() => {
                        tracing::debug!(
                            "chunk {} from {} failed ({}), trying next replica",
                            chunk,
                            node,
                            e
                        );
                        last = Some(e);
                    }
                    Err(e) => return (chunk, Err(e)),
                }
            }
            let last = last.unwrap_or_else(|| {
                Error::Protocol(format!("chunk {} has no replicas", chunk))
            });
            (chunk, Err(last))
        });
    }

    let mut chunks: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
    let mut failed: Vec<(u32, Error)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((chunk, Ok(data))) => {
                chunks.insert(chunk, data);
            }
            Ok((chunk, Err(e))) => failed.push((chunk, e)),
            Err(e) => failed.push((u32::MAX, Error::Protocol(format!("task failed: {}", e)))),
        }
    }

    if !failed.is_empty() {
        failed.sort_by_key(|(chunk, _)| *chunk);
        let indexes: Vec<u32> = failed.iter().map(|(chunk, _)| *chunk).collect();
        let last = failed.last().map(|(_, e)| e.to_string()).unwrap_or_default();
        return Err(Error::TransferFailed {
            chunks: indexes,
            last,
        });
    }

    let mut out = tokio::fs::File::create(out_path).await?;
    let mut size = 0u64;
    for (_, data) in &chunks {
        out.write_all(data).await?;
        size += data.len() as u64;
    }
    out.flush().await?;

    Ok(RetrieveReport {
        filename: filename.to_string(),
        size,
        chunks: num_chunks,
    })
}

/// Read chunk `chunk` of the file by offset; the last chunk may be short.
async fn read_chunk_at(path: &Path, chunk: u32, chunk_size: u32, file_size: u64) -> Result<Vec<u8>> {
    let offset = chunk as u64 * chunk_size as u64;
    let remaining = file_size.saturating_sub(offset);
    let len = remaining.min(chunk_size as u64) as usize;

    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;

    let mut data = vec![0u8; len];
    file.read_exact(&mut data).await?;
    Ok(data)
}
