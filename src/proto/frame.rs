//! Message framing
//!
//! Every message on the wire is `[type: 1 byte][length: 4 bytes, big-endian]
//! [payload: length bytes]`. Reads are full-length; a short read, an unknown
//! type tag, or an oversized length is fatal to the connection.

use crate::common::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame's payload. Chunks default to 64 MiB; the
/// bound leaves headroom for larger configured chunk sizes without letting a
/// bad header allocate unbounded memory.
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// Wire message type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Heartbeat = 1,
    StorageRequest = 2,
    StorageResponse = 3,
    RetrievalRequest = 4,
    RetrievalResponse = 5,
    DeleteRequest = 6,
    DeleteResponse = 7,
    ListRequest = 8,
    ListResponse = 9,
    NodeStatusRequest = 10,
    NodeStatusResponse = 11,
    /// Request and response share the tag
    ChunkStore = 12,
    /// Request and response share the tag
    ChunkRetrieve = 13,
    /// Coordinator-directed repair order; request and response share the tag
    ChunkReplicate = 14,
    /// Delete propagation; request and response share the tag
    ChunkDelete = 15,
}

impl MsgType {
    pub fn from_u8(tag: u8) -> Option<MsgType> {
        match tag {
            1 => Some(MsgType::Heartbeat),
            2 => Some(MsgType::StorageRequest),
            3 => Some(MsgType::StorageResponse),
            4 => Some(MsgType::RetrievalRequest),
            5 => Some(MsgType::RetrievalResponse),
            6 => Some(MsgType::DeleteRequest),
            7 => Some(MsgType::DeleteResponse),
            8 => Some(MsgType::ListRequest),
            9 => Some(MsgType::ListResponse),
            10 => Some(MsgType::NodeStatusRequest),
            11 => Some(MsgType::NodeStatusResponse),
            12 => Some(MsgType::ChunkStore),
            13 => Some(MsgType::ChunkRetrieve),
            14 => Some(MsgType::ChunkReplicate),
            15 => Some(MsgType::ChunkDelete),
            _ => None,
        }
    }
}

/// Write one frame
pub async fn write_frame<W>(writer: &mut W, msg_type: MsgType, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(Error::Protocol(format!(
            "outgoing frame of {} bytes exceeds limit",
            payload.len()
        )));
    }

    let mut header = [0u8; 5];
    header[0] = msg_type as u8;
    header[1..].copy_from_slice(&(payload.len() as u32).to_be_bytes());

    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame
pub async fn read_frame<R>(reader: &mut R) -> Result<(MsgType, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 5];
    reader.read_exact(&mut header).await?;

    let msg_type = MsgType::from_u8(header[0])
        .ok_or_else(|| Error::Protocol(format!("unknown message type: {}", header[0])))?;
    let length = u32::from_be_bytes(header[1..].try_into().unwrap());

    if length > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!(
            "incoming frame of {} bytes exceeds limit",
            length
        )));
    }

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await?;

    Ok((msg_type, payload))
}
