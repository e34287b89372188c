//! Storage server: chunk persistence, pipeline replication, heartbeats

pub mod chunk_store;
pub mod heartbeat;
pub mod server;

pub use chunk_store::{ChunkEntry, ChunkStore};
pub use server::{StorageHandle, StorageServer};
