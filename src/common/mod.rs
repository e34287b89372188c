//! Common utilities and types shared across chunkfs

pub mod config;
pub mod error;
pub mod hash;
pub mod utils;

pub use config::{
    ClientConfig, CoordinatorConfig, StorageConfig, DEFAULT_CHUNK_SIZE, DEFAULT_REPLICATION,
};
pub use error::{Error, Result};
pub use hash::{digest, verify, ChunkDigest, DIGEST_LEN};
pub use utils::{
    available_disk_space, chunk_count, chunk_file_name, format_bytes, parse_chunk_file_name,
    validate_filename,
};
