//! # chunkfs
//!
//! A chunked, replicated distributed file store with:
//! - A single metadata coordinator tracking membership and chunk placement
//! - Storage servers owning digest-verified chunk files on local disk
//! - Pipeline replication: the head replica fans writes to its tail
//! - Heartbeat-based failure detection and background re-replication
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────────────┐
//!                │         Coordinator          │
//!                │  (node registry + catalog)   │
//!                │   - placement & admission    │
//!                │   - failure detector (5s)    │
//!                │   - re-replication (60s)     │
//!                └───────┬──────────────────────┘
//!         heartbeats │   │ placements, locations
//!   ┌────────────────┤   └──────────────┐
//!   │                │                  │
//! ┌─▼──────────┐  ┌──▼─────────┐  ┌─────▼──────┐      ┌────────┐
//! │ Storage 1  │  │ Storage 2  │  │ Storage 3  │◀─────│ Client │
//! │ chunk files│─▶│ chunk files│─▶│ chunk files│ pull  └────────┘
//! └────────────┘  └────────────┘  └────────────┘
//!        pipeline store (head → tail → tail)
//! ```
//!
//! ## Usage
//!
//! ### Start the coordinator
//! ```bash
//! chunkfs-coord --port 8000
//! ```
//!
//! ### Start a storage server
//! ```bash
//! chunkfs-storage --id 8001 --controller localhost:8000 --data ./node1
//! ```
//!
//! ### Use the client shell
//! ```bash
//! chunkfs --controller localhost:8000
//! > store ./data.bin
//! > retrieve data.bin ./out.bin
//! > list
//! > status
//! ```

pub mod client;
pub mod common;
pub mod coordinator;
pub mod proto;
pub mod storage;

// Re-export commonly used types
pub use common::{Error, Result};
pub use coordinator::Coordinator;
pub use storage::StorageServer;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
