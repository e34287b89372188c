//! Error types for chunkfs

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Not found ===
    #[error("file {0} not found")]
    FileNotFound(String),

    #[error("chunk {filename}_{chunk} not found")]
    ChunkNotFound { filename: String, chunk: u32 },

    // === Conflict ===
    #[error("file {0} already exists")]
    FileExists(String),

    // === Capacity ===
    #[error("not enough storage nodes available (required: {required}, available: {available})")]
    InsufficientCapacity { required: usize, available: usize },

    #[error("disk full (required: {required} bytes, available: {available} bytes)")]
    DiskFull { required: u64, available: u64 },

    // === Integrity ===
    #[error("chunk {filename}_{chunk} is corrupted")]
    ChunkCorrupted { filename: String, chunk: u32 },

    // === Transport ===
    #[error("connection error to {addr}: {reason}")]
    Connection { addr: String, reason: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("operation {0} timed out")]
    Timeout(String),

    // === Pipeline ===
    #[error("downstream replica {node} failed: {reason}")]
    DownstreamFailed { node: String, reason: String },

    // === Input ===
    #[error("validation error: {0}")]
    Validation(String),

    // === Client-side aggregate ===
    #[error("transfer failed for chunks {chunks:?}: {last}")]
    TransferFailed { chunks: Vec<u32>, last: String },
}

impl Error {
    /// Should the client try the next replica after seeing this error?
    ///
    /// Integrity and availability failures are per-replica; conflicts,
    /// capacity refusals and validation errors will repeat on any replica.
    pub fn is_failover(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::ChunkNotFound { .. }
                | Error::ChunkCorrupted { .. }
                | Error::Connection { .. }
                | Error::Protocol(_)
                | Error::Timeout(_)
        )
    }

    /// Stable wire representation carried in response `error` fields.
    ///
    /// The prefix up to the first `':'` is the kind; the remainder is the
    /// human-readable detail. `from_wire` inverts the kind, not the detail.
    pub fn to_wire(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }

    /// Recover an error kind from a wire string produced by `to_wire`.
    ///
    /// Unknown prefixes land on `Protocol` so a peer speaking a newer
    /// taxonomy degrades to a non-failover transport error.
    pub fn from_wire(s: &str) -> Error {
        let (kind, detail) = match s.split_once(": ") {
            Some((k, d)) => (k, d.to_string()),
            None => (s, String::new()),
        };
        match kind {
            "FileNotFound" => Error::FileNotFound(detail),
            "ChunkNotFound" => Error::ChunkNotFound {
                filename: detail,
                chunk: 0,
            },
            "FileExists" => Error::FileExists(detail),
            "InsufficientCapacity" => Error::InsufficientCapacity {
                required: 0,
                available: 0,
            },
            "DiskFull" => Error::DiskFull {
                required: 0,
                available: 0,
            },
            "ChunkCorrupted" => Error::ChunkCorrupted {
                filename: detail,
                chunk: 0,
            },
            "ConnectionError" => Error::Connection {
                addr: String::new(),
                reason: detail,
            },
            "TimeoutError" => Error::Timeout(detail),
            "DownstreamFailed" => Error::DownstreamFailed {
                node: String::new(),
                reason: detail,
            },
            "ValidationError" => Error::Validation(detail),
            "IoError" => Error::Io(std::io::Error::new(std::io::ErrorKind::Other, detail)),
            _ => Error::Protocol(format!("{}: {}", kind, detail)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "IoError",
            Error::FileNotFound(_) => "FileNotFound",
            Error::ChunkNotFound { .. } => "ChunkNotFound",
            Error::FileExists(_) => "FileExists",
            Error::InsufficientCapacity { .. } => "InsufficientCapacity",
            Error::DiskFull { .. } => "DiskFull",
            Error::ChunkCorrupted { .. } => "ChunkCorrupted",
            Error::Connection { .. } => "ConnectionError",
            Error::Protocol(_) => "ProtocolError",
            Error::Timeout(_) => "TimeoutError",
            Error::DownstreamFailed { .. } => "DownstreamFailed",
            Error::Validation(_) => "ValidationError",
            Error::TransferFailed { .. } => "TransferFailed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip_kinds() {
        let cases: Vec<Error> = vec![
            Error::FileNotFound("a.txt".into()),
            Error::FileExists("a.txt".into()),
            Error::InsufficientCapacity {
                required: 3,
                available: 1,
            },
            Error::ChunkCorrupted {
                filename: "a.txt".into(),
                chunk: 2,
            },
            Error::DownstreamFailed {
                node: "localhost:8002".into(),
                reason: "connection refused".into(),
            },
            Error::Validation("empty filename".into()),
        ];

        for err in cases {
            let wire = err.to_wire();
            let back = Error::from_wire(&wire);
            assert_eq!(back.kind(), err.kind(), "wire was {}", wire);
        }
    }

    #[test]
    fn test_unknown_kind_is_protocol() {
        let back = Error::from_wire("SomethingNew: details");
        assert!(matches!(back, Error::Protocol(_)));
    }

    #[test]
    fn test_failover_classification() {
        assert!(Error::ChunkCorrupted {
            filename: "f".into(),
            chunk: 0
        }
        .is_failover());
        assert!(Error::Connection {
            addr: "x".into(),
            reason: "refused".into()
        }
        .is_failover());
        assert!(!Error::FileExists("f".into()).is_failover());
        assert!(!Error::InsufficientCapacity {
            required: 3,
            available: 2
        }
        .is_failover());
    }
}
