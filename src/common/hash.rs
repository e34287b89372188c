//! Content digests for chunkfs
//!
//! SHA-256 is the one digest in the protocol: chunk files carry it as a
//! 32-byte prefix, and retrievals recompute it over the payload.

use sha2::{Digest, Sha256};

/// Digest length in bytes (SHA-256)
pub const DIGEST_LEN: usize = 32;

/// A chunk content digest
pub type ChunkDigest = [u8; DIGEST_LEN];

/// Compute the SHA-256 digest of data
pub fn digest(data: &[u8]) -> ChunkDigest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compare data against a stored digest.
///
/// Plain equality; digests here are integrity checks, not secrets.
pub fn verify(data: &[u8], expected: &ChunkDigest) -> bool {
    digest(data) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_known_vector() {
        // SHA-256("abc")
        let expected: ChunkDigest = [
            0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae,
            0x22, 0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61,
            0xf2, 0x00, 0x15, 0xad,
        ];
        assert_eq!(digest(b"abc"), expected);
    }

    #[test]
    fn test_verify_detects_flip() {
        let data = b"some chunk payload".to_vec();
        let d = digest(&data);
        assert!(verify(&data, &d));

        let mut tampered = data.clone();
        tampered[3] ^= 0x01;
        assert!(!verify(&tampered, &d));
    }
}
