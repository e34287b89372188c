//! On-disk chunk store
//!
//! One file per chunk, named `<filename>_<index>`: the first 32 bytes are
//! the SHA-256 of the remainder, the remainder is the payload. The chunk
//! files are the authoritative record; the in-memory index is rebuilt from a
//! directory scan on startup. Retrievals verify the digest and quarantine
//! mismatches with a `.corrupt` suffix so bad bytes are never served twice.

use crate::common::{
    available_disk_space, chunk_file_name, hash, parse_chunk_file_name, Error, Result,
    ChunkDigest, DIGEST_LEN,
};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const QUARANTINE_SUFFIX: &str = ".corrupt";

/// Metadata for one chunk held locally
#[derive(Debug, Clone)]
pub struct ChunkEntry {
    pub filename: String,
    pub chunk: u32,
    pub size: u64,
    pub digest: ChunkDigest,
}

#[derive(Debug, Default)]
struct StoreInner {
    index: HashMap<(String, u32), ChunkEntry>,
    requests_served: u64,
    /// Chunk file names not yet reported to the coordinator
    pending_report: Vec<String>,
}

/// Chunk persistence with integrity verification.
///
/// The lock covers the index, the served counter and the report queue;
/// chunk-file I/O happens outside it.
pub struct ChunkStore {
    data_dir: PathBuf,
    inner: RwLock<StoreInner>,
}

impl ChunkStore {
    /// Open a data directory, rebuilding the index from the chunk files.
    /// Every chunk found is queued for the next heartbeat report.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let mut inner = StoreInner::default();
        for entry in fs::read_dir(&data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(QUARANTINE_SUFFIX) {
                continue;
            }
            let Some((filename, chunk)) = parse_chunk_file_name(&name) else {
                continue;
            };

            match read_entry_header(&entry.path(), &filename, chunk) {
                Ok(chunk_entry) => {
                    inner.index.insert((filename, chunk), chunk_entry);
                    inner.pending_report.push(name);
                }
                Err(e) => {
                    tracing::warn!("skipping unreadable chunk file {}: {}", name, e);
                }
            }
        }

        tracing::info!(
            "chunk store opened at {} with {} chunks",
            data_dir.display(),
            inner.index.len()
        );

        Ok(Self {
            data_dir,
            inner: RwLock::new(inner),
        })
    }

    /// Durably store one chunk: digest prefix + payload, fsync before return.
    /// A partial file left by an I/O error is removed before the error
    /// propagates. Rewrites of an existing chunk are full replacements.
    pub fn store(&self, filename: &str, chunk: u32, data: &[u8]) -> Result<()> {
        let needed = (data.len() + DIGEST_LEN) as u64;
        let available = available_disk_space(&self.data_dir)?;
        if available < needed {
            return Err(Error::DiskFull {
                required: needed,
                available,
            });
        }

        let digest = hash::digest(data);
        let path = self.chunk_path(filename, chunk);

        if let Err(e) = write_chunk_file(&path, &digest, data) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        let name = chunk_file_name(filename, chunk);
        let mut inner = self.inner.write().unwrap();
        inner.index.insert(
            (filename.to_string(), chunk),
            ChunkEntry {
                filename: filename.to_string(),
                chunk,
                size: data.len() as u64,
                digest,
            },
        );
        inner.requests_served += 1;
        inner.pending_report.push(name);
        Ok(())
    }

    /// Read one chunk, verifying its digest.
    ///
    /// A mismatch quarantines the file, drops the index entry and returns
    /// `ChunkCorrupted` without the suspect bytes.
    pub fn retrieve(&self, filename: &str, chunk: u32) -> Result<Vec<u8>> {
        let path = self.chunk_path(filename, chunk);

        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ChunkNotFound {
                    filename: filename.to_string(),
                    chunk,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut stored = [0u8; DIGEST_LEN];
        if let Err(e) = file.read_exact(&mut stored) {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                return Err(e.into());
            }
            // Too short to even hold a digest: corrupt.
            drop(file);
            self.quarantine(filename, chunk, &path);
            return Err(Error::ChunkCorrupted {
                filename: filename.to_string(),
                chunk,
            });
        }

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        drop(file);

        if !hash::verify(&data, &stored) {
            self.quarantine(filename, chunk, &path);
            return Err(Error::ChunkCorrupted {
                filename: filename.to_string(),
                chunk,
            });
        }

        self.inner.write().unwrap().requests_served += 1;
        Ok(data)
    }

    /// Drop every chunk of a file. Returns how many were removed.
    pub fn remove_file(&self, filename: &str) -> Result<usize> {
        let chunks: Vec<u32> = {
            let inner = self.inner.read().unwrap();
            inner
                .index
                .keys()
                .filter(|(f, _)| f == filename)
                .map(|(_, c)| *c)
                .collect()
        };

        for chunk in &chunks {
            let path = self.chunk_path(filename, *chunk);
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }

        let mut inner = self.inner.write().unwrap();
        for chunk in &chunks {
            inner.index.remove(&(filename.to_string(), *chunk));
        }
        Ok(chunks.len())
    }

    pub fn contains(&self, filename: &str, chunk: u32) -> bool {
        self.inner
            .read()
            .unwrap()
            .index
            .contains_key(&(filename.to_string(), chunk))
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free space on the filesystem holding the data directory
    pub fn free_space(&self) -> Result<u64> {
        available_disk_space(&self.data_dir)
    }

    /// Snapshot for one heartbeat: served counter plus the drained queue of
    /// newly observed chunk files.
    pub fn heartbeat_sample(&self) -> (u64, Vec<String>) {
        let mut inner = self.inner.write().unwrap();
        let new_files = std::mem::take(&mut inner.pending_report);
        (inner.requests_served, new_files)
    }

    /// Requeue file names after a failed heartbeat so the next one carries them
    pub fn requeue_report(&self, names: Vec<String>) {
        if names.is_empty() {
            return;
        }
        let mut inner = self.inner.write().unwrap();
        let mut names = names;
        names.extend(std::mem::take(&mut inner.pending_report));
        inner.pending_report = names;
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn chunk_path(&self, filename: &str, chunk: u32) -> PathBuf {
        self.data_dir.join(chunk_file_name(filename, chunk))
    }

    fn quarantine(&self, filename: &str, chunk: u32, path: &Path) {
        tracing::warn!(
            "chunk {}_{} failed digest verification, quarantining",
            filename,
            chunk
        );
        let quarantined = path.with_file_name(format!(
            "{}{}",
            chunk_file_name(filename, chunk),
            QUARANTINE_SUFFIX
        ));
        if let Err(e) = fs::rename(path, &quarantined) {
            tracing::warn!("quarantine rename failed, removing instead: {}", e);
            let _ = fs::remove_file(path);
        }
        self.inner
            .write()
            .unwrap()
            .index
            .remove(&(filename.to_string(), chunk));
    }
}

fn write_chunk_file(path: &Path, digest: &ChunkDigest, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(digest)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

/// Read size and digest without pulling the payload (startup scan)
fn read_entry_header(path: &Path, filename: &str, chunk: u32) -> Result<ChunkEntry> {
    let len = fs::metadata(path)?.len();
    if len < DIGEST_LEN as u64 {
        return Err(Error::ChunkCorrupted {
            filename: filename.to_string(),
            chunk,
        });
    }

    let mut file = File::open(path)?;
    let mut digest = [0u8; DIGEST_LEN];
    file.read_exact(&mut digest)?;

    Ok(ChunkEntry {
        filename: filename.to_string(),
        chunk,
        size: len - DIGEST_LEN as u64,
        digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_then_retrieve() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();

        let data = b"chunk payload bytes".to_vec();
        store.store("hello.txt", 0, &data).unwrap();

        assert_eq!(store.retrieve("hello.txt", 0).unwrap(), data);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_retrieve_missing() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();

        let err = store.retrieve("nope.txt", 0).unwrap_err();
        assert!(matches!(err, Error::ChunkNotFound { .. }));
    }

    #[test]
    fn test_on_disk_layout() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();

        let data = b"payload".to_vec();
        store.store("f.bin", 2, &data).unwrap();

        let raw = fs::read(dir.path().join("f.bin_2")).unwrap();
        assert_eq!(raw.len(), DIGEST_LEN + data.len());
        assert_eq!(&raw[..DIGEST_LEN], &hash::digest(&data)[..]);
        assert_eq!(&raw[DIGEST_LEN..], &data[..]);
    }

    #[test]
    fn test_corruption_detected_and_quarantined() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();

        let data = vec![7u8; 1024];
        store.store("f.bin", 0, &data).unwrap();

        // Flip one payload bit behind the store's back
        let path = dir.path().join("f.bin_0");
        let mut raw = fs::read(&path).unwrap();
        raw[DIGEST_LEN + 40] ^= 0x01;
        fs::write(&path, &raw).unwrap();

        let err = store.retrieve("f.bin", 0).unwrap_err();
        assert!(matches!(err, Error::ChunkCorrupted { .. }));

        // Original gone, quarantine file present, index entry dropped
        assert!(!path.exists());
        assert!(dir.path().join("f.bin_0.corrupt").exists());
        assert!(!store.contains("f.bin", 0));

        // Second read reports not-found, never the tampered bytes
        let err = store.retrieve("f.bin", 0).unwrap_err();
        assert!(matches!(err, Error::ChunkNotFound { .. }));
    }

    #[test]
    fn test_startup_scan_rebuilds_index() {
        let dir = tempdir().unwrap();
        {
            let store = ChunkStore::open(dir.path()).unwrap();
            store.store("a.txt", 0, b"one").unwrap();
            store.store("a.txt", 1, b"two").unwrap();
            store.store("b.txt", 0, b"three").unwrap();
        }

        let store = ChunkStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.contains("a.txt", 1));
        assert_eq!(store.retrieve("b.txt", 0).unwrap(), b"three");

        // Rescan queues everything for re-reporting
        let (_, new_files) = store.heartbeat_sample();
        assert_eq!(new_files.len(), 3);
    }

    #[test]
    fn test_startup_scan_skips_quarantined() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.bin_0.corrupt"), b"garbage").unwrap();
        fs::write(dir.path().join("not-a-chunk"), b"garbage").unwrap();

        let store = ChunkStore::open(dir.path()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_file_drops_all_chunks() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();
        store.store("a.txt", 0, b"one").unwrap();
        store.store("a.txt", 1, b"two").unwrap();
        store.store("b.txt", 0, b"keep").unwrap();

        assert_eq!(store.remove_file("a.txt").unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert!(!dir.path().join("a.txt_0").exists());
        assert!(dir.path().join("b.txt_0").exists());
    }

    #[test]
    fn test_heartbeat_sample_drains_and_requeues() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();
        store.store("a.txt", 0, b"one").unwrap();

        let (served, new_files) = store.heartbeat_sample();
        assert_eq!(served, 1);
        assert_eq!(new_files, vec!["a.txt_0".to_string()]);

        // Drained
        let (_, empty) = store.heartbeat_sample();
        assert!(empty.is_empty());

        // Failed send puts them back
        store.requeue_report(new_files);
        let (_, again) = store.heartbeat_sample();
        assert_eq!(again, vec!["a.txt_0".to_string()]);
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();
        store.store("a.txt", 0, b"first").unwrap();
        store.store("a.txt", 0, b"second").unwrap();

        assert_eq!(store.retrieve("a.txt", 0).unwrap(), b"second");
        assert_eq!(store.len(), 1);
    }
}
