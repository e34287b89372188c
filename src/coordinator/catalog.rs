//! File catalog
//!
//! Maps file names to their chunk layout and per-chunk replica lists.
//! Installed atomically on admission, rewritten by repair, destroyed by
//! delete. Replica lists name nodes by identity string only; liveness is
//! resolved against the registry at read time.

use crate::common::{Error, Result};
use crate::proto::message::{ChunkLocation, FileInfo};
use std::collections::{BTreeMap, HashSet};

/// Catalog entry for one stored file
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub size: u64,
    pub chunk_size: u32,
    /// Chunk index → ordered replica identities, head first
    pub chunks: BTreeMap<u32, Vec<String>>,
}

/// A chunk whose live replica count has fallen below target
#[derive(Debug, Clone)]
pub struct UnderReplicated {
    pub filename: String,
    pub chunk: u32,
    /// Members of the replica list that are currently live, original order
    pub live: Vec<String>,
}

/// The coordinator's file catalog
#[derive(Debug, Default)]
pub struct Catalog {
    files: BTreeMap<String, FileRecord>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
        }
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.files.contains_key(filename)
    }

    pub fn get(&self, filename: &str) -> Option<&FileRecord> {
        self.files.get(filename)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Install a new FileRecord. The record must be complete: admission is
    /// all-or-nothing, so a capacity failure on any chunk never reaches here.
    pub fn admit(&mut self, filename: &str, record: FileRecord) -> Result<()> {
        if self.files.contains_key(filename) {
            return Err(Error::FileExists(filename.to_string()));
        }
        self.files.insert(filename.to_string(), record);
        Ok(())
    }

    /// Current replica locations for every chunk of a file
    pub fn locate(&self, filename: &str) -> Result<Vec<ChunkLocation>> {
        let record = self
            .files
            .get(filename)
            .ok_or_else(|| Error::FileNotFound(filename.to_string()))?;

        Ok(record
            .chunks
            .iter()
            .map(|(chunk, nodes)| ChunkLocation {
                chunk_number: *chunk,
                storage_nodes: nodes.clone(),
            })
            .collect())
    }

    /// Remove a file, returning its record for replica bookkeeping
    pub fn remove(&mut self, filename: &str) -> Result<FileRecord> {
        self.files
            .remove(filename)
            .ok_or_else(|| Error::FileNotFound(filename.to_string()))
    }

    pub fn list(&self) -> Vec<FileInfo> {
        self.files
            .iter()
            .map(|(filename, record)| FileInfo {
                filename: filename.clone(),
                size: record.size,
                num_chunks: record.chunks.len() as u32,
            })
            .collect()
    }

    /// Chunks whose live replica count is below `target`.
    ///
    /// Chunks with zero live replicas are returned too; callers cannot repair
    /// those (no source) but report them.
    pub fn under_replicated(
        &self,
        live_nodes: &HashSet<String>,
        target: usize,
    ) -> Vec<UnderReplicated> {
        let mut result = Vec::new();
        for (filename, record) in &self.files {
            for (chunk, nodes) in &record.chunks {
                let live: Vec<String> = nodes
                    .iter()
                    .filter(|n| live_nodes.contains(*n))
                    .cloned()
                    .collect();
                if live.len() < target {
                    result.push(UnderReplicated {
                        filename: filename.clone(),
                        chunk: *chunk,
                        live,
                    });
                }
            }
        }
        result
    }

    /// Does any chunk of any file name this node?
    pub fn names_node(&self, node_id: &str) -> bool {
        self.files.values().any(|record| {
            record
                .chunks
                .values()
                .any(|nodes| nodes.iter().any(|n| n == node_id))
        })
    }

    /// Rewrite one chunk's replica list after a successful repair.
    /// Returns false when the file vanished in the meantime (deleted).
    pub fn apply_repair(&mut self, filename: &str, chunk: u32, replicas: Vec<String>) -> bool {
        match self.files.get_mut(filename) {
            Some(record) => match record.chunks.get_mut(&chunk) {
                Some(nodes) => {
                    *nodes = replicas;
                    true
                }
                None => false,
            },
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(chunks: &[(u32, &[&str])]) -> FileRecord {
        FileRecord {
            size: 100,
            chunk_size: 64,
            chunks: chunks
                .iter()
                .map(|(i, nodes)| (*i, nodes.iter().map(|n| n.to_string()).collect()))
                .collect(),
        }
    }

    #[test]
    fn test_admit_then_locate() {
        let mut catalog = Catalog::new();
        catalog
            .admit("a.txt", record(&[(0, &["n1", "n2", "n3"]), (1, &["n2", "n3", "n1"])]))
            .unwrap();

        let locations = catalog.locate("a.txt").unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].chunk_number, 0);
        assert_eq!(locations[0].storage_nodes, vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn test_admit_duplicate_rejected() {
        let mut catalog = Catalog::new();
        catalog.admit("dup.txt", record(&[(0, &["n1"])])).unwrap();

        let err = catalog.admit("dup.txt", record(&[(0, &["n2"])])).unwrap_err();
        assert!(matches!(err, Error::FileExists(_)));
        // Original record untouched
        assert_eq!(
            catalog.locate("dup.txt").unwrap()[0].storage_nodes,
            vec!["n1"]
        );
    }

    #[test]
    fn test_locate_missing() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.locate("nope"),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_remove_allows_readmission() {
        let mut catalog = Catalog::new();
        catalog.admit("a.txt", record(&[(0, &["n1"])])).unwrap();
        catalog.remove("a.txt").unwrap();
        catalog.admit("a.txt", record(&[(0, &["n2"])])).unwrap();
    }

    #[test]
    fn test_under_replicated() {
        let mut catalog = Catalog::new();
        catalog
            .admit("a.txt", record(&[(0, &["n1", "n2", "n3"]), (1, &["n1", "n4", "n5"])]))
            .unwrap();

        let live: HashSet<String> = ["n1", "n2", "n3"].iter().map(|s| s.to_string()).collect();
        let needy = catalog.under_replicated(&live, 3);

        assert_eq!(needy.len(), 1);
        assert_eq!(needy[0].chunk, 1);
        assert_eq!(needy[0].live, vec!["n1"]);
    }

    #[test]
    fn test_apply_repair() {
        let mut catalog = Catalog::new();
        catalog.admit("a.txt", record(&[(0, &["n1", "n2"])])).unwrap();

        assert!(catalog.apply_repair(
            "a.txt",
            0,
            vec!["n1".into(), "n4".into(), "n5".into()]
        ));
        assert_eq!(
            catalog.locate("a.txt").unwrap()[0].storage_nodes,
            vec!["n1", "n4", "n5"]
        );

        // Deleted file: repair is a no-op
        catalog.remove("a.txt").unwrap();
        assert!(!catalog.apply_repair("a.txt", 0, vec!["n1".into()]));
    }

    #[test]
    fn test_names_node() {
        let mut catalog = Catalog::new();
        catalog.admit("a.txt", record(&[(0, &["n1", "n2"])])).unwrap();
        assert!(catalog.names_node("n2"));
        assert!(!catalog.names_node("n9"));
    }
}
