//! Chunk placement policy
//!
//! Candidates are nodes with enough free space for one chunk; they are
//! ranked by free space descending with the identity string as a stable
//! tie-break, and the top `count` win. Selection is all-or-nothing: fewer
//! candidates than requested is a capacity failure, never a short list.

use crate::common::{Error, Result};
use crate::coordinator::registry::NodeRegistry;
use std::collections::HashSet;

/// Pick `count` distinct nodes able to hold a chunk of `chunk_size` bytes,
/// skipping `exclude` (nodes that already hold a replica during repair).
pub fn select_nodes(
    registry: &NodeRegistry,
    chunk_size: u64,
    count: usize,
    exclude: &HashSet<String>,
) -> Result<Vec<String>> {
    let mut candidates: Vec<(&str, u64)> = registry
        .records()
        .filter(|n| n.free_space >= chunk_size && !exclude.contains(&n.node_id))
        .map(|n| (n.node_id.as_str(), n.free_space))
        .collect();

    if candidates.len() < count {
        return Err(Error::InsufficientCapacity {
            required: count,
            available: candidates.len(),
        });
    }

    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    Ok(candidates
        .into_iter()
        .take(count)
        .map(|(id, _)| id.to_string())
        .collect())
}
