//! Storage node registry
//!
//! One record per live storage server, created on first heartbeat and
//! destroyed when the failure detector sees heartbeat silence beyond the
//! configured timeout. Telemetry (free space, served requests) refreshes
//! with every heartbeat.

use crate::proto::message::NodeReport;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Coordinator-side record of one storage node
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub node_id: String,
    pub free_space: u64,
    pub requests_processed: u64,
    pub last_heartbeat: Instant,
}

/// Registry of live storage nodes
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, NodeRecord>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Upsert a node from a heartbeat observed at `now`
    pub fn observe_heartbeat(
        &mut self,
        node_id: &str,
        free_space: u64,
        requests_processed: u64,
        now: Instant,
    ) -> bool {
        let is_new = !self.nodes.contains_key(node_id);
        let record = self
            .nodes
            .entry(node_id.to_string())
            .or_insert_with(|| NodeRecord {
                node_id: node_id.to_string(),
                free_space,
                requests_processed,
                last_heartbeat: now,
            });
        record.free_space = free_space;
        record.requests_processed = requests_processed;
        record.last_heartbeat = now;
        is_new
    }

    /// Remove every node silent for longer than `timeout` as of `now`.
    /// Returns the removed identities.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        let dead: Vec<String> = self
            .nodes
            .values()
            .filter(|n| now.duration_since(n.last_heartbeat) > timeout)
            .map(|n| n.node_id.clone())
            .collect();

        for id in &dead {
            self.nodes.remove(id);
        }
        dead
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeRecord> {
        self.nodes.get(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// Snapshot for a `NodeStatus` response, sorted by identity
    pub fn reports(&self) -> (Vec<NodeReport>, u64) {
        let mut reports: Vec<NodeReport> = self
            .nodes
            .values()
            .map(|n| NodeReport {
                node_id: n.node_id.clone(),
                free_space: n.free_space,
                requests_processed: n.requests_processed,
            })
            .collect();
        reports.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        let total = reports.iter().map(|r| r.free_space).sum();
        (reports, total)
    }
}
