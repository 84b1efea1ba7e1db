// SPDX-License-Identifier: MIT

//! Persisted fleet membership record (`spec.md` §4.E — worker pool identity
//! and heartbeats).

use crate::job::NodeId;
use crate::scan::ScanId;
use serde::{Deserialize, Serialize};

/// A durable record of one running pool, one row per node.
///
/// Distinct from an individual worker task: a node hosts `worker_count`
/// parallel workers but reports a single heartbeat, since staleness is
/// judged at the job level (via `JobClaim::last_heartbeat_ms`) rather than
/// the node level. `WorkerNode` exists so the recovery sweep can tell a node
/// that crashed without graceful shutdown from one merely between polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerNode {
    pub node_id: NodeId,
    pub hostname: String,
    /// Set when the pool is running in isolated mode, bound to one scan.
    pub bound_scan_id: Option<ScanId>,
    pub started_at_ms: u64,
    pub last_heartbeat_ms: u64,
}

impl WorkerNode {
    pub fn new(node_id: NodeId, hostname: String, now_ms: u64) -> Self {
        Self {
            node_id,
            hostname,
            bound_scan_id: None,
            started_at_ms: now_ms,
            last_heartbeat_ms: now_ms,
        }
    }

    /// A node is stale if it hasn't heartbeat within `threshold` of `now_ms`.
    pub fn is_stale(&self, now_ms: u64, threshold_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) > threshold_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_node_is_not_stale() {
        let node = WorkerNode::new(NodeId::new(), "host-a".into(), 1_000);
        assert!(!node.is_stale(1_500, 2_000));
    }

    #[test]
    fn node_past_threshold_is_stale() {
        let node = WorkerNode::new(NodeId::new(), "host-a".into(), 1_000);
        assert!(node.is_stale(10_000, 2_000));
    }
}
