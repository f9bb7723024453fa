//! `Link` (spec.md §3): an immutable directed edge between two topology nodes.

use serde::{Deserialize, Serialize};

/// Name of a node within a topology. Topologies don't model node metadata,
/// only the name used by links' `from_node`/`to_node`.
pub type NodeId = String;

/// A directed, latency-delayed edge between two nodes. Immutable once
/// created; belongs to exactly one `Topology`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Stable identifier, unique within the owning topology.
    pub id: String,
    /// Source node name.
    pub from_node: NodeId,
    /// Destination node name.
    pub to_node: NodeId,
    /// Simulated one-way transmission delay, in seconds.
    pub latency_sec: f64,
}

impl Link {
    /// Build a link, assigning a fresh id.
    pub fn new(from_node: impl Into<NodeId>, to_node: impl Into<NodeId>, latency_sec: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_node: from_node.into(),
            to_node: to_node.into(),
            latency_sec,
        }
    }
}
