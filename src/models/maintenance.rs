//! Duplicate groups found by the maintenance scans.
//!
//! Groups are computed on demand and never persisted.

use super::{EdgeId, Label, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two or more nodes with the same label and fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateNodeGroup {
    /// Shared label.
    pub label: Label,
    /// Shared fingerprint.
    pub fingerprint: String,
    /// Members in ascending id order; the first is the survivor.
    pub node_ids: Vec<NodeId>,
}

impl DuplicateNodeGroup {
    /// The member that keeps all redirected edges.
    #[must_use]
    pub fn survivor(&self) -> Option<NodeId> {
        self.node_ids.first().copied()
    }

    /// Members that will be merged into the survivor.
    #[must_use]
    pub fn redundant(&self) -> &[NodeId] {
        self.node_ids.get(1..).unwrap_or_default()
    }
}

impl fmt::Display for DuplicateNodeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.fingerprint.get(..12).unwrap_or(&self.fingerprint);
        write!(f, "{}[{short}] x{}", self.label, self.node_ids.len())
    }
}

/// Two or more simple edges on the same `(source, target, relation_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateEdgeGroup {
    /// Shared source node.
    pub source: NodeId,
    /// Shared target node.
    pub target: NodeId,
    /// Shared relation tag.
    pub relation_type: String,
    /// Members in ascending id order; the first is kept.
    pub edge_ids: Vec<EdgeId>,
}

impl DuplicateEdgeGroup {
    /// Number of edges removing this group deletes.
    #[must_use]
    pub const fn redundant_count(&self) -> usize {
        self.edge_ids.len().saturating_sub(1)
    }
}

impl fmt::Display for DuplicateEdgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({})-[{}]->({}) x{}",
            self.source,
            self.relation_type,
            self.target,
            self.edge_ids.len()
        )
    }
}

/// What merging one duplicate group changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMergeOutcome {
    /// Redundant nodes deleted.
    pub nodes_merged: usize,
    /// Edges re-pointed at the survivor.
    pub edges_redirected: usize,
    /// Simple self-loops collapsed after redirection.
    pub self_loops_collapsed: usize,
    /// Temporal edges dropped because they overlapped the survivor's history.
    pub temporal_edges_dropped: usize,
}

impl GroupMergeOutcome {
    /// Adds another outcome into this one.
    pub const fn absorb(&mut self, other: Self) {
        self.nodes_merged += other.nodes_merged;
        self.edges_redirected += other.edges_redirected;
        self.self_loops_collapsed += other.self_loops_collapsed;
        self.temporal_edges_dropped += other.temporal_edges_dropped;
    }
}
