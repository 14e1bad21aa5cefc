//! Graph store trait for the temporal knowledge graph.
//!
//! A graph store owns all persisted nodes and edges. Every mutating method
//! is one atomic unit: it either fully applies or leaves the graph untouched.
//!
//! # Available Implementations
//!
//! | Store | Use Case | Isolation |
//! |-------|----------|-----------|
//! | `SqliteGraphStore` | Default; embedded, multi-process | `BEGIN IMMEDIATE` per operation |
//! | `InMemoryGraphStore` | Testing | One `RwLock` over the whole graph |
//!
//! # Error Modes and Guarantees
//!
//! All stores return `Result<T>` with errors propagated via [`crate::Error`].
//!
//! ## Write Operations
//!
//! | Operation | Fails With | Notes |
//! |-----------|------------|-------|
//! | `merge_node` | `MissingKey`, `InvalidInput`, `Busy` | Upsert by `(label, natural key)` |
//! | `merge_edge` | `NodeNotFound`, `Busy` | Last write wins, refreshes `ingested_at` |
//! | `merge_edge_temporal` | `NodeNotFound`, `TemporalConflict`, `Busy` | Appends version `max + 1` |
//!
//! ## Maintenance Primitives
//!
//! The maintenance pass is built from scan/apply pairs. Scans are
//! snapshot-consistent reads; each apply call is one transaction that
//! re-validates its input against current state, so applying a stale group
//! is safe and applying the same group twice is a no-op.
//!
//! | Scan | Apply |
//! |------|-------|
//! | `find_duplicate_nodes` | `merge_duplicate_group` |
//! | `find_duplicate_relationships` | `remove_duplicate_edge_group` |
//! | `find_orphaned_nodes` | `delete_orphaned_nodes` |
//!
//! # Example
//!
//! ```rust,ignore
//! use factgraph::storage::GraphStore;
//! use factgraph::models::{EdgeQuery, Label, NodeRef};
//!
//! let nvda = store.get_node(&NodeRef::key(Label::Company, "NVDA"))?;
//! let suppliers = store.query_edges(
//!     &EdgeQuery::new()
//!         .to_node(nvda.id)
//!         .with_relation_type("SUPPLIES_TO")
//!         .valid_at(as_of),
//! )?;
//! ```

use crate::Result;
use crate::models::{
    ConflictPolicy, DuplicateEdgeGroup, DuplicateNodeGroup, Edge, EdgeQuery, EdgeWrite,
    GroupMergeOutcome, Label, Node, NodeId, NodeRef, Properties, ValidityInterval,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trait for graph store backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` so stores can be shared via `Arc`
/// - Use interior mutability (`Mutex<Connection>`, `RwLock`) for state
/// - Reads and writes for the same natural key or triple must be serialized
/// - Use [`crate::models::temporal::plan_temporal_write`] for temporal writes
///   so both stores share one conflict rule
pub trait GraphStore: Send + Sync {
    // ========================================================================
    // Entity Operations
    // ========================================================================

    /// Creates or updates the node identified by `label` and its natural key.
    ///
    /// Caller properties overwrite stored ones; other stored properties are
    /// kept. `created_at`/`updated_at` keys in `properties` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingKey`] if the natural-key field is absent.
    fn merge_node(&self, label: Label, properties: Properties) -> Result<Node>;

    /// Looks up a node by reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    fn get_node(&self, node: &NodeRef) -> Result<Option<Node>>;

    /// Returns the number of edges touching `node` (self-loops count once).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    fn node_degree(&self, node: NodeId) -> Result<usize>;

    // ========================================================================
    // Relationship Operations
    // ========================================================================

    /// Creates or overwrites the simple edge for the write's triple.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NodeNotFound`] if either endpoint is absent.
    fn merge_edge(&self, edge: &EdgeWrite) -> Result<Edge>;

    /// Appends a new version of a temporal edge.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NodeNotFound`] if either endpoint is absent and
    /// [`crate::Error::TemporalConflict`] if `interval` overlaps a stored
    /// version that `policy` cannot close.
    fn merge_edge_temporal(
        &self,
        edge: &EdgeWrite,
        interval: ValidityInterval,
        policy: ConflictPolicy,
    ) -> Result<Edge>;

    /// Returns every version of a temporal triple in version order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NodeNotFound`] if either endpoint is absent.
    fn edge_history(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        relation_type: &str,
    ) -> Result<Vec<Edge>>;

    /// Lists edges matching a filter, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    fn query_edges(&self, query: &EdgeQuery) -> Result<Vec<Edge>>;

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Returns node and edge counts from one consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    fn get_stats(&self) -> Result<GraphStats>;

    // ========================================================================
    // Maintenance Primitives
    // ========================================================================

    /// Groups nodes sharing label and fingerprint, ordered by survivor id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    fn find_duplicate_nodes(&self, label: Option<Label>) -> Result<Vec<DuplicateNodeGroup>>;

    /// Merges one duplicate group into its lowest-id member.
    ///
    /// Re-validates membership first; a group with fewer than two live
    /// members is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is applied then.
    fn merge_duplicate_group(&self, group: &DuplicateNodeGroup) -> Result<GroupMergeOutcome>;

    /// Groups simple edges sharing a triple, ordered by kept edge id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    fn find_duplicate_relationships(&self) -> Result<Vec<DuplicateEdgeGroup>>;

    /// Deletes all but the lowest-id simple edge of the group's triple.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is applied then.
    fn remove_duplicate_edge_group(&self, group: &DuplicateEdgeGroup) -> Result<usize>;

    /// Lists nodes with no incident edges whose label is not excluded.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    fn find_orphaned_nodes(&self, exclude_labels: &[Label]) -> Result<Vec<NodeId>>;

    /// Deletes the given nodes that still have no incident edges.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is applied then.
    fn delete_orphaned_nodes(&self, nodes: &[NodeId]) -> Result<usize>;

    // ========================================================================
    // Administration
    // ========================================================================

    /// Deletes every edge and node.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    fn clear(&self) -> Result<()>;
}

/// Aggregate counts describing the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Total number of nodes.
    pub total_nodes: usize,
    /// Number of nodes by label.
    pub nodes_by_label: BTreeMap<String, usize>,
    /// Total number of edges.
    pub total_edges: usize,
    /// Number of edges by relation type.
    pub edges_by_type: BTreeMap<String, usize>,
    /// Number of versioned edges.
    pub temporal_edges: usize,
    /// Average edges per node.
    pub avg_edges_per_node: f32,
}

impl GraphStats {
    /// Creates empty stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds stats from per-label and per-type counts.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(
        nodes_by_label: BTreeMap<String, usize>,
        edges_by_type: BTreeMap<String, usize>,
        temporal_edges: usize,
    ) -> Self {
        let total_nodes = nodes_by_label.values().sum();
        let total_edges = edges_by_type.values().sum();
        let avg_edges_per_node = if total_nodes == 0 {
            0.0
        } else {
            total_edges as f32 / total_nodes as f32
        };
        Self {
            total_nodes,
            nodes_by_label,
            total_edges,
            edges_by_type,
            temporal_edges,
            avg_edges_per_node,
        }
    }

    /// Returns the node count for a label.
    #[must_use]
    pub fn nodes_with_label(&self, label: Label) -> usize {
        self.nodes_by_label.get(label.as_str()).copied().unwrap_or(0)
    }

    /// Returns the edge count for a relation type.
    #[must_use]
    pub fn edges_with_type(&self, relation_type: &str) -> usize {
        self.edges_by_type.get(relation_type).copied().unwrap_or(0)
    }
}
