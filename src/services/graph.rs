//! Graph service for high-level knowledge graph writes and reads.
//!
//! Wraps a [`GraphStore`] with label parsing, interval validation, the
//! configured conflict policy, and domain metrics.
//!
//! # Example
//!
//! ```rust,ignore
//! use factgraph::services::GraphService;
//! use factgraph::storage::SqliteGraphStore;
//! use factgraph::models::{EdgeWrite, NodeRef, Label};
//!
//! let service = GraphService::new(SqliteGraphStore::new("graph.db")?);
//! service.merge_node("Company", props)?;
//!
//! let write = EdgeWrite::new(
//!     NodeRef::key(Label::Company, "TSM"),
//!     NodeRef::key(Label::Company, "NVDA"),
//!     "SUPPLIES_TO",
//! );
//! let edge = service.merge_edge_temporal(&write, valid_from, None)?;
//! ```

use crate::models::{
    ConflictPolicy, Edge, EdgeQuery, EdgeWrite, Label, Node, NodeRef, Properties,
    ValidityInterval,
};
use crate::storage::{GraphStats, GraphStore};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// High-level service for knowledge graph operations.
///
/// # Thread Safety
///
/// The service is thread-safe when the underlying store is; both
/// [`SqliteGraphStore`](crate::storage::SqliteGraphStore) and
/// [`InMemoryGraphStore`](crate::storage::InMemoryGraphStore) are.
pub struct GraphService<B: GraphStore> {
    backend: Arc<B>,
    conflict_policy: ConflictPolicy,
}

impl<B: GraphStore> GraphService<B> {
    /// Creates a new graph service with the given store.
    pub fn new(backend: B) -> Self {
        Self::with_shared_backend(Arc::new(backend))
    }

    /// Creates a new graph service with a shared store.
    #[must_use]
    pub fn with_shared_backend(backend: Arc<B>) -> Self {
        Self {
            backend,
            conflict_policy: ConflictPolicy::default(),
        }
    }

    /// Sets the default temporal conflict policy.
    #[must_use]
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Returns a reference to the underlying store.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the shared store handle.
    #[must_use]
    pub fn shared_backend(&self) -> Arc<B> {
        Arc::clone(&self.backend)
    }

    /// Returns the default temporal conflict policy.
    #[must_use]
    pub const fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict_policy
    }

    // =========================================================================
    // Entity Operations
    // =========================================================================

    /// Creates or updates a node by label name and natural key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLabel`] for an unknown label,
    /// [`Error::MissingKey`] if the natural key is absent, or a storage error.
    #[instrument(skip(self, properties), fields(label = %label))]
    pub fn merge_node(&self, label: &str, properties: Properties) -> Result<Node> {
        let label: Label = label.parse()?;
        let node = self.backend.merge_node(label, properties)?;

        metrics::counter!("graph_nodes_merged_total", "label" => label.as_str()).increment(1);
        debug!(node_id = %node.id, key = %node.natural_key, "Merged node");
        Ok(node)
    }

    /// Looks up a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn get_node(&self, node: &NodeRef) -> Result<Option<Node>> {
        self.backend.get_node(node)
    }

    /// Looks up a node that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] if the node is absent.
    pub fn require_node(&self, node: &NodeRef) -> Result<Node> {
        self.backend
            .get_node(node)?
            .ok_or_else(|| Error::NodeNotFound(node.to_string()))
    }

    // =========================================================================
    // Relationship Operations
    // =========================================================================

    /// Creates or overwrites a simple edge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] if either endpoint is absent.
    #[instrument(skip(self, edge), fields(relation_type = %edge.relation_type))]
    pub fn merge_edge(&self, edge: &EdgeWrite) -> Result<Edge> {
        let stored = self.backend.merge_edge(edge)?;

        metrics::counter!("graph_edges_merged_total", "kind" => "simple").increment(1);
        debug!(edge_id = %stored.id, "Merged edge");
        Ok(stored)
    }

    /// Appends a temporal edge version under the default conflict policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `valid_to` is not after
    /// `valid_from`, [`Error::NodeNotFound`] if an endpoint is absent, and
    /// [`Error::TemporalConflict`] on an overlap the policy cannot resolve.
    pub fn merge_edge_temporal(
        &self,
        edge: &EdgeWrite,
        valid_from: DateTime<Utc>,
        valid_to: Option<DateTime<Utc>>,
    ) -> Result<Edge> {
        let interval = ValidityInterval::new(valid_from, valid_to)?;
        self.merge_edge_temporal_with_policy(edge, interval, self.conflict_policy)
    }

    /// Appends a temporal edge version under an explicit conflict policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] if an endpoint is absent and
    /// [`Error::TemporalConflict`] on an overlap the policy cannot resolve.
    #[instrument(
        skip(self, edge, interval, policy),
        fields(relation_type = %edge.relation_type, interval = %interval, policy = policy.as_str())
    )]
    pub fn merge_edge_temporal_with_policy(
        &self,
        edge: &EdgeWrite,
        interval: ValidityInterval,
        policy: ConflictPolicy,
    ) -> Result<Edge> {
        match self.backend.merge_edge_temporal(edge, interval, policy) {
            Ok(stored) => {
                metrics::counter!("graph_edges_merged_total", "kind" => "temporal").increment(1);
                debug!(
                    edge_id = %stored.id,
                    version = stored.version().unwrap_or_default(),
                    "Appended temporal edge version"
                );
                Ok(stored)
            },
            Err(e @ Error::TemporalConflict { .. }) => {
                metrics::counter!("graph_temporal_conflicts_total", "policy" => policy.as_str())
                    .increment(1);
                warn!(error = %e, "Rejected temporal edge write");
                Err(e)
            },
            Err(e) => Err(e),
        }
    }

    /// Returns every version of a temporal triple.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] if either endpoint is absent.
    pub fn edge_history(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        relation_type: &str,
    ) -> Result<Vec<Edge>> {
        self.backend.edge_history(source, target, relation_type)
    }

    /// Lists edges matching a filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn query_edges(&self, query: &EdgeQuery) -> Result<Vec<Edge>> {
        self.backend.query_edges(query)
    }

    // =========================================================================
    // Introspection and administration
    // =========================================================================

    /// Returns graph counts from one consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn get_stats(&self) -> Result<GraphStats> {
        let stats = self.backend.get_stats()?;
        #[allow(clippy::cast_precision_loss)]
        {
            metrics::gauge!("graph_nodes").set(stats.total_nodes as f64);
            metrics::gauge!("graph_edges").set(stats.total_edges as f64);
        }
        Ok(stats)
    }

    /// Deletes every node and edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn clear(&self) -> Result<()> {
        self.backend.clear()?;
        warn!("Cleared knowledge graph");
        Ok(())
    }
}
