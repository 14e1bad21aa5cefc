//! Relationships between nodes.

use super::temporal::{TemporalBounds, ValidityInterval};
use super::{NodeId, NodeRef, Properties};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default maximum number of edges returned by a query.
pub const DEFAULT_EDGE_QUERY_LIMIT: usize = 100;

/// Stable internal identifier of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(i64);

impl EdgeId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored relationship.
///
/// Simple edges have `temporal == None`; versioned edges carry their
/// validity interval and version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Internal identifier.
    pub id: EdgeId,
    /// Source node.
    pub source: NodeId,
    /// Target node.
    pub target: NodeId,
    /// Free-form relation tag such as `SUPPLIES_TO`.
    pub relation_type: String,
    /// Provenance, confidence and other edge properties.
    pub properties: Properties,
    /// When this edge was last written.
    pub ingested_at: DateTime<Utc>,
    /// Validity interval and version for temporal edges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalBounds>,
}

impl Edge {
    /// Returns true if this is a versioned edge.
    #[must_use]
    pub const fn is_temporal(&self) -> bool {
        self.temporal.is_some()
    }

    /// Returns the version of a temporal edge.
    #[must_use]
    pub fn version(&self) -> Option<u32> {
        self.temporal.map(|t| t.version)
    }

    /// Returns the validity interval of a temporal edge.
    #[must_use]
    pub fn interval(&self) -> Option<ValidityInterval> {
        self.temporal.map(|t| t.interval)
    }

    /// Checks whether the edge holds at `at`. Simple edges always hold.
    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.temporal.is_none_or(|t| t.interval.contains(at))
    }
}

/// A request to write an edge between two referenced nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeWrite {
    /// Source node reference.
    pub source: NodeRef,
    /// Target node reference.
    pub target: NodeRef,
    /// Relation tag.
    pub relation_type: String,
    /// Properties to store on the edge.
    #[serde(default)]
    pub properties: Properties,
}

impl EdgeWrite {
    /// Creates a write with no properties.
    #[must_use]
    pub fn new(
        source: impl Into<NodeRef>,
        target: impl Into<NodeRef>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation_type: relation_type.into(),
            properties: Properties::new(),
        }
    }

    /// Replaces the edge properties.
    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Sets a single property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Checks that the relation tag is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the relation type is blank.
    pub fn validate(&self) -> Result<()> {
        if self.relation_type.trim().is_empty() {
            return Err(Error::InvalidInput(
                "relation_type must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Filter for listing edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeQuery {
    /// Only edges leaving this node.
    pub source: Option<NodeId>,
    /// Only edges entering this node.
    pub target: Option<NodeId>,
    /// Only edges with this relation tag.
    pub relation_type: Option<String>,
    /// Only versioned edges.
    pub temporal_only: bool,
    /// Only edges valid at this instant.
    pub valid_at: Option<DateTime<Utc>>,
    /// Maximum number of results.
    pub limit: usize,
}

impl Default for EdgeQuery {
    fn default() -> Self {
        Self {
            source: None,
            target: None,
            relation_type: None,
            temporal_only: false,
            valid_at: None,
            limit: DEFAULT_EDGE_QUERY_LIMIT,
        }
    }
}

impl EdgeQuery {
    /// Creates an unfiltered query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by source node.
    #[must_use]
    pub const fn from_node(mut self, source: NodeId) -> Self {
        self.source = Some(source);
        self
    }

    /// Filters by target node.
    #[must_use]
    pub const fn to_node(mut self, target: NodeId) -> Self {
        self.target = Some(target);
        self
    }

    /// Filters by relation tag.
    #[must_use]
    pub fn with_relation_type(mut self, relation_type: impl Into<String>) -> Self {
        self.relation_type = Some(relation_type.into());
        self
    }

    /// Keeps only versioned edges.
    #[must_use]
    pub const fn temporal_only(mut self) -> Self {
        self.temporal_only = true;
        self
    }

    /// Keeps only edges valid at `at`.
    #[must_use]
    pub const fn valid_at(mut self, at: DateTime<Utc>) -> Self {
        self.valid_at = Some(at);
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Checks whether `edge` passes every filter except the limit.
    #[must_use]
    pub fn matches(&self, edge: &Edge) -> bool {
        self.source.is_none_or(|s| edge.source == s)
            && self.target.is_none_or(|t| edge.target == t)
            && self
                .relation_type
                .as_ref()
                .is_none_or(|r| edge.relation_type == *r)
            && (!self.temporal_only || edge.is_temporal())
            && self.valid_at.is_none_or(|at| edge.is_valid_at(at))
    }
}
