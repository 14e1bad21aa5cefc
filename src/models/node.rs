//! Nodes and node references.

use super::{Label, Properties};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable internal identifier of a node.
///
/// Identifiers are assigned in creation order and never reused, so the
/// lowest id of a set is the oldest node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(i64);

impl NodeId {
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

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An entity in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Internal identifier.
    pub id: NodeId,
    /// Entity kind.
    pub label: Label,
    /// Value of the label's natural-key property.
    pub natural_key: String,
    /// Open-ended property map, including the natural-key field.
    pub properties: Properties,
    /// When the node was first merged.
    pub created_at: DateTime<Utc>,
    /// When the node was last merged.
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Returns a reference to this node by label and natural key.
    #[must_use]
    pub fn key_ref(&self) -> NodeRef {
        NodeRef::key(self.label, self.natural_key.clone())
    }
}

/// Reference to a node, either by natural key or by internal id.
///
/// The textual form is `Label:key` (for example `Company:NVDA`) or `#id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRef {
    /// Lookup by `(label, natural key)`.
    Key {
        /// Entity kind.
        label: Label,
        /// Natural key value.
        key: String,
    },
    /// Lookup by internal id.
    Id(NodeId),
}

impl NodeRef {
    /// Creates a natural-key reference.
    #[must_use]
    pub fn key(label: Label, key: impl Into<String>) -> Self {
        Self::Key {
            label,
            key: key.into(),
        }
    }

    /// Returns true if `node` is the node this reference points at.
    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            Self::Key { label, key } => node.label == *label && node.natural_key == *key,
            Self::Id(id) => node.id == *id,
        }
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        Self::Id(id)
    }
}

impl From<&Node> for NodeRef {
    fn from(node: &Node) -> Self {
        Self::Id(node.id)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key { label, key } => write!(f, "{label}:{key}"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

impl std::str::FromStr for NodeRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(raw) = s.strip_prefix('#') {
            let id = raw
                .parse::<i64>()
                .map_err(|_| Error::InvalidInput(format!("invalid node id: {s}")))?;
            return Ok(Self::Id(NodeId::new(id)));
        }

        let (label, key) = s.split_once(':').ok_or_else(|| {
            Error::InvalidInput(format!("node ref must be 'Label:key' or '#id', got '{s}'"))
        })?;
        if key.is_empty() {
            return Err(Error::InvalidInput(format!("node ref '{s}' has an empty key")));
        }
        Ok(Self::key(label.parse()?, key))
    }
}
