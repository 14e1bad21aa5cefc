//! Data models for factgraph.
//!
//! This module contains the node, edge and interval types shared by the
//! storage backends and services.

mod edge;
mod fingerprint;
mod label;
mod maintenance;
mod node;
pub mod temporal;

pub use edge::{DEFAULT_EDGE_QUERY_LIMIT, Edge, EdgeId, EdgeQuery, EdgeWrite};
pub use fingerprint::NodeFingerprint;
pub use label::{
    Label, OPAQUE_KEY_FIELD, RESERVED_PROPERTIES, parse_label_list, strip_reserved,
};
pub use maintenance::{DuplicateEdgeGroup, DuplicateNodeGroup, GroupMergeOutcome};
pub use node::{Node, NodeId, NodeRef};
pub use temporal::{ConflictPolicy, TemporalBounds, ValidityInterval};

/// Open-ended property map of a node or edge.
///
/// Keys iterate in sorted order, which keeps serialized output stable.
pub type Properties = std::collections::BTreeMap<String, serde_json::Value>;

/// Parses a JSON object into a property map.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] if `json` is not a JSON object.
pub fn parse_properties(json: &str) -> crate::Result<Properties> {
    serde_json::from_str(json)
        .map_err(|e| crate::Error::InvalidInput(format!("properties must be a JSON object: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_properties() {
        let props = parse_properties(r#"{"ticker": "NVDA", "employees": 29600}"#).unwrap();
        assert_eq!(props.len(), 2);
        assert!(parse_properties("[1, 2]").is_err());
        assert!(parse_properties("not json").is_err());
    }
}
