//! Graph write and read commands.

use super::{CommandContext, to_json};
use crate::models::temporal::parse_timestamp;
use crate::models::{ConflictPolicy, EdgeWrite, NodeRef, ValidityInterval, parse_properties};
use crate::storage::GraphStore;
use crate::{Error, Result};
use serde_json::{Value, json};

/// Arguments for `merge-edge-temporal`.
#[derive(Debug, Clone, Default)]
pub struct TemporalEdgeArgs {
    /// Source node ref (`Label:key` or `#id`).
    pub source: String,
    /// Target node ref.
    pub target: String,
    /// Relation type.
    pub relation: String,
    /// Interval start (RFC 3339 or `YYYY-MM-DD`).
    pub valid_from: String,
    /// Exclusive interval end; open-ended when absent.
    pub valid_to: Option<String>,
    /// Edge properties as a JSON object.
    pub properties: Option<String>,
    /// Conflict policy; the configured one when absent.
    pub policy: Option<String>,
}

/// Creates or updates a node.
///
/// # Errors
///
/// Returns an error if the label or properties are invalid or the write fails.
pub fn cmd_merge_node<B: GraphStore>(
    ctx: &CommandContext<B>,
    label: &str,
    properties: &str,
) -> Result<Value> {
    let node = ctx.graph.merge_node(label, parse_properties(properties)?)?;
    to_json(&node)
}

/// Creates or overwrites a simple edge.
///
/// # Errors
///
/// Returns an error if a ref or the properties are invalid, an endpoint is
/// missing, or the write fails.
pub fn cmd_merge_edge<B: GraphStore>(
    ctx: &CommandContext<B>,
    source: &str,
    target: &str,
    relation: &str,
    properties: Option<&str>,
) -> Result<Value> {
    let write = edge_write(source, target, relation, properties)?;
    let edge = ctx.graph.merge_edge(&write)?;
    to_json(&edge)
}

/// Appends a temporal edge version.
///
/// # Errors
///
/// Returns an error if any argument is invalid, an endpoint is missing, or
/// the interval conflicts with a stored version.
pub fn cmd_merge_edge_temporal<B: GraphStore>(
    ctx: &CommandContext<B>,
    args: &TemporalEdgeArgs,
) -> Result<Value> {
    let write = edge_write(
        &args.source,
        &args.target,
        &args.relation,
        args.properties.as_deref(),
    )?;
    let valid_from = parse_timestamp(&args.valid_from)?;
    let valid_to = args.valid_to.as_deref().map(parse_timestamp).transpose()?;
    let interval = ValidityInterval::new(valid_from, valid_to)?;
    let policy = match args.policy.as_deref() {
        Some(raw) => raw.parse::<ConflictPolicy>()?,
        None => ctx.graph.conflict_policy(),
    };

    let edge = ctx
        .graph
        .merge_edge_temporal_with_policy(&write, interval, policy)?;
    to_json(&edge)
}

/// Shows one node.
///
/// # Errors
///
/// Returns [`Error::NodeNotFound`] if the node does not exist.
pub fn cmd_get_node<B: GraphStore>(ctx: &CommandContext<B>, node: &str) -> Result<Value> {
    let node = ctx.graph.require_node(&node.parse::<NodeRef>()?)?;
    to_json(&node)
}

/// Shows every version of a temporal triple.
///
/// # Errors
///
/// Returns [`Error::NodeNotFound`] if either endpoint does not exist.
pub fn cmd_history<B: GraphStore>(
    ctx: &CommandContext<B>,
    source: &str,
    target: &str,
    relation: &str,
) -> Result<Value> {
    let history = ctx
        .graph
        .edge_history(&source.parse()?, &target.parse()?, relation)?;
    to_json(&history)
}

/// Shows graph statistics.
///
/// # Errors
///
/// Returns an error if the storage read fails.
pub fn cmd_stats<B: GraphStore>(ctx: &CommandContext<B>) -> Result<Value> {
    to_json(&ctx.graph.get_stats()?)
}

/// Deletes every node and edge.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] unless `confirmed`, or an error if the
/// delete fails.
pub fn cmd_reset<B: GraphStore>(ctx: &CommandContext<B>, confirmed: bool) -> Result<Value> {
    if !confirmed {
        return Err(Error::InvalidInput(
            "reset deletes the whole graph; pass --yes to confirm".to_string(),
        ));
    }
    let before = ctx.graph.get_stats()?;
    ctx.graph.clear()?;
    Ok(json!({
        "cleared": true,
        "nodes_deleted": before.total_nodes,
        "edges_deleted": before.total_edges,
    }))
}

fn edge_write(
    source: &str,
    target: &str,
    relation: &str,
    properties: Option<&str>,
) -> Result<EdgeWrite> {
    let source: NodeRef = source.parse()?;
    let target: NodeRef = target.parse()?;
    let properties = properties.map(parse_properties).transpose()?.unwrap_or_default();
    Ok(EdgeWrite::new(source, target, relation).with_properties(properties))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FactgraphConfig;
    use crate::services::CancellationToken;
    use crate::storage::InMemoryGraphStore;
    use std::sync::Arc;

    fn context() -> CommandContext<InMemoryGraphStore> {
        CommandContext::from_backend(
            Arc::new(InMemoryGraphStore::new()),
            &FactgraphConfig::default(),
            CancellationToken::new(),
        )
    }

    fn seed(ctx: &CommandContext<InMemoryGraphStore>) {
        cmd_merge_node(ctx, "Company", r#"{"ticker":"TSM"}"#).unwrap();
        cmd_merge_node(ctx, "Company", r#"{"ticker":"NVDA"}"#).unwrap();
    }

    #[test]
    fn test_merge_node_outputs_node() {
        let ctx = context();
        let out = cmd_merge_node(&ctx, "company", r#"{"ticker":"NVDA","name":"NVIDIA"}"#).unwrap();
        assert_eq!(out["label"], "Company");
        assert_eq!(out["natural_key"], "NVDA");
        assert_eq!(out["properties"]["name"], "NVIDIA");
    }

    #[test]
    fn test_merge_node_rejects_non_object() {
        let ctx = context();
        let err = cmd_merge_node(&ctx, "Company", "[1,2]").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_temporal_conflict_then_supersede() {
        let ctx = context();
        seed(&ctx);
        let mut args = TemporalEdgeArgs {
            source: "Company:TSM".to_string(),
            target: "Company:NVDA".to_string(),
            relation: "SUPPLIES_TO".to_string(),
            valid_from: "2020-01-01".to_string(),
            ..TemporalEdgeArgs::default()
        };
        let first = cmd_merge_edge_temporal(&ctx, &args).unwrap();
        assert_eq!(first["temporal"]["version"], 1);

        args.valid_from = "2021-01-01".to_string();
        let err = cmd_merge_edge_temporal(&ctx, &args).unwrap_err();
        assert!(matches!(err, Error::TemporalConflict { version: 1, .. }));

        args.policy = Some("supersede".to_string());
        let second = cmd_merge_edge_temporal(&ctx, &args).unwrap();
        assert_eq!(second["temporal"]["version"], 2);

        let history = cmd_history(&ctx, "Company:TSM", "Company:NVDA", "SUPPLIES_TO").unwrap();
        assert_eq!(history.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_merge_edge_missing_endpoint() {
        let ctx = context();
        seed(&ctx);
        let err = cmd_merge_edge(&ctx, "Company:TSM", "Company:AMD", "SUPPLIES_TO", None)
            .unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(ref r) if r == "Company:AMD"));
    }

    #[test]
    fn test_get_node_by_id_and_key() {
        let ctx = context();
        seed(&ctx);
        let by_key = cmd_get_node(&ctx, "Company:NVDA").unwrap();
        let id = by_key["id"].as_i64().unwrap();
        let by_id = cmd_get_node(&ctx, &format!("#{id}")).unwrap();
        assert_eq!(by_key, by_id);

        assert!(matches!(
            cmd_get_node(&ctx, "Company:AMD"),
            Err(Error::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_reset_requires_confirmation() {
        let ctx = context();
        seed(&ctx);
        assert!(cmd_reset(&ctx, false).is_err());
        assert_eq!(cmd_stats(&ctx).unwrap()["total_nodes"], 2);

        let out = cmd_reset(&ctx, true).unwrap();
        assert_eq!(out["nodes_deleted"], 2);
        assert_eq!(cmd_stats(&ctx).unwrap()["total_nodes"], 0);
    }
}
