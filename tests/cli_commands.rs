//! CLI command tests against an on-disk database.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use factgraph::cli::{
    CommandContext, MaintainArgs, TemporalEdgeArgs, cmd_duplicates, cmd_maintain,
    cmd_merge_edge, cmd_merge_edge_temporal, cmd_merge_node, cmd_stats,
};
use factgraph::config::FactgraphConfig;
use factgraph::services::{CancellationToken, MaintenanceStep};
use factgraph::{ConflictPolicy, Error};
use tempfile::TempDir;

fn config(dir: &TempDir) -> FactgraphConfig {
    FactgraphConfig::default().with_db_path(dir.path().join("graph.db"))
}

#[test]
fn test_commands_share_one_database() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    {
        let ctx = CommandContext::open(&config, CancellationToken::new()).unwrap();
        cmd_merge_node(&ctx, "Company", r#"{"ticker":"TSM"}"#).unwrap();
        cmd_merge_node(&ctx, "Company", r#"{"ticker":"NVDA"}"#).unwrap();
        cmd_merge_edge(
            &ctx,
            "Company:TSM",
            "Company:NVDA",
            "SUPPLIES_TO",
            Some(r#"{"share":60}"#),
        )
        .unwrap();
    }

    let ctx = CommandContext::open(&config, CancellationToken::new()).unwrap();
    let stats = cmd_stats(&ctx).unwrap();
    assert_eq!(stats["total_nodes"], 2);
    assert_eq!(stats["edges_by_type"]["SUPPLIES_TO"], 1);
}

#[test]
fn test_configured_policy_applies_without_flag() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir).with_conflict_policy(ConflictPolicy::Supersede);
    let ctx = CommandContext::open(&config, CancellationToken::new()).unwrap();
    cmd_merge_node(&ctx, "Company", r#"{"ticker":"TSM"}"#).unwrap();
    cmd_merge_node(&ctx, "Company", r#"{"ticker":"NVDA"}"#).unwrap();

    let mut args = TemporalEdgeArgs {
        source: "Company:TSM".to_string(),
        target: "Company:NVDA".to_string(),
        relation: "SUPPLIES_TO".to_string(),
        valid_from: "2020-01-01".to_string(),
        ..TemporalEdgeArgs::default()
    };
    cmd_merge_edge_temporal(&ctx, &args).unwrap();

    args.valid_from = "2021-01-01".to_string();
    let second = cmd_merge_edge_temporal(&ctx, &args).unwrap();
    assert_eq!(second["temporal"]["version"], 2);

    args.valid_from = "2022-01-01".to_string();
    args.policy = Some("reject".to_string());
    let err = cmd_merge_edge_temporal(&ctx, &args).unwrap_err();
    assert!(matches!(err, Error::TemporalConflict { version: 2, .. }));
}

#[test]
fn test_maintain_removes_duplicates_and_orphans() {
    let dir = TempDir::new().unwrap();
    let ctx = CommandContext::open(&config(&dir), CancellationToken::new()).unwrap();
    cmd_merge_node(&ctx, "Company", r#"{"ticker":"NVDA"}"#).unwrap();
    cmd_merge_node(&ctx, "News", r#"{"id":"n-1","headline":"Export curbs"}"#).unwrap();
    cmd_merge_node(&ctx, "News", r#"{"id":"n-2","headline":"Export curbs"}"#).unwrap();
    cmd_merge_edge(&ctx, "News:n-1", "Company:NVDA", "MENTIONS", None).unwrap();
    cmd_merge_edge(&ctx, "News:n-2", "Company:NVDA", "MENTIONS", None).unwrap();
    cmd_merge_node(&ctx, "Location", r#"{"country":"TW"}"#).unwrap();

    let duplicates = cmd_duplicates(&ctx, Some("news")).unwrap();
    assert_eq!(duplicates["nodes"].as_array().map(Vec::len), Some(1));

    let nodes_only = cmd_maintain(
        &ctx,
        &MaintainArgs {
            only: Some(MaintenanceStep::Nodes),
            ..MaintainArgs::default()
        },
    )
    .unwrap();
    assert_eq!(nodes_only["nodes"]["nodes_merged"], 1);
    assert!(nodes_only["orphans"].is_null());

    let full = cmd_maintain(&ctx, &MaintainArgs::default()).unwrap();
    assert_eq!(full["edges"]["removed"], 1);
    assert_eq!(full["orphans"]["removed"], 1);
    assert_eq!(full["after"]["total_nodes"], 2);
    assert_eq!(full["after"]["total_edges"], 1);
}
