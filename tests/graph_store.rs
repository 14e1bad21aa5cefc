//! Graph store integration tests.
//!
//! Every scenario runs against both stores so they stay interchangeable:
//! node upserts, simple edges, versioned edges and edge queries.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{DateTime, TimeZone, Utc};
use factgraph::models::{ConflictPolicy, EdgeQuery, EdgeWrite, Label, NodeRef, ValidityInterval};
use factgraph::services::GraphService;
use factgraph::storage::{GraphStore, InMemoryGraphStore, SqliteGraphStore};
use factgraph::{Error, Properties};
use serde_json::json;
use tempfile::TempDir;

fn props(value: serde_json::Value) -> Properties {
    serde_json::from_value(value).unwrap()
}

fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

fn company(ticker: &str) -> NodeRef {
    NodeRef::key(Label::Company, ticker)
}

fn seed_companies<B: GraphStore>(graph: &GraphService<B>) {
    graph.merge_node("Company", props(json!({"ticker": "TSM"}))).unwrap();
    graph.merge_node("Company", props(json!({"ticker": "NVDA"}))).unwrap();
}

fn supplies() -> EdgeWrite {
    EdgeWrite::new(company("TSM"), company("NVDA"), "SUPPLIES_TO")
}

// ============================================================================
// Nodes
// ============================================================================

fn node_merge_accumulates_properties<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);

    let first = graph
        .merge_node("Company", props(json!({"ticker": "NVDA", "name": "NVIDIA"})))
        .unwrap();
    let second = graph
        .merge_node("Company", props(json!({"ticker": "NVDA", "sector": "Semis"})))
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(
        second.properties,
        props(json!({"ticker": "NVDA", "name": "NVIDIA", "sector": "Semis"}))
    );

    let stats = graph.get_stats().unwrap();
    assert_eq!(stats.total_nodes, 1);
    assert_eq!(stats.nodes_with_label(Label::Company), 1);
}

fn node_merge_overwrites_scalar<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    graph
        .merge_node("Company", props(json!({"ticker": "NVDA", "name": "Nvidia"})))
        .unwrap();
    let node = graph
        .merge_node("Company", props(json!({"ticker": "NVDA", "name": "NVIDIA Corp"})))
        .unwrap();
    assert_eq!(node.properties["name"], json!("NVIDIA Corp"));
}

fn node_merge_numeric_and_string_keys_coincide<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    let first = graph
        .merge_node("Event", props(json!({"id": 42, "kind": "earnings"})))
        .unwrap();
    let second = graph
        .merge_node("Event", props(json!({"id": "42"})))
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.natural_key, "42");
    // The key property keeps the last written representation.
    assert_eq!(second.properties["id"], json!("42"));
    assert_eq!(second.properties["kind"], json!("earnings"));
    assert_eq!(graph.get_stats().unwrap().total_nodes, 1);
}

fn node_merge_ignores_reserved_properties<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    let node = graph
        .merge_node(
            "Concept",
            props(json!({"name": "reshoring", "created_at": "1999-01-01"})),
        )
        .unwrap();
    assert!(!node.properties.contains_key("created_at"));
    assert!(node.created_at > date(2000, 1, 1));
}

fn node_merge_validates_label_and_key<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);

    assert!(matches!(
        graph.merge_node("Planet", props(json!({"name": "Mars"}))),
        Err(Error::InvalidLabel(_))
    ));
    assert!(matches!(
        graph.merge_node("Company", props(json!({"name": "NVIDIA"}))),
        Err(Error::MissingKey { ref field, .. }) if field == "ticker"
    ));
    assert!(matches!(
        graph.merge_node("Company", props(json!({"ticker": "  "}))),
        Err(Error::MissingKey { .. })
    ));
    assert_eq!(graph.get_stats().unwrap().total_nodes, 0);
}

fn node_lookup_by_key_and_id<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    let node = graph
        .merge_node("Instrument", props(json!({"symbol": "SOXX"})))
        .unwrap();

    let by_key = graph
        .get_node(&NodeRef::key(Label::Instrument, "SOXX"))
        .unwrap()
        .unwrap();
    let by_id = graph.get_node(&NodeRef::Id(node.id)).unwrap().unwrap();
    assert_eq!(by_key, by_id);

    // Natural keys are case-sensitive.
    assert!(graph
        .get_node(&NodeRef::key(Label::Instrument, "soxx"))
        .unwrap()
        .is_none());
    assert!(matches!(
        graph.require_node(&NodeRef::key(Label::Instrument, "SMH")),
        Err(Error::NodeNotFound(_))
    ));
}

// ============================================================================
// Simple edges
// ============================================================================

fn simple_edge_is_idempotent<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    seed_companies(&graph);

    let first = graph
        .merge_edge(&supplies().with_property("share", 60))
        .unwrap();
    let second = graph
        .merge_edge(&supplies().with_property("share", 70))
        .unwrap();

    assert_eq!(first.id, second.id);
    assert!(second.ingested_at >= first.ingested_at);
    assert_eq!(second.properties, props(json!({"share": 70})));

    let stats = graph.get_stats().unwrap();
    assert_eq!(stats.total_edges, 1);
    assert_eq!(stats.edges_with_type("SUPPLIES_TO"), 1);
    assert_eq!(stats.temporal_edges, 0);
}

fn edge_requires_both_endpoints<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    seed_companies(&graph);

    let err = graph
        .merge_edge(&EdgeWrite::new(company("TSM"), company("AMD"), "SUPPLIES_TO"))
        .unwrap_err();
    assert!(matches!(err, Error::NodeNotFound(ref r) if r == "Company:AMD"));

    let err = graph
        .merge_edge_temporal(
            &EdgeWrite::new(company("INTC"), company("NVDA"), "SUPPLIES_TO"),
            date(2020, 1, 1),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, Error::NodeNotFound(_)));

    assert_eq!(graph.get_stats().unwrap().total_edges, 0);
    assert_eq!(graph.get_stats().unwrap().total_nodes, 2);
}

// ============================================================================
// Temporal edges
// ============================================================================

fn temporal_disjoint_interval_appends_version<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    seed_companies(&graph);

    let v1 = graph
        .merge_edge_temporal(&supplies(), date(2020, 1, 1), None)
        .unwrap();
    let v2 = graph
        .merge_edge_temporal(&supplies(), date(2019, 1, 1), Some(date(2019, 6, 1)))
        .unwrap();

    assert_eq!(v1.version(), Some(1));
    assert_eq!(v2.version(), Some(2));
    assert_ne!(v1.id, v2.id);

    let history = graph
        .edge_history(&company("TSM"), &company("NVDA"), "SUPPLIES_TO")
        .unwrap();
    let versions: Vec<u32> = history.iter().filter_map(|e| e.version()).collect();
    assert_eq!(versions, vec![1, 2]);
    assert_eq!(graph.get_stats().unwrap().temporal_edges, 2);
}

fn temporal_overlap_is_rejected<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    seed_companies(&graph);

    graph
        .merge_edge_temporal(&supplies(), date(2020, 1, 1), None)
        .unwrap();
    let err = graph
        .merge_edge_temporal(&supplies(), date(2021, 1, 1), None)
        .unwrap_err();

    match err {
        Error::TemporalConflict {
            source_ref,
            target_ref,
            relation_type,
            version,
            ..
        } => {
            assert_eq!(source_ref, "Company:TSM");
            assert_eq!(target_ref, "Company:NVDA");
            assert_eq!(relation_type, "SUPPLIES_TO");
            assert_eq!(version, 1);
        },
        other => panic!("expected a temporal conflict, got {other}"),
    }

    let history = graph
        .edge_history(&company("TSM"), &company("NVDA"), "SUPPLIES_TO")
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].interval().unwrap().valid_to, None);
}

fn temporal_touching_intervals_do_not_overlap<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    seed_companies(&graph);

    graph
        .merge_edge_temporal(&supplies(), date(2019, 1, 1), Some(date(2020, 1, 1)))
        .unwrap();
    let next = graph
        .merge_edge_temporal(&supplies(), date(2020, 1, 1), None)
        .unwrap();
    assert_eq!(next.version(), Some(2));
}

fn temporal_supersede_closes_previous<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    seed_companies(&graph);

    let v1 = graph
        .merge_edge_temporal(&supplies(), date(2020, 1, 1), None)
        .unwrap();
    let interval = ValidityInterval::open_ended(date(2021, 1, 1));
    let v2 = graph
        .merge_edge_temporal_with_policy(&supplies(), interval, ConflictPolicy::Supersede)
        .unwrap();
    assert_eq!(v2.version(), Some(2));

    let history = graph
        .edge_history(&company("TSM"), &company("NVDA"), "SUPPLIES_TO")
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, v1.id);
    assert_eq!(
        history[0].interval().unwrap(),
        ValidityInterval::new(date(2020, 1, 1), Some(date(2021, 1, 1))).unwrap()
    );
    assert!(history[1].interval().unwrap().is_open_ended());
}

fn temporal_supersede_cannot_rewrite_later_version<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    seed_companies(&graph);

    graph
        .merge_edge_temporal(&supplies(), date(2020, 1, 1), None)
        .unwrap();
    let interval = ValidityInterval::open_ended(date(2019, 1, 1));
    let err = graph
        .merge_edge_temporal_with_policy(&supplies(), interval, ConflictPolicy::Supersede)
        .unwrap_err();
    assert!(matches!(err, Error::TemporalConflict { version: 1, .. }));
}

fn temporal_and_simple_edges_coexist<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    seed_companies(&graph);

    graph.merge_edge(&supplies()).unwrap();
    graph
        .merge_edge_temporal(&supplies(), date(2020, 1, 1), None)
        .unwrap();

    let stats = graph.get_stats().unwrap();
    assert_eq!(stats.total_edges, 2);
    assert_eq!(stats.temporal_edges, 1);
    // Simple edges never appear in a temporal history.
    let history = graph
        .edge_history(&company("TSM"), &company("NVDA"), "SUPPLIES_TO")
        .unwrap();
    assert_eq!(history.len(), 1);
}

fn invalid_interval_is_rejected<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    seed_companies(&graph);

    let err = graph
        .merge_edge_temporal(&supplies(), date(2020, 1, 1), Some(date(2020, 1, 1)))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(graph.get_stats().unwrap().total_edges, 0);
}

// ============================================================================
// Queries
// ============================================================================

fn query_edges_filters<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    seed_companies(&graph);
    let amd = graph
        .merge_node("Company", props(json!({"ticker": "AMD"})))
        .unwrap();
    let nvda = graph.require_node(&company("NVDA")).unwrap();

    graph
        .merge_edge_temporal(&supplies(), date(2019, 1, 1), Some(date(2020, 1, 1)))
        .unwrap();
    graph
        .merge_edge_temporal(&supplies(), date(2020, 1, 1), None)
        .unwrap();
    graph
        .merge_edge(&EdgeWrite::new(company("TSM"), &amd, "SUPPLIES_TO"))
        .unwrap();
    graph
        .merge_edge(&EdgeWrite::new(&amd, company("NVDA"), "COMPETES_WITH"))
        .unwrap();

    let into_nvda = graph
        .query_edges(&EdgeQuery::new().to_node(nvda.id))
        .unwrap();
    assert_eq!(into_nvda.len(), 3);

    let suppliers = graph
        .query_edges(
            &EdgeQuery::new()
                .to_node(nvda.id)
                .with_relation_type("SUPPLIES_TO")
                .temporal_only()
                .valid_at(date(2019, 6, 1)),
        )
        .unwrap();
    assert_eq!(suppliers.len(), 1);
    assert_eq!(suppliers[0].version(), Some(1));

    let from_amd = graph
        .query_edges(&EdgeQuery::new().from_node(amd.id))
        .unwrap();
    assert_eq!(from_amd.len(), 1);
    assert_eq!(from_amd[0].relation_type, "COMPETES_WITH");

    let limited = graph.query_edges(&EdgeQuery::new().with_limit(2)).unwrap();
    assert_eq!(limited.len(), 2);
}

fn clear_empties_graph<B: GraphStore>(store: B) {
    let graph = GraphService::new(store);
    seed_companies(&graph);
    graph.merge_edge(&supplies()).unwrap();

    graph.clear().unwrap();
    let stats = graph.get_stats().unwrap();
    assert_eq!(stats.total_nodes, 0);
    assert_eq!(stats.total_edges, 0);
    assert!(graph.get_node(&company("NVDA")).unwrap().is_none());

    // Keys are free again.
    seed_companies(&graph);
    assert_eq!(graph.get_stats().unwrap().total_nodes, 2);
}

macro_rules! for_each_store {
    ($($name:ident),* $(,)?) => {
        mod memory {
            use super::*;
            $(
                #[test]
                fn $name() {
                    super::$name(InMemoryGraphStore::new());
                }
            )*
        }

        mod sqlite {
            use super::*;
            $(
                #[test]
                fn $name() {
                    super::$name(SqliteGraphStore::in_memory().unwrap());
                }
            )*
        }
    };
}

for_each_store!(
    node_merge_accumulates_properties,
    node_merge_overwrites_scalar,
    node_merge_numeric_and_string_keys_coincide,
    node_merge_ignores_reserved_properties,
    node_merge_validates_label_and_key,
    node_lookup_by_key_and_id,
    simple_edge_is_idempotent,
    edge_requires_both_endpoints,
    temporal_disjoint_interval_appends_version,
    temporal_overlap_is_rejected,
    temporal_touching_intervals_do_not_overlap,
    temporal_supersede_closes_previous,
    temporal_supersede_cannot_rewrite_later_version,
    temporal_and_simple_edges_coexist,
    invalid_interval_is_rejected,
    query_edges_filters,
    clear_empties_graph,
);

// ============================================================================
// SQLite persistence
// ============================================================================

#[test]
fn test_sqlite_graph_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.db");

    {
        let graph = GraphService::new(SqliteGraphStore::new(&path).unwrap());
        seed_companies(&graph);
        graph
            .merge_edge_temporal(&supplies(), date(2020, 1, 1), None)
            .unwrap();
    }

    let graph = GraphService::new(SqliteGraphStore::new(&path).unwrap());
    let stats = graph.get_stats().unwrap();
    assert_eq!(stats.total_nodes, 2);
    assert_eq!(stats.temporal_edges, 1);

    let next = graph
        .merge_edge_temporal(&supplies(), date(2018, 1, 1), Some(date(2019, 1, 1)))
        .unwrap();
    assert_eq!(next.version(), Some(2));
}

#[test]
fn test_sqlite_unopenable_path_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"plain file").unwrap();
    let result = SqliteGraphStore::new(blocker.join("graph.db"));
    assert!(matches!(result, Err(Error::StorageUnavailable(_))));
}
