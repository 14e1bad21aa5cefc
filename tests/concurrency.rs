//! Concurrent writer tests.
//!
//! Writers racing on the same natural key or the same temporal triple must
//! serialize: one node per key, and versions `1..=N` with no gaps, whether
//! the writers share one store or open the same database file separately.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{DateTime, TimeZone, Utc};
use factgraph::Properties;
use factgraph::models::{ConflictPolicy, EdgeWrite, Label, NodeRef, ValidityInterval};
use factgraph::storage::{GraphStore, InMemoryGraphStore, SqliteGraphStore};
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

const WRITERS: usize = 8;

fn props(value: serde_json::Value) -> Properties {
    serde_json::from_value(value).unwrap()
}

fn year(offset: usize) -> DateTime<Utc> {
    let year = 2000 + i32::try_from(offset).unwrap();
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
}

fn seed(store: &impl GraphStore) {
    store
        .merge_node(Label::Company, props(json!({"ticker": "TSM"})))
        .unwrap();
    store
        .merge_node(Label::Company, props(json!({"ticker": "NVDA"})))
        .unwrap();
}

fn supplies() -> EdgeWrite {
    EdgeWrite::new(
        NodeRef::key(Label::Company, "TSM"),
        NodeRef::key(Label::Company, "NVDA"),
        "SUPPLIES_TO",
    )
}

/// One disjoint one-year interval per writer.
fn write_version(store: &impl GraphStore, writer: usize) {
    let interval = ValidityInterval::new(year(writer), Some(year(writer + 1))).unwrap();
    store
        .merge_edge_temporal(&supplies(), interval, ConflictPolicy::Reject)
        .unwrap();
}

fn assert_contiguous_history(store: &impl GraphStore) {
    let history = store
        .edge_history(
            &NodeRef::key(Label::Company, "TSM"),
            &NodeRef::key(Label::Company, "NVDA"),
            "SUPPLIES_TO",
        )
        .unwrap();
    let versions: Vec<u32> = history.iter().filter_map(|e| e.version()).collect();
    let expected: Vec<u32> = (1..=u32::try_from(WRITERS).unwrap()).collect();
    assert_eq!(versions, expected);

    let intervals: Vec<ValidityInterval> = history.iter().filter_map(|e| e.interval()).collect();
    for (i, a) in intervals.iter().enumerate() {
        for b in &intervals[i + 1..] {
            assert!(!a.overlaps(b), "{a} overlaps {b}");
        }
    }
}

fn shared_store_temporal_writers<B: GraphStore + 'static>(store: B) {
    seed(&store);
    let store = Arc::new(store);
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                write_version(&*store, writer);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_contiguous_history(&*store);
}

fn shared_store_node_writers<B: GraphStore + 'static>(store: B) {
    let store = Arc::new(store);
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut properties = props(json!({"ticker": "NVDA"}));
                properties.insert(format!("seen_by_{writer}"), json!(true));
                barrier.wait();
                store.merge_node(Label::Company, properties).unwrap()
            })
        })
        .collect();
    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap().id).collect();

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    let node = store
        .get_node(&NodeRef::key(Label::Company, "NVDA"))
        .unwrap()
        .unwrap();
    // Every writer's property survived: no update was lost.
    assert_eq!(node.properties.len(), WRITERS + 1);
    assert_eq!(store.get_stats().unwrap().total_nodes, 1);
}

fn overlapping_writers_admit_exactly_one<B: GraphStore + 'static>(store: B) {
    seed(&store);
    let store = Arc::new(store);
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.merge_edge_temporal(
                    &supplies(),
                    ValidityInterval::open_ended(year(20)),
                    ConflictPolicy::Reject,
                )
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, factgraph::Error::TemporalConflict { version: 1, .. }))
    );
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
                    let dir = TempDir::new().unwrap();
                    super::$name(SqliteGraphStore::new(dir.path().join("graph.db")).unwrap());
                }
            )*
        }
    };
}

for_each_store!(
    shared_store_temporal_writers,
    shared_store_node_writers,
    overlapping_writers_admit_exactly_one,
);

// ============================================================================
// Separate connections to one file
// ============================================================================

fn open_writers(dir: &TempDir) -> Vec<SqliteGraphStore> {
    let path = dir.path().join("graph.db");
    // Opened up front so schema creation does not race.
    (0..WRITERS)
        .map(|_| SqliteGraphStore::new(&path).unwrap())
        .collect()
}

#[test]
fn test_separate_connections_temporal_writers() {
    let dir = TempDir::new().unwrap();
    let stores = open_writers(&dir);
    seed(&stores[0]);
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = stores
        .into_iter()
        .enumerate()
        .map(|(writer, store)| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                write_version(&store, writer);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reader = SqliteGraphStore::new(dir.path().join("graph.db")).unwrap();
    assert_contiguous_history(&reader);
    assert_eq!(reader.get_stats().unwrap().temporal_edges, WRITERS);
}

#[test]
fn test_separate_connections_node_writers() {
    let dir = TempDir::new().unwrap();
    let stores = open_writers(&dir);
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = stores
        .into_iter()
        .enumerate()
        .map(|(writer, store)| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store
                    .merge_node(
                        Label::Concept,
                        props(json!({"name": "reshoring", "writer": writer})),
                    )
                    .unwrap()
                    .id
            })
        })
        .collect();
    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    let reader = SqliteGraphStore::new(dir.path().join("graph.db")).unwrap();
    assert_eq!(reader.get_stats().unwrap().nodes_with_label(Label::Concept), 1);
}
