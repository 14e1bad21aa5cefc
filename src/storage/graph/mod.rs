//! Graph store implementations.
//!
//! | Store | Persistence | Use Case |
//! |-------|-------------|----------|
//! | [`SqliteGraphStore`] | File or in-memory `SQLite` | Default |
//! | [`InMemoryGraphStore`] | None | Tests and ephemeral graphs |
//!
//! Both stores share the rules in this module and in
//! [`crate::models::temporal`], so they agree on conflicts, survivors and
//! self-loop collapse.

mod memory;
mod sqlite;

pub use memory::InMemoryGraphStore;
pub use sqlite::SqliteGraphStore;

use crate::Error;
use crate::models::{EdgeId, EdgeWrite, ValidityInterval};

/// Builds the conflict error for a rejected temporal write.
fn temporal_conflict(edge: &EdgeWrite, version: u32, interval: &ValidityInterval) -> Error {
    Error::TemporalConflict {
        source_ref: edge.source.to_string(),
        target_ref: edge.target.to_string(),
        relation_type: edge.relation_type.clone(),
        version,
        interval: interval.to_string(),
    }
}

/// Splits key-sorted rows into runs sharing a key, keeping runs of two or more.
fn duplicate_runs<K: PartialEq, V>(rows: Vec<(K, V)>) -> Vec<(K, Vec<V>)> {
    let mut runs: Vec<(K, Vec<V>)> = Vec::new();
    for (key, value) in rows {
        match runs.last_mut() {
            Some((last, values)) if *last == key => values.push(value),
            _ => runs.push((key, vec![value])),
        }
    }
    runs.retain(|(_, values)| values.len() > 1);
    runs
}

/// Picks the self-loops to delete after a redirect.
///
/// `loops` are the survivor's simple self-loops sorted by relation type then
/// id. Within each relation type that has more than one loop and includes a
/// loop created by the redirect (`touched`), every loop but the lowest id is
/// returned.
fn collapse_self_loops(loops: &[(EdgeId, String)], touched: &[EdgeId]) -> Vec<EdgeId> {
    let rows: Vec<(&str, EdgeId)> = loops.iter().map(|(id, rel)| (rel.as_str(), *id)).collect();
    duplicate_runs(rows)
        .into_iter()
        .filter(|(_, ids)| ids.iter().any(|id| touched.contains(id)))
        .flat_map(|(_, ids)| ids.into_iter().skip(1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Label, NodeRef};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_duplicate_runs() {
        let rows = vec![("a", 1), ("a", 2), ("b", 3), ("c", 4), ("c", 5), ("c", 6)];
        assert_eq!(
            duplicate_runs(rows),
            vec![("a", vec![1, 2]), ("c", vec![4, 5, 6])]
        );
        assert!(duplicate_runs::<&str, i32>(Vec::new()).is_empty());
    }

    #[test]
    fn test_collapse_self_loops_only_touched_types() {
        let loops = vec![
            (EdgeId::new(1), "AFFECTS".to_string()),
            (EdgeId::new(7), "AFFECTS".to_string()),
            (EdgeId::new(2), "RELATED".to_string()),
            (EdgeId::new(3), "RELATED".to_string()),
            (EdgeId::new(9), "SOLO".to_string()),
        ];
        // Only AFFECTS gained a loop from the redirect.
        let delete = collapse_self_loops(&loops, &[EdgeId::new(7), EdgeId::new(9)]);
        assert_eq!(delete, vec![EdgeId::new(7)]);
    }

    #[test]
    fn test_temporal_conflict_names_refs() {
        let write = EdgeWrite::new(
            NodeRef::key(Label::Company, "TSM"),
            NodeRef::key(Label::Company, "NVDA"),
            "SUPPLIES_TO",
        );
        let interval =
            ValidityInterval::open_ended(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
        match temporal_conflict(&write, 1, &interval) {
            Error::TemporalConflict {
                source_ref,
                target_ref,
                version,
                ..
            } => {
                assert_eq!(source_ref, "Company:TSM");
                assert_eq!(target_ref, "Company:NVDA");
                assert_eq!(version, 1);
            },
            other => panic!("unexpected error: {other}"),
        }
    }
}
