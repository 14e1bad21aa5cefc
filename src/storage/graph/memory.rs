//! In-memory graph store.
//!
//! Keeps the whole graph behind one `RwLock`. Every operation validates
//! before it mutates, so a failed call leaves the graph as it was and a
//! poisoned lock can be recovered.

use super::{collapse_self_loops, duplicate_runs, temporal_conflict};
use crate::models::temporal::{self, TemporalPlan, VersionSlot, plan_temporal_write};
use crate::models::{
    ConflictPolicy, DuplicateEdgeGroup, DuplicateNodeGroup, Edge, EdgeId, EdgeQuery, EdgeWrite,
    GroupMergeOutcome, Label, Node, NodeFingerprint, NodeId, NodeRef, Properties, TemporalBounds,
    ValidityInterval, strip_reserved,
};
use crate::storage::sqlite::observe;
use crate::storage::traits::{GraphStats, GraphStore};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "memory";

#[derive(Debug, Default)]
struct GraphState {
    nodes: BTreeMap<NodeId, Node>,
    keys: HashMap<(Label, String), NodeId>,
    edges: BTreeMap<EdgeId, Edge>,
    last_node_id: i64,
    last_edge_id: i64,
}

impl GraphState {
    fn resolve(&self, node: &NodeRef) -> Option<&Node> {
        let id = match node {
            NodeRef::Key { label, key } => *self.keys.get(&(*label, key.clone()))?,
            NodeRef::Id(id) => *id,
        };
        self.nodes.get(&id)
    }

    fn require(&self, node: &NodeRef) -> Result<NodeId> {
        self.resolve(node)
            .map(|n| n.id)
            .ok_or_else(|| Error::NodeNotFound(node.to_string()))
    }

    const fn next_node_id(&mut self) -> NodeId {
        self.last_node_id += 1;
        NodeId::new(self.last_node_id)
    }

    const fn next_edge_id(&mut self) -> EdgeId {
        self.last_edge_id += 1;
        EdgeId::new(self.last_edge_id)
    }

    fn history(&self, source: NodeId, target: NodeId, relation_type: &str) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .edges
            .values()
            .filter(|e| {
                e.is_temporal()
                    && e.source == source
                    && e.target == target
                    && e.relation_type == relation_type
            })
            .cloned()
            .collect();
        edges.sort_by_key(Edge::version);
        edges
    }

    fn version_slots(&self, source: NodeId, target: NodeId, relation_type: &str) -> Vec<VersionSlot> {
        self.history(source, target, relation_type)
            .into_iter()
            .filter_map(|edge| {
                edge.temporal.map(|bounds| VersionSlot {
                    edge_id: edge.id,
                    version: bounds.version,
                    interval: bounds.interval,
                })
            })
            .collect()
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.edges
            .values()
            .any(|e| e.source == node || e.target == node)
    }

    fn fingerprint(node: &Node) -> String {
        NodeFingerprint::compute(node.label, &node.properties)
    }

    /// Moves every edge of `member` onto `survivor`, then deletes `member`.
    fn absorb_node(&mut self, survivor: NodeId, member: NodeId) -> GroupMergeOutcome {
        let mut outcome = GroupMergeOutcome::default();

        let touched: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| !e.is_temporal() && (e.source == member || e.target == member))
            .map(|e| e.id)
            .collect();
        for id in &touched {
            if let Some(edge) = self.edges.get_mut(id) {
                if edge.source == member {
                    edge.source = survivor;
                }
                if edge.target == member {
                    edge.target = survivor;
                }
            }
        }
        outcome.edges_redirected += touched.len();

        let mut loops: Vec<(EdgeId, String)> = self
            .edges
            .values()
            .filter(|e| !e.is_temporal() && e.source == survivor && e.target == survivor)
            .map(|e| (e.id, e.relation_type.clone()))
            .collect();
        loops.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        for id in collapse_self_loops(&loops, &touched) {
            self.edges.remove(&id);
            outcome.self_loops_collapsed += 1;
        }

        let mut moving: Vec<Edge> = self
            .edges
            .values()
            .filter(|e| e.is_temporal() && (e.source == member || e.target == member))
            .cloned()
            .collect();
        moving.sort_by(|a, b| {
            (a.source, a.target, &a.relation_type, a.version())
                .cmp(&(b.source, b.target, &b.relation_type, b.version()))
        });
        for edge in moving {
            let Some(interval) = edge.interval() else {
                continue;
            };
            let source = if edge.source == member { survivor } else { edge.source };
            let target = if edge.target == member { survivor } else { edge.target };
            let slots = self.version_slots(source, target, &edge.relation_type);

            if slots.iter().any(|slot| slot.interval.overlaps(&interval)) {
                self.edges.remove(&edge.id);
                outcome.temporal_edges_dropped += 1;
                continue;
            }

            let version = slots.iter().map(|slot| slot.version).max().unwrap_or(0) + 1;
            if let Some(stored) = self.edges.get_mut(&edge.id) {
                stored.source = source;
                stored.target = target;
                stored.temporal = Some(TemporalBounds { interval, version });
                outcome.edges_redirected += 1;
            }
        }

        if let Some(node) = self.nodes.remove(&member) {
            self.keys.remove(&(node.label, node.natural_key));
            outcome.nodes_merged += 1;
        }
        outcome
    }
}

/// In-memory graph store for testing.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
}

impl InMemoryGraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_read<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&GraphState) -> Result<T>,
    ) -> Result<T> {
        let start = Instant::now();
        let state = self.state.read().unwrap_or_else(|poisoned| {
            tracing::warn!(operation, "graph lock was poisoned, recovering");
            poisoned.into_inner()
        });
        let result = f(&state);
        drop(state);
        observe(BACKEND, operation, start, result)
    }

    fn with_write<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut GraphState) -> Result<T>,
    ) -> Result<T> {
        let start = Instant::now();
        let mut state = self.state.write().unwrap_or_else(|poisoned| {
            tracing::warn!(operation, "graph lock was poisoned, recovering");
            poisoned.into_inner()
        });
        let result = f(&mut state);
        drop(state);
        observe(BACKEND, operation, start, result)
    }
}

impl GraphStore for InMemoryGraphStore {
    #[instrument(skip(self, properties), fields(label = %label))]
    fn merge_node(&self, label: Label, properties: Properties) -> Result<Node> {
        let properties = strip_reserved(properties);
        let natural_key = label.natural_key(&properties)?;

        self.with_write("merge_node", |state| {
            let now = temporal::now();
            if let Some(id) = state.keys.get(&(label, natural_key.clone())).copied()
                && let Some(node) = state.nodes.get_mut(&id)
            {
                node.properties.extend(properties);
                node.updated_at = now.max(node.updated_at);
                return Ok(node.clone());
            }

            let node = Node {
                id: state.next_node_id(),
                label,
                natural_key: natural_key.clone(),
                properties,
                created_at: now,
                updated_at: now,
            };
            state.keys.insert((label, natural_key), node.id);
            state.nodes.insert(node.id, node.clone());
            Ok(node)
        })
    }

    fn get_node(&self, node: &NodeRef) -> Result<Option<Node>> {
        self.with_read("get_node", |state| Ok(state.resolve(node).cloned()))
    }

    fn node_degree(&self, node: NodeId) -> Result<usize> {
        self.with_read("node_degree", |state| {
            Ok(state
                .edges
                .values()
                .filter(|e| e.source == node || e.target == node)
                .count())
        })
    }

    #[instrument(skip(self, edge), fields(relation_type = %edge.relation_type))]
    fn merge_edge(&self, edge: &EdgeWrite) -> Result<Edge> {
        edge.validate()?;

        self.with_write("merge_edge", |state| {
            let source = state.require(&edge.source)?;
            let target = state.require(&edge.target)?;
            let now = temporal::now();

            let existing = state
                .edges
                .values()
                .find(|e| {
                    !e.is_temporal()
                        && e.source == source
                        && e.target == target
                        && e.relation_type == edge.relation_type
                })
                .map(|e| e.id);

            if let Some(id) = existing
                && let Some(stored) = state.edges.get_mut(&id)
            {
                stored.properties.clone_from(&edge.properties);
                stored.ingested_at = now;
                return Ok(stored.clone());
            }

            let stored = Edge {
                id: state.next_edge_id(),
                source,
                target,
                relation_type: edge.relation_type.clone(),
                properties: edge.properties.clone(),
                ingested_at: now,
                temporal: None,
            };
            state.edges.insert(stored.id, stored.clone());
            Ok(stored)
        })
    }

    #[instrument(skip(self, edge, interval, policy), fields(relation_type = %edge.relation_type))]
    fn merge_edge_temporal(
        &self,
        edge: &EdgeWrite,
        interval: ValidityInterval,
        policy: ConflictPolicy,
    ) -> Result<Edge> {
        edge.validate()?;

        self.with_write("merge_edge_temporal", |state| {
            let source = state.require(&edge.source)?;
            let target = state.require(&edge.target)?;
            let slots = state.version_slots(source, target, &edge.relation_type);

            let (version, close) = match plan_temporal_write(&slots, &interval, policy) {
                TemporalPlan::Conflict { version } => {
                    return Err(temporal_conflict(edge, version, &interval));
                },
                TemporalPlan::Insert { version, close } => (version, close),
            };

            if let Some((closed_id, end)) = close
                && let Some(closed) = state.edges.get_mut(&closed_id)
                && let Some(bounds) = closed.temporal.as_mut()
            {
                bounds.interval = bounds.interval.close_at(end);
            }

            let stored = Edge {
                id: state.next_edge_id(),
                source,
                target,
                relation_type: edge.relation_type.clone(),
                properties: edge.properties.clone(),
                ingested_at: temporal::now(),
                temporal: Some(TemporalBounds { interval, version }),
            };
            state.edges.insert(stored.id, stored.clone());
            Ok(stored)
        })
    }

    fn edge_history(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        relation_type: &str,
    ) -> Result<Vec<Edge>> {
        self.with_read("edge_history", |state| {
            let source = state.require(source)?;
            let target = state.require(target)?;
            Ok(state.history(source, target, relation_type))
        })
    }

    fn query_edges(&self, query: &EdgeQuery) -> Result<Vec<Edge>> {
        self.with_read("query_edges", |state| {
            Ok(state
                .edges
                .values()
                .filter(|e| query.matches(e))
                .take(query.limit)
                .cloned()
                .collect())
        })
    }

    fn get_stats(&self) -> Result<GraphStats> {
        self.with_read("get_stats", |state| {
            let mut nodes_by_label = BTreeMap::new();
            for node in state.nodes.values() {
                *nodes_by_label.entry(node.label.to_string()).or_insert(0) += 1;
            }
            let mut edges_by_type = BTreeMap::new();
            for edge in state.edges.values() {
                *edges_by_type.entry(edge.relation_type.clone()).or_insert(0) += 1;
            }
            let temporal_edges = state.edges.values().filter(|e| e.is_temporal()).count();
            Ok(GraphStats::from_counts(
                nodes_by_label,
                edges_by_type,
                temporal_edges,
            ))
        })
    }

    fn find_duplicate_nodes(&self, label: Option<Label>) -> Result<Vec<DuplicateNodeGroup>> {
        self.with_read("find_duplicate_nodes", |state| {
            let mut rows: Vec<((Label, String), NodeId)> = state
                .nodes
                .values()
                .filter(|n| label.is_none_or(|l| n.label == l))
                .map(|n| ((n.label, GraphState::fingerprint(n)), n.id))
                .collect();
            rows.sort();

            let mut groups: Vec<DuplicateNodeGroup> = duplicate_runs(rows)
                .into_iter()
                .map(|((label, fingerprint), node_ids)| DuplicateNodeGroup {
                    label,
                    fingerprint,
                    node_ids,
                })
                .collect();
            groups.sort_by_key(DuplicateNodeGroup::survivor);
            Ok(groups)
        })
    }

    #[instrument(skip(self, group), fields(group = %group))]
    fn merge_duplicate_group(&self, group: &DuplicateNodeGroup) -> Result<GroupMergeOutcome> {
        self.with_write("merge_duplicate_group", |state| {
            let mut live: Vec<NodeId> = group
                .node_ids
                .iter()
                .copied()
                .filter(|id| {
                    state.nodes.get(id).is_some_and(|n| {
                        n.label == group.label && GraphState::fingerprint(n) == group.fingerprint
                    })
                })
                .collect();
            live.sort_unstable();
            live.dedup();

            let mut outcome = GroupMergeOutcome::default();
            if let Some((&survivor, members)) = live.split_first() {
                for &member in members {
                    outcome.absorb(state.absorb_node(survivor, member));
                }
            }
            Ok(outcome)
        })
    }

    fn find_duplicate_relationships(&self) -> Result<Vec<DuplicateEdgeGroup>> {
        self.with_read("find_duplicate_relationships", |state| {
            let mut rows: Vec<((NodeId, NodeId, String), EdgeId)> = state
                .edges
                .values()
                .filter(|e| !e.is_temporal())
                .map(|e| ((e.source, e.target, e.relation_type.clone()), e.id))
                .collect();
            rows.sort();

            let mut groups: Vec<DuplicateEdgeGroup> = duplicate_runs(rows)
                .into_iter()
                .map(|((source, target, relation_type), edge_ids)| DuplicateEdgeGroup {
                    source,
                    target,
                    relation_type,
                    edge_ids,
                })
                .collect();
            groups.sort_by_key(|g| g.edge_ids.first().copied());
            Ok(groups)
        })
    }

    #[instrument(skip(self, group), fields(group = %group))]
    fn remove_duplicate_edge_group(&self, group: &DuplicateEdgeGroup) -> Result<usize> {
        self.with_write("remove_duplicate_edge_group", |state| {
            let ids: Vec<EdgeId> = state
                .edges
                .values()
                .filter(|e| {
                    !e.is_temporal()
                        && e.source == group.source
                        && e.target == group.target
                        && e.relation_type == group.relation_type
                })
                .map(|e| e.id)
                .collect();

            let mut removed = 0;
            for id in ids.iter().skip(1) {
                if state.edges.remove(id).is_some() {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    fn find_orphaned_nodes(&self, exclude_labels: &[Label]) -> Result<Vec<NodeId>> {
        self.with_read("find_orphaned_nodes", |state| {
            Ok(state
                .nodes
                .values()
                .filter(|n| !exclude_labels.contains(&n.label) && !state.is_connected(n.id))
                .map(|n| n.id)
                .collect())
        })
    }

    fn delete_orphaned_nodes(&self, nodes: &[NodeId]) -> Result<usize> {
        self.with_write("delete_orphaned_nodes", |state| {
            let mut removed = 0;
            for id in nodes {
                if state.is_connected(*id) {
                    continue;
                }
                if let Some(node) = state.nodes.remove(id) {
                    state.keys.remove(&(node.label, node.natural_key));
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    fn clear(&self) -> Result<()> {
        self.with_write("clear", |state| {
            state.edges.clear();
            state.nodes.clear();
            state.keys.clear();
            Ok(())
        })
    }
}
