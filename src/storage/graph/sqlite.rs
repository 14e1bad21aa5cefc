//! `SQLite` graph store.
//!
//! Nodes and edges live in two tables. The `(label, natural_key)` uniqueness
//! rule and the per-triple version uniqueness of temporal edges are enforced
//! by the schema, so a writer that bypassed the transaction discipline would
//! still be stopped by the database.

// SQLite returns i64 for ids, counts and versions; all are non-negative and small.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
// Closures are needed to adapt rusqlite's error type.
#![allow(clippy::redundant_closure_for_method_calls)]

use super::{collapse_self_loops, duplicate_runs, temporal_conflict};
use crate::config::StorageConfig;
use crate::models::temporal::{self, TemporalPlan, VersionSlot, plan_temporal_write};
use crate::models::{
    ConflictPolicy, DuplicateEdgeGroup, DuplicateNodeGroup, Edge, EdgeId, EdgeQuery, EdgeWrite,
    GroupMergeOutcome, Label, Node, NodeFingerprint, NodeId, NodeRef, Properties, TemporalBounds,
    ValidityInterval, strip_reserved,
};
use crate::storage::resilience::RetryPolicy;
use crate::storage::sqlite::{
    acquire_lock_with_timeout, configure_connection, observe, open_connection, sqlite_error,
};
use crate::storage::traits::{GraphStats, GraphStore};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::instrument;

const BACKEND: &str = "sqlite";

const NODE_COLUMNS: &str = "id, label, natural_key, properties, created_at, updated_at";

const EDGE_COLUMNS: &str = "id, source_id, target_id, relation_type, properties, ingested_at, \
                            temporal, valid_from, valid_to, version";

/// `SQLite`-based graph store.
///
/// # Concurrency Model
///
/// Each store holds one `Mutex<Connection>`. Every write runs in a
/// `BEGIN IMMEDIATE` transaction, which takes the database write lock before
/// the first read, so read-modify-write sequences are serialized across
/// threads and across processes sharing the file. Contention surfaces as
/// `SQLITE_BUSY`, which is retried under the configured [`RetryPolicy`].
///
/// # Schema
///
/// - `graph_nodes`: one row per `(label, natural_key)`, with a duplicate
///   fingerprint
/// - `graph_edges`: simple edges (`temporal = 0`) and versioned edges
///   (`temporal = 1` with interval and version)
pub struct SqliteGraphStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
    /// Bound on waiting for the connection mutex.
    lock_timeout: Duration,
    /// Retry budget for busy transactions.
    retry: RetryPolicy,
}

impl SqliteGraphStore {
    /// Opens (or creates) a store with default storage settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the database cannot be opened.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(db_path, &StorageConfig::default())
    }

    /// Opens (or creates) a store with explicit storage settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the database cannot be opened
    /// or initialized.
    pub fn with_config(db_path: impl Into<PathBuf>, config: &StorageConfig) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_connection(&db_path)?;
        Self::from_connection(conn, Some(db_path), config)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::StorageUnavailable(format!("cannot open in-memory db: {e}")))?;
        Self::from_connection(conn, None, &StorageConfig::default())
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn from_connection(
        conn: Connection,
        db_path: Option<PathBuf>,
        config: &StorageConfig,
    ) -> Result<Self> {
        configure_connection(&conn, config.busy_timeout_ms)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            retry: config.retry_policy(),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates tables and indexes if they do not exist.
    fn initialize(&self) -> Result<()> {
        self.write("initialize", |conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS graph_nodes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    label TEXT NOT NULL,
                    natural_key TEXT NOT NULL,
                    properties TEXT NOT NULL DEFAULT '{}',
                    fingerprint TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    UNIQUE (label, natural_key)
                );

                CREATE TABLE IF NOT EXISTS graph_edges (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    source_id INTEGER NOT NULL REFERENCES graph_nodes(id),
                    target_id INTEGER NOT NULL REFERENCES graph_nodes(id),
                    relation_type TEXT NOT NULL,
                    properties TEXT NOT NULL DEFAULT '{}',
                    ingested_at INTEGER NOT NULL,
                    temporal INTEGER NOT NULL DEFAULT 0 CHECK (temporal IN (0, 1)),
                    valid_from INTEGER,
                    valid_to INTEGER,
                    version INTEGER,
                    CHECK (temporal = 0 OR (valid_from IS NOT NULL AND version >= 1)),
                    CHECK (valid_to IS NULL OR valid_to > valid_from)
                );",
            )
            .map_err(|e| sqlite_error("initialize", &e))?;
            Self::create_indexes(conn)
        })
    }

    fn create_indexes(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_graph_edges_version
                ON graph_edges(source_id, target_id, relation_type, version) WHERE temporal = 1;
             CREATE INDEX IF NOT EXISTS idx_graph_edges_triple
                ON graph_edges(source_id, target_id, relation_type);
             CREATE INDEX IF NOT EXISTS idx_graph_edges_target ON graph_edges(target_id);
             CREATE INDEX IF NOT EXISTS idx_graph_nodes_fingerprint
                ON graph_nodes(label, fingerprint);",
        )
        .map_err(|e| sqlite_error("create_indexes", &e))
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction with bounded retries.
    ///
    /// Dropping the transaction on any error path rolls it back.
    fn write<T>(
        &self,
        operation: &'static str,
        f: impl Fn(&Connection) -> Result<T>,
    ) -> Result<T> {
        self.transact(operation, TransactionBehavior::Immediate, f)
    }

    /// Runs `f` inside a read transaction, so all its queries see one snapshot.
    fn read<T>(&self, operation: &'static str, f: impl Fn(&Connection) -> Result<T>) -> Result<T> {
        self.transact(operation, TransactionBehavior::Deferred, f)
    }

    fn transact<T>(
        &self,
        operation: &'static str,
        behavior: TransactionBehavior,
        f: impl Fn(&Connection) -> Result<T>,
    ) -> Result<T> {
        let start = Instant::now();
        let result = self.retry.run(operation, || {
            let mut conn = acquire_lock_with_timeout(&self.conn, operation, self.lock_timeout)?;
            let tx = conn
                .transaction_with_behavior(behavior)
                .map_err(|e| sqlite_error(operation, &e))?;
            let value = f(&tx)?;
            tx.commit().map_err(|e| sqlite_error(operation, &e))?;
            Ok(value)
        });
        observe(BACKEND, operation, start, result)
    }
}

// ============================================================================
// Row decoding
// ============================================================================

struct NodeRow {
    id: i64,
    label: String,
    natural_key: String,
    properties: String,
    created_at: i64,
    updated_at: i64,
}

impl NodeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            label: row.get(1)?,
            natural_key: row.get(2)?,
            properties: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn decode(self) -> Result<Node> {
        let label = Label::parse(&self.label).ok_or_else(|| Error::OperationFailed {
            operation: "decode_node".to_string(),
            cause: format!("unknown stored label '{}'", self.label),
        })?;
        Ok(Node {
            id: NodeId::new(self.id),
            label,
            natural_key: self.natural_key,
            properties: decode_properties(&self.properties)?,
            created_at: temporal::from_millis(self.created_at)?,
            updated_at: temporal::from_millis(self.updated_at)?,
        })
    }
}

struct EdgeRow {
    id: i64,
    source_id: i64,
    target_id: i64,
    relation_type: String,
    properties: String,
    ingested_at: i64,
    temporal: bool,
    valid_from: Option<i64>,
    valid_to: Option<i64>,
    version: Option<i64>,
}

impl EdgeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_id: row.get(1)?,
            target_id: row.get(2)?,
            relation_type: row.get(3)?,
            properties: row.get(4)?,
            ingested_at: row.get(5)?,
            temporal: row.get(6)?,
            valid_from: row.get(7)?,
            valid_to: row.get(8)?,
            version: row.get(9)?,
        })
    }

    fn decode(self) -> Result<Edge> {
        let temporal = if self.temporal {
            let (Some(valid_from), Some(version)) = (self.valid_from, self.version) else {
                return Err(Error::OperationFailed {
                    operation: "decode_edge".to_string(),
                    cause: format!("temporal edge {} lacks interval or version", self.id),
                });
            };
            Some(TemporalBounds {
                interval: ValidityInterval {
                    valid_from: temporal::from_millis(valid_from)?,
                    valid_to: self.valid_to.map(temporal::from_millis).transpose()?,
                },
                version: version as u32,
            })
        } else {
            None
        };

        Ok(Edge {
            id: EdgeId::new(self.id),
            source: NodeId::new(self.source_id),
            target: NodeId::new(self.target_id),
            relation_type: self.relation_type,
            properties: decode_properties(&self.properties)?,
            ingested_at: temporal::from_millis(self.ingested_at)?,
            temporal,
        })
    }
}

fn encode_properties(properties: &Properties) -> Result<String> {
    serde_json::to_string(properties).map_err(|e| Error::OperationFailed {
        operation: "encode_properties".to_string(),
        cause: e.to_string(),
    })
}

fn decode_properties(raw: &str) -> Result<Properties> {
    serde_json::from_str(raw).map_err(|e| Error::OperationFailed {
        operation: "decode_properties".to_string(),
        cause: e.to_string(),
    })
}

// ============================================================================
// Transaction-scoped helpers
// ============================================================================

fn load_node(conn: &Connection, node: &NodeRef) -> Result<Option<Node>> {
    let row = match node {
        NodeRef::Key { label, key } => conn
            .query_row(
                &format!(
                    "SELECT {NODE_COLUMNS} FROM graph_nodes WHERE label = ?1 AND natural_key = ?2"
                ),
                params![label.as_str(), key],
                NodeRow::from_row,
            )
            .optional(),
        NodeRef::Id(id) => conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM graph_nodes WHERE id = ?1"),
                params![id.get()],
                NodeRow::from_row,
            )
            .optional(),
    }
    .map_err(|e| sqlite_error("load_node", &e))?;

    row.map(NodeRow::decode).transpose()
}

fn require_node(conn: &Connection, node: &NodeRef) -> Result<Node> {
    load_node(conn, node)?.ok_or_else(|| Error::NodeNotFound(node.to_string()))
}

fn collect_edges(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Edge>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| sqlite_error("query_edges", &e))?;
    let rows = stmt
        .query_map(params, EdgeRow::from_row)
        .map_err(|e| sqlite_error("query_edges", &e))?;

    let mut edges = Vec::new();
    for row in rows {
        let row = row.map_err(|e| sqlite_error("query_edges", &e))?;
        edges.push(row.decode()?);
    }
    Ok(edges)
}

fn temporal_history(
    conn: &Connection,
    source: NodeId,
    target: NodeId,
    relation_type: &str,
) -> Result<Vec<Edge>> {
    collect_edges(
        conn,
        &format!(
            "SELECT {EDGE_COLUMNS} FROM graph_edges
             WHERE source_id = ?1 AND target_id = ?2 AND relation_type = ?3 AND temporal = 1
             ORDER BY version"
        ),
        params![source.get(), target.get(), relation_type],
    )
}

fn version_slots(
    conn: &Connection,
    source: NodeId,
    target: NodeId,
    relation_type: &str,
) -> Result<Vec<VersionSlot>> {
    Ok(temporal_history(conn, source, target, relation_type)?
        .into_iter()
        .filter_map(|edge| {
            edge.temporal.map(|bounds| VersionSlot {
                edge_id: edge.id,
                version: bounds.version,
                interval: bounds.interval,
            })
        })
        .collect())
}

fn query_ids(conn: &Connection, operation: &str, sql: &str, id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql).map_err(|e| sqlite_error(operation, &e))?;
    let ids = stmt
        .query_map(params![id], |row| row.get(0))
        .map_err(|e| sqlite_error(operation, &e))?
        .collect::<rusqlite::Result<Vec<i64>>>()
        .map_err(|e| sqlite_error(operation, &e))?;
    Ok(ids)
}

/// Moves every edge of `member` onto `survivor`, then deletes `member`.
fn absorb_node(conn: &Connection, survivor: NodeId, member: NodeId) -> Result<GroupMergeOutcome> {
    const OP: &str = "merge_duplicate_group";
    let mut outcome = GroupMergeOutcome::default();
    let err = |e: rusqlite::Error| sqlite_error(OP, &e);

    // Simple edges keep their properties and ingestion time.
    let touched: Vec<EdgeId> = query_ids(
        conn,
        OP,
        "SELECT id FROM graph_edges
         WHERE temporal = 0 AND (source_id = ?1 OR target_id = ?1) ORDER BY id",
        member.get(),
    )?
    .into_iter()
    .map(EdgeId::new)
    .collect();
    conn.execute(
        "UPDATE graph_edges SET source_id = ?2 WHERE temporal = 0 AND source_id = ?1",
        params![member.get(), survivor.get()],
    )
    .map_err(err)?;
    conn.execute(
        "UPDATE graph_edges SET target_id = ?2 WHERE temporal = 0 AND target_id = ?1",
        params![member.get(), survivor.get()],
    )
    .map_err(err)?;
    outcome.edges_redirected += touched.len();

    let loops: Vec<(EdgeId, String)> = {
        let mut stmt = conn
            .prepare(
                "SELECT id, relation_type FROM graph_edges
                 WHERE temporal = 0 AND source_id = ?1 AND target_id = ?1
                 ORDER BY relation_type, id",
            )
            .map_err(err)?;
        stmt.query_map(params![survivor.get()], |row| {
            Ok((EdgeId::new(row.get(0)?), row.get::<_, String>(1)?))
        })
        .map_err(err)?
        .collect::<rusqlite::Result<_>>()
        .map_err(err)?
    };
    for id in collapse_self_loops(&loops, &touched) {
        conn.execute("DELETE FROM graph_edges WHERE id = ?1", params![id.get()])
            .map_err(err)?;
        outcome.self_loops_collapsed += 1;
    }

    // Temporal edges join the survivor's history in version order.
    let moving = collect_edges(
        conn,
        &format!(
            "SELECT {EDGE_COLUMNS} FROM graph_edges
             WHERE temporal = 1 AND (source_id = ?1 OR target_id = ?1)
             ORDER BY source_id, target_id, relation_type, version"
        ),
        params![member.get()],
    )?;
    for edge in moving {
        let Some(interval) = edge.interval() else {
            continue;
        };
        let source = if edge.source == member { survivor } else { edge.source };
        let target = if edge.target == member { survivor } else { edge.target };
        let slots = version_slots(conn, source, target, &edge.relation_type)?;

        if slots.iter().any(|slot| slot.interval.overlaps(&interval)) {
            conn.execute("DELETE FROM graph_edges WHERE id = ?1", params![edge.id.get()])
                .map_err(err)?;
            outcome.temporal_edges_dropped += 1;
            continue;
        }

        let version = slots.iter().map(|slot| slot.version).max().unwrap_or(0) + 1;
        conn.execute(
            "UPDATE graph_edges SET source_id = ?1, target_id = ?2, version = ?3 WHERE id = ?4",
            params![source.get(), target.get(), version, edge.id.get()],
        )
        .map_err(err)?;
        outcome.edges_redirected += 1;
    }

    conn.execute("DELETE FROM graph_nodes WHERE id = ?1", params![member.get()])
        .map_err(err)?;
    outcome.nodes_merged += 1;
    Ok(outcome)
}

// ============================================================================
// GraphStore implementation
// ============================================================================

impl GraphStore for SqliteGraphStore {
    #[instrument(skip(self, properties), fields(label = %label))]
    fn merge_node(&self, label: Label, properties: Properties) -> Result<Node> {
        let properties = strip_reserved(properties);
        let natural_key = label.natural_key(&properties)?;

        self.write("merge_node", |conn| {
            let now = temporal::now();
            let existing = load_node(conn, &NodeRef::key(label, natural_key.clone()))?;

            if let Some(mut node) = existing {
                node.properties.extend(properties.clone());
                node.updated_at = now.max(node.updated_at);
                let fingerprint = NodeFingerprint::compute(label, &node.properties);
                conn.execute(
                    "UPDATE graph_nodes SET properties = ?1, fingerprint = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![
                        encode_properties(&node.properties)?,
                        fingerprint,
                        node.updated_at.timestamp_millis(),
                        node.id.get()
                    ],
                )
                .map_err(|e| sqlite_error("merge_node", &e))?;
                return Ok(node);
            }

            conn.execute(
                "INSERT INTO graph_nodes
                    (label, natural_key, properties, fingerprint, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    label.as_str(),
                    natural_key,
                    encode_properties(&properties)?,
                    NodeFingerprint::compute(label, &properties),
                    now.timestamp_millis()
                ],
            )
            .map_err(|e| sqlite_error("merge_node", &e))?;

            Ok(Node {
                id: NodeId::new(conn.last_insert_rowid()),
                label,
                natural_key: natural_key.clone(),
                properties: properties.clone(),
                created_at: now,
                updated_at: now,
            })
        })
    }

    #[instrument(skip(self, node), fields(node = %node))]
    fn get_node(&self, node: &NodeRef) -> Result<Option<Node>> {
        self.read("get_node", |conn| load_node(conn, node))
    }

    #[instrument(skip(self, node), fields(node = %node))]
    fn node_degree(&self, node: NodeId) -> Result<usize> {
        self.read("node_degree", |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM graph_edges WHERE source_id = ?1 OR target_id = ?1",
                params![node.get()],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as usize)
            .map_err(|e| sqlite_error("node_degree", &e))
        })
    }

    #[instrument(skip(self, edge), fields(relation_type = %edge.relation_type))]
    fn merge_edge(&self, edge: &EdgeWrite) -> Result<Edge> {
        edge.validate()?;

        self.write("merge_edge", |conn| {
            let source = require_node(conn, &edge.source)?;
            let target = require_node(conn, &edge.target)?;
            let now = temporal::now();
            let properties = encode_properties(&edge.properties)?;
            let err = |e: rusqlite::Error| sqlite_error("merge_edge", &e);

            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM graph_edges
                     WHERE source_id = ?1 AND target_id = ?2 AND relation_type = ?3 AND temporal = 0
                     ORDER BY id LIMIT 1",
                    params![source.id.get(), target.id.get(), edge.relation_type],
                    |row| row.get(0),
                )
                .optional()
                .map_err(err)?;

            let id = if let Some(id) = existing {
                conn.execute(
                    "UPDATE graph_edges SET properties = ?1, ingested_at = ?2 WHERE id = ?3",
                    params![properties, now.timestamp_millis(), id],
                )
                .map_err(err)?;
                id
            } else {
                conn.execute(
                    "INSERT INTO graph_edges
                        (source_id, target_id, relation_type, properties, ingested_at, temporal)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                    params![
                        source.id.get(),
                        target.id.get(),
                        edge.relation_type,
                        properties,
                        now.timestamp_millis()
                    ],
                )
                .map_err(err)?;
                conn.last_insert_rowid()
            };

            Ok(Edge {
                id: EdgeId::new(id),
                source: source.id,
                target: target.id,
                relation_type: edge.relation_type.clone(),
                properties: edge.properties.clone(),
                ingested_at: now,
                temporal: None,
            })
        })
    }

    #[instrument(
        skip(self, edge, interval, policy),
        fields(relation_type = %edge.relation_type, interval = %interval, policy = %policy)
    )]
    fn merge_edge_temporal(
        &self,
        edge: &EdgeWrite,
        interval: ValidityInterval,
        policy: ConflictPolicy,
    ) -> Result<Edge> {
        edge.validate()?;

        self.write("merge_edge_temporal", |conn| {
            let source = require_node(conn, &edge.source)?;
            let target = require_node(conn, &edge.target)?;
            let slots = version_slots(conn, source.id, target.id, &edge.relation_type)?;
            let err = |e: rusqlite::Error| sqlite_error("merge_edge_temporal", &e);

            let (version, close) = match plan_temporal_write(&slots, &interval, policy) {
                TemporalPlan::Conflict { version } => {
                    return Err(temporal_conflict(edge, version, &interval));
                },
                TemporalPlan::Insert { version, close } => (version, close),
            };

            if let Some((closed_id, end)) = close {
                conn.execute(
                    "UPDATE graph_edges SET valid_to = ?1 WHERE id = ?2",
                    params![end.timestamp_millis(), closed_id.get()],
                )
                .map_err(err)?;
                tracing::debug!(edge_id = %closed_id, valid_to = %end, "Closed superseded version");
            }

            let now = temporal::now();
            conn.execute(
                "INSERT INTO graph_edges
                    (source_id, target_id, relation_type, properties, ingested_at,
                     temporal, valid_from, valid_to, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8)",
                params![
                    source.id.get(),
                    target.id.get(),
                    edge.relation_type,
                    encode_properties(&edge.properties)?,
                    now.timestamp_millis(),
                    interval.valid_from.timestamp_millis(),
                    interval.valid_to.map(|t| t.timestamp_millis()),
                    version
                ],
            )
            .map_err(err)?;

            Ok(Edge {
                id: EdgeId::new(conn.last_insert_rowid()),
                source: source.id,
                target: target.id,
                relation_type: edge.relation_type.clone(),
                properties: edge.properties.clone(),
                ingested_at: now,
                temporal: Some(TemporalBounds { interval, version }),
            })
        })
    }

    #[instrument(skip(self, source, target), fields(source = %source, target = %target))]
    fn edge_history(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        relation_type: &str,
    ) -> Result<Vec<Edge>> {
        self.read("edge_history", |conn| {
            let source = require_node(conn, source)?;
            let target = require_node(conn, target)?;
            temporal_history(conn, source.id, target.id, relation_type)
        })
    }

    #[instrument(skip(self, query))]
    fn query_edges(&self, query: &EdgeQuery) -> Result<Vec<Edge>> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        self.read("query_edges", |conn| {
            collect_edges(
                conn,
                &format!(
                    "SELECT {EDGE_COLUMNS} FROM graph_edges
                     WHERE (?1 IS NULL OR source_id = ?1)
                       AND (?2 IS NULL OR target_id = ?2)
                       AND (?3 IS NULL OR relation_type = ?3)
                       AND (?4 = 0 OR temporal = 1)
                       AND (?5 IS NULL OR temporal = 0
                            OR (valid_from <= ?5 AND (valid_to IS NULL OR valid_to > ?5)))
                     ORDER BY id
                     LIMIT ?6"
                ),
                params![
                    query.source.map(NodeId::get),
                    query.target.map(NodeId::get),
                    query.relation_type,
                    query.temporal_only,
                    query.valid_at.map(|t| t.timestamp_millis()),
                    limit
                ],
            )
        })
    }

    #[instrument(skip(self))]
    fn get_stats(&self) -> Result<GraphStats> {
        self.read("get_stats", |conn| {
            let err = |e: rusqlite::Error| sqlite_error("get_stats", &e);

            let mut nodes_by_label = BTreeMap::new();
            let mut stmt = conn
                .prepare("SELECT label, COUNT(*) FROM graph_nodes GROUP BY label")
                .map_err(err)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(err)?;
            for row in rows {
                let (label, count) = row.map_err(err)?;
                nodes_by_label.insert(label, count as usize);
            }

            let mut edges_by_type = BTreeMap::new();
            let mut temporal_edges = 0;
            let mut stmt = conn
                .prepare(
                    "SELECT relation_type, COUNT(*), SUM(temporal)
                     FROM graph_edges GROUP BY relation_type",
                )
                .map_err(err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(err)?;
            for row in rows {
                let (relation_type, count, temporal) = row.map_err(err)?;
                edges_by_type.insert(relation_type, count as usize);
                temporal_edges += temporal as usize;
            }

            Ok(GraphStats::from_counts(
                nodes_by_label,
                edges_by_type,
                temporal_edges,
            ))
        })
    }

    #[instrument(skip(self))]
    fn find_duplicate_nodes(&self, label: Option<Label>) -> Result<Vec<DuplicateNodeGroup>> {
        self.read("find_duplicate_nodes", |conn| {
            let err = |e: rusqlite::Error| sqlite_error("find_duplicate_nodes", &e);
            let mut stmt = conn
                .prepare(
                    "SELECT n.label, n.fingerprint, n.id FROM graph_nodes n
                     JOIN (SELECT label, fingerprint FROM graph_nodes
                           WHERE ?1 IS NULL OR label = ?1
                           GROUP BY label, fingerprint HAVING COUNT(*) > 1) d
                       ON n.label = d.label AND n.fingerprint = d.fingerprint
                     ORDER BY n.label, n.fingerprint, n.id",
                )
                .map_err(err)?;
            let rows = stmt
                .query_map(params![label.map(|l| l.as_str())], |row| {
                    Ok((
                        (row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                        NodeId::new(row.get(2)?),
                    ))
                })
                .map_err(err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(err)?;

            let mut groups = Vec::new();
            for ((label, fingerprint), node_ids) in duplicate_runs(rows) {
                let label = Label::parse(&label).ok_or_else(|| Error::OperationFailed {
                    operation: "find_duplicate_nodes".to_string(),
                    cause: format!("unknown stored label '{label}'"),
                })?;
                groups.push(DuplicateNodeGroup {
                    label,
                    fingerprint,
                    node_ids,
                });
            }
            groups.sort_by_key(|g| g.survivor());
            Ok(groups)
        })
    }

    #[instrument(skip(self, group), fields(group = %group))]
    fn merge_duplicate_group(&self, group: &DuplicateNodeGroup) -> Result<GroupMergeOutcome> {
        self.write("merge_duplicate_group", |conn| {
            let mut live = Vec::with_capacity(group.node_ids.len());
            for id in &group.node_ids {
                let current: Option<(String, String)> = conn
                    .query_row(
                        "SELECT label, fingerprint FROM graph_nodes WHERE id = ?1",
                        params![id.get()],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()
                    .map_err(|e| sqlite_error("merge_duplicate_group", &e))?;
                if current.is_some_and(|(label, fingerprint)| {
                    label == group.label.as_str() && fingerprint == group.fingerprint
                }) {
                    live.push(*id);
                }
            }
            live.sort_unstable();
            live.dedup();

            let mut outcome = GroupMergeOutcome::default();
            if let Some((&survivor, members)) = live.split_first() {
                for &member in members {
                    outcome.absorb(absorb_node(conn, survivor, member)?);
                }
            }
            Ok(outcome)
        })
    }

    #[instrument(skip(self))]
    fn find_duplicate_relationships(&self) -> Result<Vec<DuplicateEdgeGroup>> {
        self.read("find_duplicate_relationships", |conn| {
            let err = |e: rusqlite::Error| sqlite_error("find_duplicate_relationships", &e);
            let mut stmt = conn
                .prepare(
                    "SELECT e.source_id, e.target_id, e.relation_type, e.id FROM graph_edges e
                     JOIN (SELECT source_id, target_id, relation_type FROM graph_edges
                           WHERE temporal = 0
                           GROUP BY source_id, target_id, relation_type HAVING COUNT(*) > 1) d
                       ON e.source_id = d.source_id
                      AND e.target_id = d.target_id
                      AND e.relation_type = d.relation_type
                     WHERE e.temporal = 0
                     ORDER BY e.source_id, e.target_id, e.relation_type, e.id",
                )
                .map_err(err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        (
                            NodeId::new(row.get(0)?),
                            NodeId::new(row.get(1)?),
                            row.get::<_, String>(2)?,
                        ),
                        EdgeId::new(row.get(3)?),
                    ))
                })
                .map_err(err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(err)?;

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
        self.write("remove_duplicate_edge_group", |conn| {
            let err = |e: rusqlite::Error| sqlite_error("remove_duplicate_edge_group", &e);
            let ids: Vec<i64> = {
                let mut stmt = conn
                    .prepare(
                        "SELECT id FROM graph_edges
                         WHERE source_id = ?1 AND target_id = ?2 AND relation_type = ?3
                           AND temporal = 0
                         ORDER BY id",
                    )
                    .map_err(err)?;
                stmt.query_map(
                    params![group.source.get(), group.target.get(), group.relation_type],
                    |row| row.get(0),
                )
                .map_err(err)?
                .collect::<rusqlite::Result<_>>()
                .map_err(err)?
            };

            let mut removed = 0;
            for id in ids.iter().skip(1) {
                removed += conn
                    .execute("DELETE FROM graph_edges WHERE id = ?1", params![id])
                    .map_err(err)?;
            }
            Ok(removed)
        })
    }

    #[instrument(skip(self))]
    fn find_orphaned_nodes(&self, exclude_labels: &[Label]) -> Result<Vec<NodeId>> {
        self.read("find_orphaned_nodes", |conn| {
            let err = |e: rusqlite::Error| sqlite_error("find_orphaned_nodes", &e);
            let mut stmt = conn
                .prepare(
                    "SELECT n.id, n.label FROM graph_nodes n
                     WHERE NOT EXISTS (
                         SELECT 1 FROM graph_edges e WHERE e.source_id = n.id OR e.target_id = n.id
                     )
                     ORDER BY n.id",
                )
                .map_err(err)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
                .map_err(err)?;

            let mut orphans = Vec::new();
            for row in rows {
                let (id, label) = row.map_err(err)?;
                let excluded = Label::parse(&label).is_some_and(|l| exclude_labels.contains(&l));
                if !excluded {
                    orphans.push(NodeId::new(id));
                }
            }
            Ok(orphans)
        })
    }

    #[instrument(skip(self, nodes), fields(count = nodes.len()))]
    fn delete_orphaned_nodes(&self, nodes: &[NodeId]) -> Result<usize> {
        self.write("delete_orphaned_nodes", |conn| {
            let mut removed = 0;
            for id in nodes {
                removed += conn
                    .execute(
                        "DELETE FROM graph_nodes WHERE id = ?1 AND NOT EXISTS (
                             SELECT 1 FROM graph_edges WHERE source_id = ?1 OR target_id = ?1
                         )",
                        params![id.get()],
                    )
                    .map_err(|e| sqlite_error("delete_orphaned_nodes", &e))?;
            }
            Ok(removed)
        })
    }

    #[instrument(skip(self))]
    fn clear(&self) -> Result<()> {
        self.write("clear", |conn| {
            conn.execute_batch("DELETE FROM graph_edges; DELETE FROM graph_nodes;")
                .map_err(|e| sqlite_error("clear", &e))
        })
    }
}
