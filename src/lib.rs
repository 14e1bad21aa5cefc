//! # Factgraph
//!
//! Temporal knowledge-graph storage for market facts.
//!
//! Factgraph keeps typed entities (companies, instruments, concepts, events,
//! hypotheses, regimes, ...) connected by relationships that are either
//! simple (last write wins) or temporal (versioned, with a validity interval
//! that never overlaps another version of the same relationship).
//!
//! ## Features
//!
//! - One node per `(label, natural key)`, enforced by the storage engine
//! - Versioned relationships with explicit overlap rejection or supersession
//! - Restartable maintenance pass: duplicate merge, duplicate edge collapse,
//!   orphan pruning, all with a dry-run mode
//! - `SQLite` backend for production, in-memory backend for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use factgraph::services::GraphService;
//! use factgraph::storage::SqliteGraphStore;
//! use factgraph::EdgeWrite;
//! use serde_json::json;
//!
//! let graph = GraphService::new(SqliteGraphStore::in_memory()?);
//! let nvda = graph.merge_node("Company", props(json!({"ticker": "NVDA"})))?;
//! let tsmc = graph.merge_node("Company", props(json!({"ticker": "TSM"})))?;
//! graph.merge_edge_temporal(
//!     &EdgeWrite::new(&tsmc, &nvda, "SUPPLIES_TO"),
//!     start,
//!     None,
//! )?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::FactgraphConfig;
pub use models::{
    ConflictPolicy, Edge, EdgeId, EdgeQuery, EdgeWrite, Label, Node, NodeId, NodeRef, Properties,
    ValidityInterval,
};
pub use services::{CancellationToken, GraphService, MaintenanceOptions, MaintenanceService};
pub use storage::{GraphStats, GraphStore, InMemoryGraphStore, SqliteGraphStore};

/// Error type for factgraph operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidLabel` | A label string is not one of the known entity kinds |
/// | `MissingKey` | A node write lacks its label's natural-key field |
/// | `NodeNotFound` | An edge endpoint or looked-up node does not exist |
/// | `TemporalConflict` | A versioned edge interval overlaps an existing version |
/// | `Busy` | The write lock could not be taken within the retry budget |
/// | `StorageUnavailable` | The database cannot be opened or read |
/// | `InvalidInput` | Malformed keys, intervals, refs or JSON |
/// | `OperationFailed` | Any other storage or I/O failure |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The label is not one of the known entity kinds.
    ///
    /// Raised when:
    /// - `merge_node` or a node ref names an unknown label
    /// - An orphan exclusion list contains an unknown label
    #[error("invalid label: {0}")]
    InvalidLabel(String),

    /// The natural-key field for the label was absent or empty.
    #[error("missing natural key '{field}' for label {label}")]
    MissingKey {
        /// The label being written.
        label: String,
        /// The natural-key field the label requires.
        field: String,
    },

    /// A referenced node does not exist.
    ///
    /// Raised when:
    /// - Either endpoint of `merge_edge` / `merge_edge_temporal` is absent
    /// - `get_node` is called through the CLI with an unknown ref
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// A temporal edge interval overlaps an existing version of the same triple.
    #[error(
        "temporal conflict on ({source_ref})-[{relation_type}]->({target_ref}): \
         interval {interval} overlaps version {version}"
    )]
    TemporalConflict {
        /// Source node of the triple.
        source_ref: String,
        /// Target node of the triple.
        target_ref: String,
        /// Relation type of the triple.
        relation_type: String,
        /// Lowest existing version that overlaps.
        version: u32,
        /// The rejected interval.
        interval: String,
    },

    /// The storage write lock stayed contended after all retries.
    #[error("storage busy during '{operation}' after {attempts} attempt(s)")]
    Busy {
        /// The operation that gave up.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The storage backend cannot be reached.
    ///
    /// Raised when:
    /// - The database file cannot be opened or created
    /// - The file is not a database or the disk reports an I/O error
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A natural key is an object, array or boolean
    /// - `valid_to` is not after `valid_from`
    /// - A node ref or timestamp cannot be parsed
    /// - Properties are not a JSON object
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements fail for reasons other than contention
    /// - Stored rows cannot be decoded
    /// - Configuration or log files cannot be read
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns true if retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Result type alias for factgraph operations.
pub type Result<T> = std::result::Result<T, Error>;
