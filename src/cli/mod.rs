//! CLI command implementations.
//!
//! Each handler takes a [`CommandContext`] and returns the JSON document the
//! binary prints. Parsing of textual arguments (labels, node refs,
//! timestamps, property JSON) happens here so the binary stays a thin
//! `clap` shell.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `merge-node` | Create or update a node by natural key |
//! | `merge-edge` | Create or overwrite a simple edge |
//! | `merge-edge-temporal` | Append a versioned edge |
//! | `get-node` | Show one node |
//! | `history` | Show every version of a temporal triple |
//! | `stats` | Show node and edge counts |
//! | `duplicates` | List duplicate node and edge groups |
//! | `maintain` | Run the maintenance pass |
//! | `reset` | Delete everything |
//!
//! # Example Usage
//!
//! ```bash
//! factgraph merge-node Company '{"ticker":"NVDA","name":"NVIDIA"}'
//! factgraph merge-edge-temporal Company:TSM Company:NVDA SUPPLIES_TO --valid-from 2020-01-01
//! factgraph maintain --dry-run
//! ```

mod graph;
mod maintain;

pub use graph::{
    TemporalEdgeArgs, cmd_get_node, cmd_history, cmd_merge_edge, cmd_merge_edge_temporal,
    cmd_merge_node, cmd_reset, cmd_stats,
};
pub use maintain::{MaintainArgs, cmd_duplicates, cmd_maintain};

use crate::config::FactgraphConfig;
use crate::services::{CancellationToken, GraphService, MaintenanceService};
use crate::storage::{GraphStore, SqliteGraphStore};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Services shared by all commands.
pub struct CommandContext<B: GraphStore> {
    /// Write/read facade.
    pub graph: GraphService<B>,
    /// Maintenance engine.
    pub maintenance: MaintenanceService<B>,
}

impl CommandContext<SqliteGraphStore> {
    /// Opens the configured `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the database cannot be opened.
    pub fn open(config: &FactgraphConfig, cancel: CancellationToken) -> Result<Self> {
        let store = SqliteGraphStore::with_config(config.db_path.clone(), &config.storage)?;
        Ok(Self::from_backend(Arc::new(store), config, cancel))
    }
}

impl<B: GraphStore> CommandContext<B> {
    /// Builds a context over an existing store.
    #[must_use]
    pub fn from_backend(backend: Arc<B>, config: &FactgraphConfig, cancel: CancellationToken) -> Self {
        let graph = GraphService::with_shared_backend(Arc::clone(&backend))
            .with_conflict_policy(config.temporal.conflict_policy);
        let maintenance = MaintenanceService::with_config(backend, config.maintenance.clone())
            .with_cancellation(cancel);
        Self { graph, maintenance }
    }
}

/// Serializes a command result.
fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::OperationFailed {
        operation: "serialize_output".to_string(),
        cause: e.to_string(),
    })
}
