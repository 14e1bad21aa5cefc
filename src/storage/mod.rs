//! Storage layer for the temporal knowledge graph.
//!
//! - [`traits`]: the [`GraphStore`] contract every backend implements
//! - [`graph`]: the `SQLite` and in-memory stores
//! - [`sqlite`]: connection handling and error mapping shared by stores
//! - [`resilience`]: bounded retry for lock contention

// Allow significant_drop_tightening - the connection guard is held for the
// whole transaction on purpose.
#![allow(clippy::significant_drop_tightening)]

pub mod graph;
pub mod resilience;
pub mod sqlite;
pub mod traits;

pub use graph::{InMemoryGraphStore, SqliteGraphStore};
pub use resilience::RetryPolicy;
pub use traits::{GraphStats, GraphStore};
