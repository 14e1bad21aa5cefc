//! Shared `SQLite` infrastructure for the graph store.
//!
//! ## Module Structure
//!
//! - [`connection`]: opening, configuring and locking connections, and
//!   mapping `SQLite` failures onto [`crate::Error`]
//! - [`metrics`]: per-operation counters and latency histograms, shared with
//!   the in-memory store

mod connection;
mod metrics;

pub use connection::{
    DEFAULT_BUSY_TIMEOUT_MS, acquire_lock_with_timeout, configure_connection, open_connection,
    sqlite_error,
};
pub use metrics::{observe, record_operation_metrics};
