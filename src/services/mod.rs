//! Business logic services.
//!
//! Services orchestrate a [`GraphStore`](crate::storage::GraphStore) and
//! provide high-level operations.

mod graph;
mod maintenance;

pub use graph::GraphService;
pub use maintenance::{
    CancellationToken, GroupFailure, MaintenanceOptions, MaintenanceService, MaintenanceStep,
    MaintenanceSummary, MergeReport, RemovalReport,
};
