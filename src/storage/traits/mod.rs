//! Storage backend traits.

mod graph;

pub use graph::{GraphStats, GraphStore};
