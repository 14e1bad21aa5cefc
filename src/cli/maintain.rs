//! Maintenance commands.

use super::{CommandContext, to_json};
use crate::Result;
use crate::models::{Label, parse_label_list};
use crate::services::{MaintenanceOptions, MaintenanceStep};
use crate::storage::GraphStore;
use serde_json::{Value, json};

/// Arguments for `maintain`.
#[derive(Debug, Clone, Default)]
pub struct MaintainArgs {
    /// Report without mutating.
    pub dry_run: bool,
    /// Run a single step instead of the whole pass.
    pub only: Option<MaintenanceStep>,
    /// Restrict node deduplication to one label.
    pub label: Option<String>,
    /// Comma-separated orphan exclusions, replacing the configured list.
    pub exclude_labels: Option<String>,
}

impl MaintainArgs {
    fn to_options(&self) -> Result<MaintenanceOptions> {
        let mut options = MaintenanceOptions {
            dry_run: self.dry_run,
            ..MaintenanceOptions::default()
        };
        if let Some(step) = self.only {
            options = options.with_steps(vec![step]);
        }
        if let Some(label) = &self.label {
            options = options.with_label(label.parse::<Label>()?);
        }
        if let Some(labels) = &self.exclude_labels {
            options = options.with_exclude_labels(parse_label_list(labels)?);
        }
        Ok(options)
    }
}

/// Lists duplicate node and relationship groups without changing anything.
///
/// # Errors
///
/// Returns an error if the label is unknown or a scan fails.
pub fn cmd_duplicates<B: GraphStore>(ctx: &CommandContext<B>, label: Option<&str>) -> Result<Value> {
    let nodes = ctx.maintenance.find_duplicate_nodes(label)?;
    let relationships = ctx.maintenance.find_duplicate_relationships()?;
    Ok(json!({
        "nodes": to_json(&nodes)?,
        "relationships": to_json(&relationships)?,
    }))
}

/// Runs the maintenance pass.
///
/// # Errors
///
/// Returns an error if an argument is invalid or a scan fails. Per-group
/// failures are reported in the output instead.
pub fn cmd_maintain<B: GraphStore>(ctx: &CommandContext<B>, args: &MaintainArgs) -> Result<Value> {
    let summary = ctx.maintenance.run_pass(&args.to_options()?)?;
    tracing::info!("{}", summary.summary());
    to_json(&summary)
}
