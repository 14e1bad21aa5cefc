//! Maintenance pass for the knowledge graph.
//!
//! Deduplicates nodes and simple edges and prunes orphans. Each duplicate
//! group and each orphan batch is applied in its own store transaction, so an
//! interrupted pass keeps everything it finished and can simply be re-run.
//!
//! One failing group is logged, recorded in the report's `failures`, and
//! skipped; the pass keeps going.
//!
//! # Example
//!
//! ```rust,ignore
//! use factgraph::services::{MaintenanceOptions, MaintenanceService};
//!
//! let maintenance = MaintenanceService::new(store);
//! let preview = maintenance.run_pass(&MaintenanceOptions::dry_run())?;
//! println!("{}", preview.summary());
//! ```

// Report counts are far below f64's exact-integer range.
#![allow(clippy::cast_precision_loss)]

use crate::config::MaintenanceConfig;
use crate::models::{DuplicateEdgeGroup, DuplicateNodeGroup, GroupMergeOutcome, Label, NodeId};
use crate::storage::{GraphStats, GraphStore};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Shared flag for stopping a running pass between transactions.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A maintenance step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStep {
    /// Merge duplicate nodes.
    Nodes,
    /// Remove duplicate simple edges.
    Edges,
    /// Remove orphaned nodes.
    Orphans,
}

impl MaintenanceStep {
    /// All steps in execution order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Nodes, Self::Edges, Self::Orphans]
    }

    /// Returns the step name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nodes => "nodes",
            Self::Edges => "edges",
            Self::Orphans => "orphans",
        }
    }
}

impl fmt::Display for MaintenanceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaintenanceStep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "nodes" | "node" => Ok(Self::Nodes),
            "edges" | "edge" | "relationships" => Ok(Self::Edges),
            "orphans" | "orphan" => Ok(Self::Orphans),
            other => Err(Error::InvalidInput(format!(
                "unknown maintenance step '{other}' (expected nodes, edges or orphans)"
            ))),
        }
    }
}

/// A group that failed to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupFailure {
    /// Short description of the group.
    pub group: String,
    /// The error message.
    pub error: String,
}

/// Result of a duplicate-node merge.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    /// Identifier shared by all log lines of this run.
    pub run_id: String,
    /// Whether this was a dry run (no changes made).
    pub dry_run: bool,
    /// Duplicate groups found by the scan.
    pub groups_found: usize,
    /// Groups merged (or that would be).
    pub groups_merged: usize,
    /// Redundant nodes deleted (or that would be).
    pub nodes_merged: usize,
    /// Edges moved onto survivors (or that would be).
    pub edges_redirected: usize,
    /// Self-loops collapsed after redirection.
    pub self_loops_collapsed: usize,
    /// Temporal edges dropped for overlapping a survivor version.
    pub temporal_edges_dropped: usize,
    /// Groups that failed to apply.
    pub failures: Vec<GroupFailure>,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl MergeReport {
    /// Returns a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let action = if self.dry_run { "would merge" } else { "merged" };
        if self.groups_found == 0 {
            return format!("No duplicate nodes found ({}ms)", self.duration_ms);
        }
        let mut line = format!(
            "{action} {} nodes in {} of {} groups, {} edges redirected ({}ms)",
            self.nodes_merged,
            self.groups_merged,
            self.groups_found,
            self.edges_redirected,
            self.duration_ms
        );
        append_tail(&mut line, self.failures.len(), self.cancelled);
        line
    }

    fn absorb(&mut self, outcome: &GroupMergeOutcome) {
        self.nodes_merged += outcome.nodes_merged;
        self.edges_redirected += outcome.edges_redirected;
        self.self_loops_collapsed += outcome.self_loops_collapsed;
        self.temporal_edges_dropped += outcome.temporal_edges_dropped;
    }
}

/// Result of a duplicate-edge or orphan removal.
#[derive(Debug, Clone, Serialize)]
pub struct RemovalReport {
    /// Identifier shared by all log lines of this run.
    pub run_id: String,
    /// Which step produced this report.
    pub step: MaintenanceStep,
    /// Whether this was a dry run (no changes made).
    pub dry_run: bool,
    /// Duplicate groups, or orphan nodes, found by the scan.
    pub candidates: usize,
    /// Edges or nodes removed (or that would be).
    pub removed: usize,
    /// Groups or batches that failed to apply.
    pub failures: Vec<GroupFailure>,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl RemovalReport {
    fn new(run_id: String, step: MaintenanceStep, dry_run: bool) -> Self {
        Self {
            run_id,
            step,
            dry_run,
            candidates: 0,
            removed: 0,
            failures: Vec::new(),
            cancelled: false,
            duration_ms: 0,
        }
    }

    /// Returns a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let (what, found) = match self.step {
            MaintenanceStep::Orphans => ("orphaned nodes", "orphans"),
            _ => ("duplicate edges", "groups"),
        };
        let action = if self.dry_run { "would remove" } else { "removed" };
        if self.candidates == 0 {
            return format!("No {what} found ({}ms)", self.duration_ms);
        }
        let mut line = format!(
            "{action} {} {what} from {} {found} ({}ms)",
            self.removed, self.candidates, self.duration_ms
        );
        append_tail(&mut line, self.failures.len(), self.cancelled);
        line
    }
}

fn append_tail(line: &mut String, failures: usize, cancelled: bool) {
    if failures > 0 {
        line.push_str(&format!(", {failures} failed"));
    }
    if cancelled {
        line.push_str(", cancelled");
    }
}

/// Options for a full pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceOptions {
    /// Report without mutating.
    pub dry_run: bool,
    /// Steps to run; always executed in [`MaintenanceStep::all`] order.
    pub steps: Vec<MaintenanceStep>,
    /// Restrict node deduplication to one label.
    pub label: Option<Label>,
    /// Orphan exclusions; the configured list when `None`.
    pub exclude_labels: Option<Vec<Label>>,
}

impl Default for MaintenanceOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            steps: MaintenanceStep::all().to_vec(),
            label: None,
            exclude_labels: None,
        }
    }
}

impl MaintenanceOptions {
    /// Options for a full dry run.
    #[must_use]
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    /// Restricts the pass to the given steps.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<MaintenanceStep>) -> Self {
        self.steps = steps;
        self
    }

    /// Restricts node deduplication to one label.
    #[must_use]
    pub const fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    /// Overrides the orphan exclusions.
    #[must_use]
    pub fn with_exclude_labels(mut self, labels: Vec<Label>) -> Self {
        self.exclude_labels = Some(labels);
        self
    }

    fn runs(&self, step: MaintenanceStep) -> bool {
        self.steps.contains(&step)
    }
}

/// Result of a full pass.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceSummary {
    /// Identifier shared by all step reports.
    pub run_id: String,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Stats before the pass.
    pub before: GraphStats,
    /// Stats after the pass.
    pub after: GraphStats,
    /// Node merge report, if the step ran.
    pub nodes: Option<MergeReport>,
    /// Duplicate-edge report, if the step ran.
    pub edges: Option<RemovalReport>,
    /// Orphan report, if the step ran.
    pub orphans: Option<RemovalReport>,
    /// Whether the pass stopped early on cancellation.
    pub cancelled: bool,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl MaintenanceSummary {
    /// Returns true if any step recorded a failure.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.nodes.as_ref().is_some_and(|r| !r.failures.is_empty())
            || self.edges.as_ref().is_some_and(|r| !r.failures.is_empty())
            || self.orphans.as_ref().is_some_and(|r| !r.failures.is_empty())
    }

    /// Returns a human-readable, one line per step summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        if let Some(report) = &self.nodes {
            lines.push(format!("nodes: {}", report.summary()));
        }
        if let Some(report) = &self.edges {
            lines.push(format!("edges: {}", report.summary()));
        }
        if let Some(report) = &self.orphans {
            lines.push(format!("orphans: {}", report.summary()));
        }
        lines.push(format!(
            "graph: {} nodes / {} edges -> {} nodes / {} edges",
            self.before.total_nodes,
            self.before.total_edges,
            self.after.total_nodes,
            self.after.total_edges
        ));
        lines.join("\n")
    }
}

/// Maintenance engine over a [`GraphStore`].
pub struct MaintenanceService<B: GraphStore> {
    backend: Arc<B>,
    config: MaintenanceConfig,
    cancel: CancellationToken,
}

impl<B: GraphStore> MaintenanceService<B> {
    /// Creates a maintenance service with default settings.
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_config(backend, MaintenanceConfig::default())
    }

    /// Creates a maintenance service with explicit settings.
    #[must_use]
    pub fn with_config(backend: Arc<B>, config: MaintenanceConfig) -> Self {
        Self {
            backend,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the settings.
    #[must_use]
    pub const fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    // =========================================================================
    // Duplicate nodes
    // =========================================================================

    /// Finds groups of nodes sharing label and properties.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLabel`] for an unknown label, or a storage
    /// error.
    pub fn find_duplicate_nodes(&self, label: Option<&str>) -> Result<Vec<DuplicateNodeGroup>> {
        let label = label.map(str::parse::<Label>).transpose()?;
        self.backend.find_duplicate_nodes(label)
    }

    /// Merges every duplicate node group into its survivor.
    ///
    /// # Errors
    ///
    /// Returns an error only if the initial scan fails; per-group failures
    /// are collected in the report.
    pub fn merge_duplicate_nodes(&self, dry_run: bool) -> Result<MergeReport> {
        self.merge_duplicate_nodes_for(None, dry_run)
    }

    /// Merges duplicate node groups, optionally for one label.
    ///
    /// # Errors
    ///
    /// Returns an error only if the initial scan fails; per-group failures
    /// are collected in the report.
    #[instrument(
        name = "factgraph.maintenance.merge_nodes",
        skip(self, label),
        fields(run_id = tracing::field::Empty, dry_run = dry_run, label = ?label)
    )]
    pub fn merge_duplicate_nodes_for(
        &self,
        label: Option<Label>,
        dry_run: bool,
    ) -> Result<MergeReport> {
        let groups = self.backend.find_duplicate_nodes(label)?;
        Ok(self.merge_nodes(&new_run_id(), &groups, dry_run))
    }

    fn merge_nodes(
        &self,
        run_id: &str,
        groups: &[DuplicateNodeGroup],
        dry_run: bool,
    ) -> MergeReport {
        let start = Instant::now();
        tracing::Span::current().record("run_id", run_id);

        let mut report = MergeReport {
            run_id: run_id.to_string(),
            dry_run,
            groups_found: groups.len(),
            ..MergeReport::default()
        };

        for group in groups {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let outcome = if dry_run {
                self.preview_group(group)
            } else {
                self.backend.merge_duplicate_group(group)
            };
            match outcome {
                Ok(outcome) => {
                    if outcome.nodes_merged > 0 {
                        report.groups_merged += 1;
                    }
                    report.absorb(&outcome);
                    debug!(
                        group = %group,
                        nodes_merged = outcome.nodes_merged,
                        edges_redirected = outcome.edges_redirected,
                        "Processed duplicate node group"
                    );
                },
                Err(e) => {
                    warn!(group = %group, error = %e, "Failed to merge duplicate node group");
                    report.failures.push(GroupFailure {
                        group: group.to_string(),
                        error: e.to_string(),
                    });
                },
            }
        }

        report.duration_ms = elapsed_ms(start);
        record_run("nodes", dry_run, report.nodes_merged, &report.failures, report.duration_ms);
        metrics::counter!("maintenance_edges_redirected_total", "dry_run" => dry_run.to_string())
            .increment(as_count(report.edges_redirected));
        info!(
            run_id,
            groups_found = report.groups_found,
            nodes_merged = report.nodes_merged,
            edges_redirected = report.edges_redirected,
            self_loops_collapsed = report.self_loops_collapsed,
            temporal_edges_dropped = report.temporal_edges_dropped,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            dry_run,
            "Duplicate node merge completed"
        );
        report
    }

    /// Counts what merging `group` would change.
    fn preview_group(&self, group: &DuplicateNodeGroup) -> Result<GroupMergeOutcome> {
        let mut outcome = GroupMergeOutcome::default();
        for &member in group.redundant() {
            outcome.nodes_merged += 1;
            outcome.edges_redirected += self.backend.node_degree(member)?;
        }
        Ok(outcome)
    }

    // =========================================================================
    // Duplicate relationships
    // =========================================================================

    /// Finds groups of simple edges sharing a triple.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn find_duplicate_relationships(&self) -> Result<Vec<DuplicateEdgeGroup>> {
        self.backend.find_duplicate_relationships()
    }

    /// Keeps the lowest-id edge of each duplicate group and removes the rest.
    ///
    /// # Errors
    ///
    /// Returns an error only if the initial scan fails; per-group failures
    /// are collected in the report.
    #[instrument(
        name = "factgraph.maintenance.remove_edges",
        skip(self),
        fields(run_id = tracing::field::Empty, dry_run = dry_run)
    )]
    pub fn remove_duplicate_relationships(&self, dry_run: bool) -> Result<RemovalReport> {
        self.remove_edges(&new_run_id(), dry_run)
    }

    fn remove_edges(&self, run_id: &str, dry_run: bool) -> Result<RemovalReport> {
        let start = Instant::now();
        tracing::Span::current().record("run_id", run_id);
        let groups = self.backend.find_duplicate_relationships()?;

        let mut report = RemovalReport::new(run_id.to_string(), MaintenanceStep::Edges, dry_run);
        report.candidates = groups.len();

        for group in &groups {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if dry_run {
                report.removed += group.redundant_count();
                continue;
            }
            match self.backend.remove_duplicate_edge_group(group) {
                Ok(removed) => report.removed += removed,
                Err(e) => {
                    warn!(group = %group, error = %e, "Failed to remove duplicate edges");
                    report.failures.push(GroupFailure {
                        group: group.to_string(),
                        error: e.to_string(),
                    });
                },
            }
        }

        report.duration_ms = elapsed_ms(start);
        record_run("edges", dry_run, report.removed, &report.failures, report.duration_ms);
        info!(
            run_id,
            groups_found = report.candidates,
            edges_removed = report.removed,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            dry_run,
            "Duplicate relationship removal completed"
        );
        Ok(report)
    }

    // =========================================================================
    // Orphans
    // =========================================================================

    /// Removes nodes with no incident edges.
    ///
    /// Nodes whose label is in `exclude_labels` (the configured list when
    /// `None`) are never removed. Deletes run in batches of
    /// `orphan_batch_size`, one transaction each.
    ///
    /// # Errors
    ///
    /// Returns an error only if the initial scan fails; per-batch failures
    /// are collected in the report.
    #[instrument(
        name = "factgraph.maintenance.remove_orphans",
        skip(self, exclude_labels),
        fields(run_id = tracing::field::Empty, dry_run = dry_run)
    )]
    pub fn remove_orphaned_nodes(
        &self,
        dry_run: bool,
        exclude_labels: Option<&[Label]>,
    ) -> Result<RemovalReport> {
        self.remove_orphans(&new_run_id(), dry_run, exclude_labels, &[])
    }

    /// `unmerged` holds duplicate groups a dry-run pass previewed but did not
    /// merge; the orphan count is taken as if they had been.
    fn remove_orphans(
        &self,
        run_id: &str,
        dry_run: bool,
        exclude_labels: Option<&[Label]>,
        unmerged: &[DuplicateNodeGroup],
    ) -> Result<RemovalReport> {
        let start = Instant::now();
        tracing::Span::current().record("run_id", run_id);
        let exclude = exclude_labels.unwrap_or(&self.config.orphan_exclude_labels);
        let orphans = orphans_after_merge(self.backend.find_orphaned_nodes(exclude)?, unmerged);

        let mut report = RemovalReport::new(run_id.to_string(), MaintenanceStep::Orphans, dry_run);
        report.candidates = orphans.len();

        if dry_run {
            report.removed = orphans.len();
        } else {
            for batch in orphans.chunks(self.config.orphan_batch_size.max(1)) {
                if self.cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                match self.backend.delete_orphaned_nodes(batch) {
                    Ok(removed) => report.removed += removed,
                    Err(e) => {
                        let group = describe_batch(batch);
                        warn!(batch = %group, error = %e, "Failed to delete orphan batch");
                        report.failures.push(GroupFailure {
                            group,
                            error: e.to_string(),
                        });
                    },
                }
            }
        }

        report.duration_ms = elapsed_ms(start);
        record_run("orphans", dry_run, report.removed, &report.failures, report.duration_ms);
        info!(
            run_id,
            orphans_found = report.candidates,
            nodes_removed = report.removed,
            excluded = ?exclude,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            dry_run,
            "Orphan removal completed"
        );
        Ok(report)
    }

    // =========================================================================
    // Full pass
    // =========================================================================

    /// Runs the selected steps in order: nodes, edges, orphans.
    ///
    /// # Errors
    ///
    /// Returns an error if a stats read or a step's scan fails.
    #[instrument(
        name = "factgraph.maintenance.pass",
        skip(self, options),
        fields(run_id = tracing::field::Empty, dry_run = options.dry_run)
    )]
    pub fn run_pass(&self, options: &MaintenanceOptions) -> Result<MaintenanceSummary> {
        let start = Instant::now();
        let run_id = new_run_id();
        tracing::Span::current().record("run_id", run_id.as_str());
        let before = self.backend.get_stats()?;

        let mut previewed: Vec<DuplicateNodeGroup> = Vec::new();
        let mut summary = MaintenanceSummary {
            run_id: run_id.clone(),
            dry_run: options.dry_run,
            before: before.clone(),
            after: before,
            nodes: None,
            edges: None,
            orphans: None,
            cancelled: false,
            duration_ms: 0,
        };

        for step in MaintenanceStep::all().iter().copied() {
            if !options.runs(step) {
                continue;
            }
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            match step {
                MaintenanceStep::Nodes => {
                    let groups = self.backend.find_duplicate_nodes(options.label)?;
                    summary.nodes = Some(self.merge_nodes(&run_id, &groups, options.dry_run));
                    if options.dry_run {
                        previewed = groups;
                    }
                },
                MaintenanceStep::Edges => {
                    summary.edges = Some(self.remove_edges(&run_id, options.dry_run)?);
                },
                MaintenanceStep::Orphans => {
                    summary.orphans = Some(self.remove_orphans(
                        &run_id,
                        options.dry_run,
                        options.exclude_labels.as_deref(),
                        &previewed,
                    )?);
                },
            }
        }

        summary.cancelled = summary.cancelled
            || summary.nodes.as_ref().is_some_and(|r| r.cancelled)
            || summary.edges.as_ref().is_some_and(|r| r.cancelled)
            || summary.orphans.as_ref().is_some_and(|r| r.cancelled);
        summary.after = self.backend.get_stats()?;
        summary.duration_ms = elapsed_ms(start);

        metrics::counter!("maintenance_runs_total", "dry_run" => options.dry_run.to_string())
            .increment(1);
        metrics::histogram!("maintenance_duration_ms").record(summary.duration_ms as f64);
        info!(
            run_id = %run_id,
            nodes_before = summary.before.total_nodes,
            nodes_after = summary.after.total_nodes,
            edges_before = summary.before.total_edges,
            edges_after = summary.after.total_edges,
            cancelled = summary.cancelled,
            duration_ms = summary.duration_ms,
            "Maintenance pass completed"
        );
        Ok(summary)
    }
}

fn new_run_id() -> String {
    Uuid::now_v7().to_string()
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn as_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Orphans left once `groups` are merged.
///
/// Redundant members are gone after a merge. A survivor stays an orphan only
/// if every member of its group was one; otherwise it inherits their edges.
fn orphans_after_merge(mut orphans: Vec<NodeId>, groups: &[DuplicateNodeGroup]) -> Vec<NodeId> {
    if groups.is_empty() {
        return orphans;
    }
    let candidates: HashSet<NodeId> = orphans.iter().copied().collect();
    let mut gone = HashSet::new();
    for group in groups {
        if group.node_ids.iter().all(|id| candidates.contains(id)) {
            gone.extend(group.redundant().iter().copied());
        } else {
            gone.extend(group.node_ids.iter().copied());
        }
    }
    orphans.retain(|id| !gone.contains(id));
    orphans
}

fn describe_batch(batch: &[NodeId]) -> String {
    match (batch.first(), batch.last()) {
        (Some(first), Some(last)) => format!("orphans {first}..{last} x{}", batch.len()),
        _ => "orphans (empty batch)".to_string(),
    }
}

fn record_run(
    step: &'static str,
    dry_run: bool,
    affected: usize,
    failures: &[GroupFailure],
    duration_ms: u64,
) {
    metrics::counter!(
        "maintenance_items_total",
        "step" => step,
        "dry_run" => dry_run.to_string()
    )
    .increment(as_count(affected));
    metrics::counter!("maintenance_failures_total", "step" => step)
        .increment(as_count(failures.len()));
    metrics::histogram!("maintenance_step_duration_ms", "step" => step).record(duration_ms as f64);
}
