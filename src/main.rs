//! Binary entry point for factgraph.
//!
//! This binary provides the CLI interface for the temporal knowledge graph.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use factgraph::cli::{
    CommandContext, MaintainArgs, TemporalEdgeArgs, cmd_duplicates, cmd_get_node, cmd_history,
    cmd_maintain, cmd_merge_edge, cmd_merge_edge_temporal, cmd_merge_node, cmd_reset, cmd_stats,
};
use factgraph::config::FactgraphConfig;
use factgraph::observability::{self, LoggingConfig};
use factgraph::services::{CancellationToken, MaintenanceStep};
use std::path::PathBuf;
use std::process::ExitCode;

/// factgraph - A temporal knowledge graph store with maintenance tooling.
#[derive(Parser)]
#[command(name = "factgraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides config).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Create or update a node by its natural key.
    MergeNode {
        /// Node label, e.g. Company.
        label: String,

        /// Properties as a JSON object.
        properties: String,
    },

    /// Create or overwrite a simple edge.
    MergeEdge {
        /// Source node (`Label:key` or `#id`).
        source: String,

        /// Target node (`Label:key` or `#id`).
        target: String,

        /// Relation type, e.g. `SUPPLIES_TO`.
        relation: String,

        /// Edge properties as a JSON object.
        #[arg(long)]
        props: Option<String>,
    },

    /// Append a new version of a temporal edge.
    MergeEdgeTemporal {
        /// Source node (`Label:key` or `#id`).
        source: String,

        /// Target node (`Label:key` or `#id`).
        target: String,

        /// Relation type.
        relation: String,

        /// Start of validity (RFC 3339 or YYYY-MM-DD).
        #[arg(long)]
        valid_from: String,

        /// Exclusive end of validity; open-ended when omitted.
        #[arg(long)]
        valid_to: Option<String>,

        /// Edge properties as a JSON object.
        #[arg(long)]
        props: Option<String>,

        /// Overlap policy: reject or supersede.
        #[arg(long)]
        policy: Option<String>,
    },

    /// Show a node.
    GetNode {
        /// Node (`Label:key` or `#id`).
        node: String,
    },

    /// Show every version of a temporal edge.
    History {
        /// Source node.
        source: String,

        /// Target node.
        target: String,

        /// Relation type.
        relation: String,
    },

    /// Show node and edge counts.
    Stats,

    /// List duplicate node and edge groups.
    Duplicates {
        /// Only check nodes with this label.
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Run the maintenance pass.
    Maintain {
        /// Report what would change without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Run one step only: nodes, edges or orphans.
        #[arg(long)]
        only: Option<MaintenanceStep>,

        /// Only deduplicate nodes with this label.
        #[arg(short, long)]
        label: Option<String>,

        /// Labels never pruned as orphans (comma-separated).
        #[arg(long)]
        exclude_labels: Option<String>,
    },

    /// Delete every node and edge.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match FactgraphConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };
    if let Some(db) = cli.db.clone() {
        config.db_path = db;
    }

    if let Err(e) = observability::init(LoggingConfig::from_settings(&config.logging, cli.verbose))
    {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::warn!("Interrupt received, stopping after the current transaction");
        handler_token.cancel();
    }) {
        tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    match run_command(cli.command, &config, cancel) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command and renders its JSON output.
fn run_command(
    command: Commands,
    config: &FactgraphConfig,
    cancel: CancellationToken,
) -> Result<String, Box<dyn std::error::Error>> {
    let ctx = CommandContext::open(config, cancel)?;
    tracing::debug!(db = %config.db_path.display(), "Opened graph database");

    let value = match command {
        Commands::MergeNode { label, properties } => cmd_merge_node(&ctx, &label, &properties)?,

        Commands::MergeEdge {
            source,
            target,
            relation,
            props,
        } => cmd_merge_edge(&ctx, &source, &target, &relation, props.as_deref())?,

        Commands::MergeEdgeTemporal {
            source,
            target,
            relation,
            valid_from,
            valid_to,
            props,
            policy,
        } => cmd_merge_edge_temporal(
            &ctx,
            &TemporalEdgeArgs {
                source,
                target,
                relation,
                valid_from,
                valid_to,
                properties: props,
                policy,
            },
        )?,

        Commands::GetNode { node } => cmd_get_node(&ctx, &node)?,

        Commands::History {
            source,
            target,
            relation,
        } => cmd_history(&ctx, &source, &target, &relation)?,

        Commands::Stats => cmd_stats(&ctx)?,

        Commands::Duplicates { label } => cmd_duplicates(&ctx, label.as_deref())?,

        Commands::Maintain {
            dry_run,
            only,
            label,
            exclude_labels,
        } => cmd_maintain(
            &ctx,
            &MaintainArgs {
                dry_run,
                only,
                label,
                exclude_labels,
            },
        )?,

        Commands::Reset { yes } => cmd_reset(&ctx, yes)?,
    };

    Ok(serde_json::to_string_pretty(&value)?)
}
