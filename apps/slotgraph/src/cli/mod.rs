//! # Slotgraph CLI Module
//!
//! ## Available Commands
//!
//! - `plan` - Build the graph and show the plan without applying it
//! - `adapt` - Build, plan and execute; emit the manifest and adapted parts
//! - `slots` - Show the adapted slot table of one part
//! - `tree` - Draw the slot tree with state, disposition and role markers
//! - `snapshot` - Write the canonical snapshot of an adapted graph
//! - `verify` - Check an adapted graph against a snapshot or hash

mod commands;

use clap::{Parser, Subcommand};
use slotgraph_core::SlotGraphError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Slotgraph - adapt donor part trees to a new target context.
#[derive(Parser, Debug)]
#[command(name = "slotgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Rule configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Target context, e.g. "pickup"
    #[arg(short, long, global = true)]
    pub target: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the transformation plan without applying it
    Plan {
        /// Donor files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Also explain the rule decision for this slot
        #[arg(short, long)]
        explain: Option<String>,
    },

    /// Build, plan and execute; write the manifest and adapted parts
    Adapt {
        /// Donor files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory for manifest.json and parts.json
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the adapted slot table of a part
    Slots {
        /// Donor files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Part name, original or adapted
        #[arg(short, long)]
        part: String,
    },

    /// Draw the slot tree with state, disposition and role markers
    Tree {
        /// Donor files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Stop after planning instead of executing
        #[arg(long)]
        plan_only: bool,

        /// Render markdown instead of console text
        #[arg(long)]
        markdown: bool,

        /// Show the declaring donor file under each slot
        #[arg(long)]
        show_files: bool,

        /// Append the transformation history
        #[arg(long)]
        history: bool,

        /// Only show slots with this asset role (source, target, preserve)
        #[arg(long)]
        role: Option<String>,

        /// Only show slots with this disposition
        #[arg(long)]
        disposition: Option<String>,
    },

    /// Write the canonical snapshot of the adapted graph
    Snapshot {
        /// Donor files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Verify the adapted graph against a snapshot or BLAKE3 hash
    Verify {
        /// Donor files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Snapshot file to compare with
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Expected BLAKE3 hash of the snapshot
        #[arg(long)]
        hash: Option<String>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), SlotGraphError> {
    let pipeline = load_pipeline(cli.config.as_deref(), cli.target.as_deref())?;
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Plan { files, explain } => {
            cmd_plan(&pipeline, &files, explain.as_deref(), json_mode)
        }
        Commands::Adapt { files, output } => {
            cmd_adapt(&pipeline, &files, output.as_deref(), json_mode)
        }
        Commands::Slots { files, part } => cmd_slots(&pipeline, &files, &part, json_mode),
        Commands::Tree {
            files,
            plan_only,
            markdown,
            show_files,
            history,
            role,
            disposition,
        } => {
            let args = TreeArgs {
                plan_only,
                markdown,
                show_files,
                history,
                role,
                disposition,
            };
            cmd_tree(&pipeline, &files, &args, json_mode)
        }
        Commands::Snapshot { files, output } => cmd_snapshot(&pipeline, &files, &output),
        Commands::Verify {
            files,
            snapshot,
            hash,
        } => cmd_verify(&pipeline, &files, snapshot.as_deref(), hash.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "slotgraph",
            "plan",
            "engine.json",
            "--target",
            "pickup",
            "--json-mode",
        ])
        .expect("parse");
        assert_eq!(cli.target.as_deref(), Some("pickup"));
        assert!(cli.json_mode);
        assert!(matches!(cli.command, Commands::Plan { ref files, .. } if files.len() == 1));
    }

    #[test]
    fn parses_tree_filters() {
        let cli = Cli::try_parse_from([
            "slotgraph",
            "tree",
            "engine.json",
            "--role",
            "target",
            "--history",
            "--plan-only",
        ])
        .expect("parse");
        match cli.command {
            Commands::Tree {
                role,
                history,
                plan_only,
                markdown,
                ..
            } => {
                assert_eq!(role.as_deref(), Some("target"));
                assert!(history && plan_only && !markdown);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn files_are_required() {
        assert!(Cli::try_parse_from(["slotgraph", "adapt"]).is_err());
    }
}
