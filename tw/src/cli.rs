//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Taskweave - dependency-graph task runner with recovery and rollback
#[derive(Parser, Debug)]
#[command(
    name = "tw",
    version,
    about = "Run task graphs in dependency waves with failure recovery and checkpointed rollback"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute a plan file (YAML or JSON) to completion
    Run {
        /// Plan file
        plan: PathBuf,

        /// Print the full run report as JSON
        #[arg(long)]
        json: bool,

        /// Append run events to this JSONL file
        #[arg(long, value_name = "FILE")]
        events: Option<PathBuf>,

        /// Do not snapshot files before mutating waves
        #[arg(long)]
        no_checkpoints: bool,

        /// Working directory for commands and relative file paths
        #[arg(short = 'C', long = "dir", value_name = "DIR")]
        working_dir: Option<PathBuf>,

        /// Request id (defaults to a fresh uuid)
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Validate a plan file and show its execution waves
    Plan {
        /// Plan file
        plan: PathBuf,
    },

    /// List stored checkpoints, newest first
    Checkpoints,

    /// Restore files from a checkpoint
    Rollback {
        /// Checkpoint id, "latest" or "previous"
        #[arg(default_value = "latest")]
        checkpoint: String,

        /// Restrict restoration to these files
        files: Vec<PathBuf>,
    },

    /// Diff a checkpoint against current disk content
    Diff {
        /// Checkpoint id, "latest" or "previous"
        #[arg(default_value = "latest")]
        checkpoint: String,

        /// Limit to one file
        path: Option<PathBuf>,
    },

    /// Delete every checkpoint of a session
    Forget {
        /// Session id
        session: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from(["tw", "run", "plan.yml", "--json", "--no-checkpoints", "-C", "/tmp"]).unwrap();
        match cli.command {
            Command::Run {
                plan,
                json,
                no_checkpoints,
                working_dir,
                events,
                request_id,
            } => {
                assert_eq!(plan, PathBuf::from("plan.yml"));
                assert!(json);
                assert!(no_checkpoints);
                assert_eq!(working_dir, Some(PathBuf::from("/tmp")));
                assert!(events.is_none());
                assert!(request_id.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rollback_defaults_to_latest() {
        let cli = Cli::try_parse_from(["tw", "--log-level", "debug", "rollback"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Rollback { ref checkpoint, ref files } if checkpoint == "latest" && files.is_empty()));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["tw"]).is_err());
    }
}
