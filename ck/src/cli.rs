//! CLI argument parsing for checkpointstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ck")]
#[command(author, version, about = "Inspect and restore file checkpoints", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Checkpoint directory (overrides config)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Snapshot files into a new checkpoint
    Create {
        /// Files to capture
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Description of the checkpoint
        #[arg(short, long, default_value = "manual checkpoint")]
        description: String,

        /// Session correlation key
        #[arg(long)]
        session: Option<String>,

        /// Request correlation key
        #[arg(long)]
        request: Option<String>,
    },

    /// List checkpoints, newest first
    List,

    /// Show metadata of one checkpoint
    Show {
        /// Checkpoint id, "latest" or "previous"
        #[arg(required = true)]
        checkpoint: String,
    },

    /// Print a file as captured by a checkpoint
    Cat {
        /// Checkpoint id, "latest" or "previous"
        #[arg(required = true)]
        checkpoint: String,

        /// File path as captured
        #[arg(required = true)]
        path: PathBuf,
    },

    /// Diff a checkpoint against current disk content
    Diff {
        /// Checkpoint id, "latest" or "previous"
        #[arg(required = true)]
        checkpoint: String,

        /// Limit to one file
        path: Option<PathBuf>,
    },

    /// Restore files from a checkpoint
    Rollback {
        /// Checkpoint id, "latest" or "previous"
        #[arg(required = true)]
        checkpoint: String,

        /// Restrict restoration to these files
        files: Vec<PathBuf>,
    },

    /// Delete a checkpoint
    Delete {
        /// Checkpoint id
        #[arg(required = true)]
        checkpoint_id: String,
    },

    /// Delete every checkpoint of a session
    PurgeSession {
        /// Session id
        #[arg(required = true)]
        session_id: String,
    },
}
