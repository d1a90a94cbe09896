use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use checkpointstore::cli::{Cli, Command};
use checkpointstore::config::Config;
use checkpointstore::{CheckpointRef, CheckpointRequest, CheckpointStore, CreateOutcome, RollbackReport};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

fn print_rollback(report: &RollbackReport) {
    for path in &report.restored_files {
        println!("{} restored {}", "✓".green(), path);
    }
    for failure in &report.failed_files {
        println!("{} {}: {}", "✗".red(), failure.path, failure.message);
    }
    if let Some(error) = &report.error {
        println!("{} {}", "✗".red(), error);
    }
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }

    info!("checkpointstore starting");
    let mut store =
        CheckpointStore::open(&config.store_path, config.store_options()).context("Failed to open checkpoint store")?;

    match cli.command {
        Command::Create {
            files,
            description,
            session,
            request,
        } => {
            let mut req = CheckpointRequest::new(files, description);
            req.session_id = session;
            req.request_id = request;
            match store.create_checkpoint(req)? {
                CreateOutcome::Created(cp) => {
                    println!("{} Created checkpoint: {}", "✓".green(), cp.checkpoint_id.cyan());
                }
                CreateOutcome::Replayed { checkpoint_id, rollback } => {
                    println!("Request already checkpointed as {}, rolled back", checkpoint_id.cyan());
                    print_rollback(&rollback);
                }
            }
        }
        Command::List => {
            let checkpoints = store.list_checkpoints();
            if checkpoints.is_empty() {
                println!("No checkpoints found");
            } else {
                for cp in checkpoints {
                    println!(
                        "{} {} {} ({} files)",
                        cp.checkpoint_id.yellow(),
                        cp.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                        cp.description,
                        cp.modified_files.len()
                    );
                }
            }
        }
        Command::Show { checkpoint } => {
            let reference = CheckpointRef::parse(&checkpoint);
            match store.resolve(&reference) {
                Some(cp) => {
                    println!("Checkpoint: {}", cp.checkpoint_id.cyan());
                    println!("  Created: {}", cp.timestamp);
                    println!("  Description: {}", cp.description);
                    println!("  Hash: {}", cp.content_hash);
                    if let Some(session) = &cp.session_id {
                        println!("  Session: {}", session);
                    }
                    if let Some(request) = &cp.request_id {
                        println!("  Request: {}", request);
                    }
                    for file in &cp.modified_files {
                        println!("  - {}", file);
                    }
                }
                None => println!("{} Checkpoint not found: {}", "✗".red(), checkpoint),
            }
        }
        Command::Cat { checkpoint, path } => {
            let content = store.get_file_content(&CheckpointRef::parse(&checkpoint), &path)?;
            print!("{}", content);
        }
        Command::Diff { checkpoint, path } => {
            let report = store.diff(&CheckpointRef::parse(&checkpoint), path.as_deref())?;
            let text = report.text();
            if text.is_empty() {
                println!("No changes since {}", report.checkpoint_id);
            } else {
                print!("{}", text);
            }
        }
        Command::Rollback { checkpoint, files } => {
            let files = if files.is_empty() { None } else { Some(files.as_slice()) };
            let report = store.rollback(&CheckpointRef::parse(&checkpoint), files);
            print_rollback(&report);
            if !report.success {
                std::process::exit(1);
            }
        }
        Command::Delete { checkpoint_id } => {
            if store.delete_checkpoint(&checkpoint_id)? {
                println!("{} Deleted checkpoint: {}", "✓".green(), checkpoint_id);
            } else {
                println!("{} Checkpoint not found: {}", "✗".red(), checkpoint_id);
            }
        }
        Command::PurgeSession { session_id } => {
            let count = store.delete_session_checkpoints(&session_id)?;
            println!("{} Deleted {} checkpoints for session {}", "✓".green(), count, session_id);
        }
    }

    Ok(())
}
