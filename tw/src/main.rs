//! Taskweave - dependency-graph task runner
//!
//! CLI entry point for running plans and managing their checkpoints.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info};

use checkpointstore::{CheckpointRef, CheckpointStore, RollbackReport};
use taskweave::cli::{Cli, Command};
use taskweave::config::Config;
use taskweave::events::{EventBus, EventLogger, RunEvent};
use taskweave::executor::ShellExecutor;
use taskweave::orchestrator::{Orchestrator, OrchestratorSettings, RequestPhase, RunReport};
use taskweave::planner::{FilePlanner, IngestOptions, ProjectMetadata, ingest};
use taskweave::scheduler::execution_waves;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: &str) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskweave")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level_str = cli_log_level.unwrap_or(config_log_level);
    let level = match level_str.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        other => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("taskweave.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), &config.log_level).context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            plan,
            json,
            events,
            no_checkpoints,
            working_dir,
            request_id,
        } => {
            let options = RunOptions {
                json,
                events,
                no_checkpoints,
                working_dir,
                request_id,
            };
            let phase = cmd_run(config, &plan, options).await?;
            std::process::exit(match phase {
                RequestPhase::Completed => 0,
                RequestPhase::Stopped => 1,
                _ => 2,
            });
        }
        Command::Plan { plan } => cmd_plan(&config, &plan),
        Command::Checkpoints => cmd_checkpoints(&config),
        Command::Rollback { checkpoint, files } => cmd_rollback(&config, &checkpoint, files),
        Command::Diff { checkpoint, path } => cmd_diff(&config, &checkpoint, path.as_deref()),
        Command::Forget { session } => cmd_forget(&config, &session),
    }
}

struct RunOptions {
    json: bool,
    events: Option<PathBuf>,
    no_checkpoints: bool,
    working_dir: Option<PathBuf>,
    request_id: Option<String>,
}

fn open_store(config: &Config) -> Result<CheckpointStore> {
    CheckpointStore::open(&config.checkpoints.dir, config.checkpoints.store_options())
        .context("Failed to open checkpoint store")
}

/// Run a plan file
async fn cmd_run(mut config: Config, plan: &Path, options: RunOptions) -> Result<RequestPhase> {
    debug!(?plan, "cmd_run: called");
    if let Some(dir) = options.working_dir {
        config.executor.working_dir = Some(dir);
    }

    let executor = ShellExecutor::new(&config.executor);
    let mut orchestrator = Orchestrator::new(Arc::new(executor), OrchestratorSettings::from(&config));
    if let Some(id) = options.request_id {
        orchestrator = orchestrator.with_request_id(id.clone()).with_session_id(id);
    }
    if !options.no_checkpoints {
        orchestrator = orchestrator.with_checkpointer(Box::new(open_store(&config)?));
    }

    let bus = Arc::new(EventBus::with_default_capacity());
    let logger = options
        .events
        .map(|path| tokio::spawn(EventLogger::new(path).run(bus.subscribe())));
    let printer = (!options.json).then(|| tokio::spawn(print_progress(bus.subscribe())));
    orchestrator = orchestrator.with_events(Arc::clone(&bus));

    let root = config
        .executor
        .working_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let project = ProjectMetadata::new(root);
    let planner = FilePlanner::new(plan);
    let report = orchestrator
        .plan_and_run(&planner, &plan.display().to_string(), &project)
        .await;

    for handle in logger.into_iter().chain(printer) {
        let _ = handle.await;
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.phase())
}

/// Live progress lines until the run finishes
async fn print_progress(mut rx: broadcast::Receiver<RunEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                match &event {
                    RunEvent::WaveStarted { wave, task_ids, .. } => {
                        println!("{} wave {}: {}", "▶".cyan(), wave, task_ids.join(", "));
                    }
                    RunEvent::CheckpointCreated { checkpoint_id, .. } => {
                        println!("  {} checkpoint {}", "●".blue(), checkpoint_id.dimmed());
                    }
                    RunEvent::CheckpointFailed { error, .. } => {
                        println!("  {} checkpoint failed: {}", "!".yellow(), error);
                    }
                    RunEvent::TaskCompleted { task_id, .. } => println!("  {} {}", "✓".green(), task_id),
                    RunEvent::TaskFailed { task_id, .. } => println!("  {} {}", "✗".red(), task_id),
                    RunEvent::RecoveryApplied {
                        fix_task_id: Some(fix), ..
                    } => {
                        println!("  {} inserted {}", "↻".yellow(), fix);
                    }
                    _ => {}
                }
                if event.is_terminal() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_report(report: &RunReport) {
    let summary = report.outcome.summary();
    let headline = match report.phase() {
        RequestPhase::Completed => summary.green().bold(),
        RequestPhase::Stopped => summary.yellow().bold(),
        _ => summary.red().bold(),
    };
    println!();
    println!("{} {}", "Result:".bold(), headline);
    println!(
        "  {} waves, {} tasks, {} recoveries in {}ms",
        report.waves.len(),
        report.graph.len(),
        report.recoveries.len(),
        report.elapsed_ms
    );
    if !report.checkpoints.is_empty() {
        println!("  checkpoints: {}", report.checkpoints.join(", ").dimmed());
    }
    if !report.outcome.is_completed() {
        for line in &report.trace {
            println!("  {}", line.dimmed());
        }
    }
}

/// Validate a plan and print its waves
fn cmd_plan(config: &Config, plan: &Path) -> Result<()> {
    debug!(?plan, "cmd_plan: called");
    let content = fs::read_to_string(plan).with_context(|| format!("Failed to read plan {}", plan.display()))?;
    let records = FilePlanner::parse(plan, &content)?;
    let options = IngestOptions {
        allow_external: config.planning.allow_external_dependencies,
        ..IngestOptions::default()
    };
    let graph = ingest(&records, &options)?;
    let waves = execution_waves(&graph)?;

    println!("{} tasks in {} waves", graph.len(), waves.len());
    for (i, wave) in waves.iter().enumerate() {
        println!("{} {}", format!("wave {}:", i + 1).cyan(), wave.join(", "));
    }
    let external = graph.external_dependencies();
    if !external.is_empty() {
        let names: Vec<&str> = external.iter().map(String::as_str).collect();
        println!("{} {}", "external:".dimmed(), names.join(", "));
    }
    Ok(())
}

fn cmd_checkpoints(config: &Config) -> Result<()> {
    debug!("cmd_checkpoints: called");
    let store = open_store(config)?;
    let checkpoints = store.list_checkpoints();
    if checkpoints.is_empty() {
        println!("No checkpoints found");
        return Ok(());
    }
    for cp in checkpoints {
        println!(
            "{} {} {} ({} files){}",
            cp.checkpoint_id.yellow(),
            cp.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            cp.description,
            cp.modified_files.len(),
            cp.session_id.map(|s| format!(" [{}]", s)).unwrap_or_default()
        );
    }
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

fn cmd_rollback(config: &Config, checkpoint: &str, files: Vec<PathBuf>) -> Result<()> {
    debug!(%checkpoint, ?files, "cmd_rollback: called");
    let mut store = open_store(config)?;
    let reference = CheckpointRef::parse(checkpoint);
    let filter = (!files.is_empty()).then_some(files.as_slice());
    let report = store.rollback(&reference, filter);
    print_rollback(&report);
    if !report.success {
        eyre::bail!("Rollback to {} did not fully succeed", checkpoint);
    }
    Ok(())
}

fn cmd_diff(config: &Config, checkpoint: &str, path: Option<&Path>) -> Result<()> {
    debug!(%checkpoint, ?path, "cmd_diff: called");
    let mut store = open_store(config)?;
    let report = store.diff(&CheckpointRef::parse(checkpoint), path)?;
    let text = report.text();
    if text.is_empty() {
        println!("No changes since {}", report.checkpoint_id.yellow());
    } else {
        print!("{}", text);
    }
    Ok(())
}

fn cmd_forget(config: &Config, session: &str) -> Result<()> {
    debug!(%session, "cmd_forget: called");
    let mut store = open_store(config)?;
    let removed = store.delete_session_checkpoints(session)?;
    println!("Removed {} checkpoints of session {}", removed, session.cyan());
    Ok(())
}
