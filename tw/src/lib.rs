//! Taskweave - dependency-graph task runner with recovery and rollback
//!
//! A request is turned into a graph of tasks. Tasks run in waves: every task
//! whose dependencies have completed is dispatched concurrently, the wave is
//! awaited as a whole, and the graph is updated before the next wave is
//! computed. Failed tasks are classified and repaired by inserting a fix task
//! in front of them; files touched by a wave are snapshotted first so a run can
//! be rolled back.
//!
//! # Modules
//!
//! - [`domain`] - Task nodes and the task graph
//! - [`scheduler`] - Topological ordering, waves, cycle and deadlock detection
//! - [`recovery`] - Error classification, fix-task insertion, loop detection
//! - [`planner`] - Planner seam, plan ingestion and recursive decomposition
//! - [`executor`] - Executor seam and the shell executor
//! - [`orchestrator`] - Wave loop, global timeout, run reports
//! - [`events`] - Run event bus and JSONL event log
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod recovery;
pub mod scheduler;

// Re-export commonly used types
pub use config::Config;
pub use domain::{ErrorCategory, GraphError, RecoveryAttempt, TaskGraph, TaskKind, TaskNode, TaskOrigin, TaskStatus};
pub use events::{EventBus, EventEmitter, EventLogger, RunEvent};
pub use executor::{ErrorHint, ExecutionResult, ExecutorError, ShellExecutor, TaskExecutor};
pub use orchestrator::{Orchestrator, OrchestratorSettings, RequestPhase, RunOutcome, RunReport, StopReason, WaveRecord};
pub use planner::{Decomposer, FilePlanner, IngestError, IngestOptions, PlannedTask, Planner, PlannerError, ProjectMetadata};
pub use recovery::{RecoveryAction, RecoveryEngine, RecoveryOutcome};
pub use scheduler::{ScheduleError, execution_waves, next_wave, topological_order};
