//! Orchestrator - drives one request from plan to outcome
//!
//! Owns the task graph for the duration of a request. Each iteration of the
//! wave loop checks the global budget, asks the scheduler for the next ready
//! set, snapshots the files that set is about to touch, dispatches every task
//! concurrently and waits for all of them, then applies results and recovery
//! decisions to the graph before computing the next wave.

use futures::future::join_all;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use checkpointstore::{CheckpointRequest, Checkpointer};

use super::report::{RequestPhase, RunOutcome, RunReport, StopReason, WaveRecord};
use crate::config::Config;
use crate::domain::{TaskGraph, TaskStatus};
use crate::events::{EventBus, EventEmitter};
use crate::executor::{ExecutionResult, TaskExecutor};
use crate::planner::{Decomposer, IngestOptions, Planner, ProjectMetadata, decompose_graph, ingest};
use crate::recovery::{RecoveryAction, RecoveryEngine};
use crate::scheduler::{ScheduleError, next_wave, validate_structure};

/// Limits the orchestrator enforces, taken from [`Config`]
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub timeout: Duration,
    pub max_waves: usize,
    pub max_concurrent_tasks: usize,
    pub checkpoint_before_mutation: bool,
    pub max_retries: u32,
    pub max_depth: usize,
    pub allow_external_dependencies: bool,
    /// Base for relative task file paths
    pub working_dir: Option<PathBuf>,
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            timeout: config.orchestrator.timeout(),
            max_waves: config.orchestrator.max_waves,
            max_concurrent_tasks: config.orchestrator.max_concurrent_tasks,
            checkpoint_before_mutation: config.orchestrator.checkpoint_before_mutation,
            max_retries: config.recovery.max_retries,
            max_depth: config.planning.max_depth,
            allow_external_dependencies: config.planning.allow_external_dependencies,
            working_dir: config.executor.working_dir.clone(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Composition root for a single request
pub struct Orchestrator {
    settings: OrchestratorSettings,
    executor: Arc<dyn TaskExecutor>,
    checkpointer: Option<Box<dyn Checkpointer>>,
    decomposer: Option<Arc<dyn Decomposer>>,
    events: Option<Arc<EventBus>>,
    request_id: String,
    /// Explicit checkpoint session; falls back to the request id
    session_id: Option<String>,
}

/// Mutable state of one run
struct RunState {
    graph: TaskGraph,
    recovery: RecoveryEngine,
    waves: Vec<WaveRecord>,
    trace: Vec<String>,
    checkpoints: Vec<String>,
}

impl RunState {
    fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!(%line, "RunState::log");
        self.trace.push(line);
    }
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn TaskExecutor>, settings: OrchestratorSettings) -> Self {
        let request_id = uuid::Uuid::now_v7().to_string();
        debug!(%request_id, ?settings, "Orchestrator::new: called");
        Self {
            settings,
            executor,
            checkpointer: None,
            decomposer: None,
            events: None,
            session_id: None,
            request_id,
        }
    }

    pub fn with_checkpointer(mut self, checkpointer: Box<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_decomposer(mut self, decomposer: Arc<dyn Decomposer>) -> Self {
        self.decomposer = Some(decomposer);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Correlation key for checkpoints and events; a new uuid by default
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Checkpoint session; defaults to the request id
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn session_id(&self) -> &str {
        self.session_id.as_deref().unwrap_or(&self.request_id)
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Give back the checkpointer, e.g. to roll a run back afterwards
    pub fn take_checkpointer(&mut self) -> Option<Box<dyn Checkpointer>> {
        self.checkpointer.take()
    }

    fn emitter(&self) -> EventEmitter {
        match &self.events {
            Some(bus) => bus.emitter_for(self.request_id.clone()),
            None => EventEmitter::disconnected(self.request_id.clone()),
        }
    }

    /// Plan, ingest, decompose, then run
    pub async fn plan_and_run(&mut self, planner: &dyn Planner, request: &str, project: &ProjectMetadata) -> RunReport {
        info!(request_id = %self.request_id, "Orchestrator::plan_and_run: called");
        let started = Instant::now();
        let emitter = self.emitter();
        emitter.phase_changed(RequestPhase::Planning);

        match self.prepare(planner, request, project).await {
            Ok(graph) => self.run(graph).await,
            Err(error) => {
                warn!(request_id = %self.request_id, %error, "Orchestrator::plan_and_run: planning failed");
                let state = RunState {
                    graph: TaskGraph::new(),
                    recovery: RecoveryEngine::new(self.settings.max_retries),
                    waves: Vec::new(),
                    trace: vec![format!("planning failed: {error}")],
                    checkpoints: Vec::new(),
                };
                self.finish(state, RunOutcome::Failed { error }, started, &emitter)
            }
        }
    }

    async fn prepare(&self, planner: &dyn Planner, request: &str, project: &ProjectMetadata) -> Result<TaskGraph, String> {
        let records = planner.plan(request, project).await.map_err(|e| e.to_string())?;
        debug!(count = records.len(), "Orchestrator::prepare: planner returned records");
        let options = IngestOptions {
            allow_external: self.settings.allow_external_dependencies,
            ..IngestOptions::default()
        };
        let graph = ingest(&records, &options).map_err(|e| e.to_string())?;
        match &self.decomposer {
            Some(decomposer) => decompose_graph(graph, decomposer.as_ref(), self.settings.max_depth)
                .await
                .map_err(|e| e.to_string()),
            None => Ok(graph),
        }
    }

    /// Execute a graph to a terminal outcome; never returns an error
    pub async fn run(&mut self, graph: TaskGraph) -> RunReport {
        info!(request_id = %self.request_id, tasks = graph.len(), "Orchestrator::run: called");
        let started = Instant::now();
        let emitter = self.emitter();
        emitter.phase_changed(RequestPhase::Executing);

        let mut state = RunState {
            graph,
            recovery: RecoveryEngine::new(self.settings.max_retries),
            waves: Vec::new(),
            trace: Vec::new(),
            checkpoints: Vec::new(),
        };

        if let Err(e) = validate_structure(&state.graph, self.settings.allow_external_dependencies) {
            state.log(format!("structural error: {e}"));
            return self.finish(state, RunOutcome::Failed { error: e.to_string() }, started, &emitter);
        }

        let outcome = self.wave_loop(&mut state, started, &emitter).await;
        self.finish(state, outcome, started, &emitter)
    }

    async fn wave_loop(&mut self, state: &mut RunState, started: Instant, emitter: &EventEmitter) -> RunOutcome {
        loop {
            if started.elapsed() >= self.settings.timeout {
                state.log(format!(
                    "global timeout of {}ms exceeded before wave {}",
                    self.settings.timeout.as_millis(),
                    state.waves.len() + 1
                ));
                return stop(state, StopReason::GlobalTimeout);
            }

            let wave_ids = match next_wave(&state.graph, &state.graph.completed_ids()) {
                Ok(Some(ids)) => ids,
                Ok(None) => return assess(state),
                Err(ScheduleError::Deadlock {
                    blocked,
                    failed_upstream,
                }) => {
                    state.log(format!(
                        "deadlock: {} blocked by {}",
                        blocked.join(", "),
                        failed_upstream.join(", ")
                    ));
                    return stop(state, StopReason::Deadlock);
                }
                Err(e) => return RunOutcome::Failed { error: e.to_string() },
            };

            if state.waves.len() >= self.settings.max_waves {
                state.log(format!("wave limit of {} reached", self.settings.max_waves));
                return stop(state, StopReason::WaveLimit);
            }

            let index = state.waves.len() + 1;
            if let Some(reason) = self.execute_wave(state, index, wave_ids, emitter).await {
                return stop(state, reason);
            }
        }
    }

    /// Run one wave; returns a stop reason when a failure could not be recovered
    async fn execute_wave(
        &mut self,
        state: &mut RunState,
        index: usize,
        ids: Vec<String>,
        emitter: &EventEmitter,
    ) -> Option<StopReason> {
        info!(wave = index, tasks = ?ids, "Orchestrator::execute_wave: starting");
        emitter.wave_started(index, &ids);
        state.log(format!("wave {index}: {}", ids.join(", ")));

        let mut record = WaveRecord {
            index,
            tasks: ids.clone(),
            ..WaveRecord::default()
        };
        record.checkpoint_id = self.checkpoint_wave(state, index, &ids, emitter);

        let mut tasks = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Err(e) = state.graph.set_status(id, TaskStatus::InProgress) {
                warn!(%id, %e, "Orchestrator::execute_wave: could not mark in progress");
            }
            if let Some(task) = state.graph.get(id) {
                tasks.push(task.clone());
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_tasks.max(1)));
        let futures = tasks.into_iter().map(|task| {
            let executor = Arc::clone(&self.executor);
            let semaphore = Arc::clone(&semaphore);
            let emitter = emitter.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                emitter.task_started(&task.id);
                let result = match executor.execute(&task).await {
                    Ok(result) => result,
                    Err(e) => ExecutionResult::failure(e.to_string()),
                };
                (task.id, result)
            }
        });
        let results = join_all(futures).await;

        let mut stop_reason = None;
        for (id, result) in results {
            if result.success {
                if let Err(e) = state.graph.set_status(&id, TaskStatus::Completed) {
                    warn!(%id, %e, "Orchestrator::execute_wave: could not mark completed");
                }
                emitter.task_completed(&id);
                record.succeeded.push(id);
                continue;
            }

            warn!(%id, "Orchestrator::execute_wave: task failed");
            emitter.task_failed(&id, &result.output);
            if let Err(e) = state.graph.set_status(&id, TaskStatus::Failed) {
                warn!(%id, %e, "Orchestrator::execute_wave: could not mark failed");
            }
            state.log(format!("{id} failed"));

            let outcome = state
                .recovery
                .recover(&mut state.graph, &id, &result.output, &result.error_hints);
            emitter.recovery_applied(&id, outcome.action, outcome.fix_task_id.as_deref());
            for line in &outcome.reasoning {
                state.log(format!("  {line}"));
            }
            match outcome.action {
                RecoveryAction::Retry => {
                    record.fixes.extend(outcome.fix_task_id);
                }
                _ => {
                    let reason = if outcome.loop_detected {
                        StopReason::LoopDetected
                    } else {
                        StopReason::TaskFailed
                    };
                    // the first unrecoverable failure names the reason
                    if stop_reason.is_none() {
                        stop_reason = Some(reason);
                    }
                }
            }
            record.failed.push(id);
        }

        emitter.wave_completed(index, record.succeeded.len(), record.failed.len());
        info!(
            wave = index,
            succeeded = record.succeeded.len(),
            failed = record.failed.len(),
            "Orchestrator::execute_wave: done"
        );
        state.waves.push(record);
        stop_reason
    }

    /// Snapshot existing target files of mutating tasks; failures are logged, never fatal
    fn checkpoint_wave(&mut self, state: &mut RunState, index: usize, ids: &[String], emitter: &EventEmitter) -> Option<String> {
        if !self.settings.checkpoint_before_mutation {
            return None;
        }
        let session_id = self.session_id().to_string();
        let checkpointer = self.checkpointer.as_mut()?;

        let files: BTreeSet<PathBuf> = ids
            .iter()
            .filter_map(|id| state.graph.get(id))
            .filter(|task| task.is_mutating())
            .filter_map(|task| task.file_path())
            .map(|path| match &self.settings.working_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path.to_path_buf(),
            })
            .filter(|path| path.exists())
            .collect();
        if files.is_empty() {
            debug!(wave = index, "Orchestrator::checkpoint_wave: no existing files to snapshot");
            return None;
        }

        let names: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
        let request = CheckpointRequest::new(files.into_iter().collect(), format!("before wave {index} of {}", self.request_id))
            .with_session(session_id)
            .with_request(format!("{}:wave-{index}", self.request_id));

        match checkpointer.create_checkpoint(request) {
            Ok(outcome) => {
                let id = outcome.checkpoint_id().to_string();
                info!(wave = index, checkpoint_id = %id, "Orchestrator::checkpoint_wave: created");
                emitter.checkpoint_created(index, &id, names.clone());
                state.log(format!("checkpoint {id} covers {}", names.join(", ")));
                state.checkpoints.push(id.clone());
                Some(id)
            }
            Err(e) => {
                warn!(wave = index, %e, "Orchestrator::checkpoint_wave: failed");
                emitter.checkpoint_failed(index, &e.to_string());
                state.log(format!("checkpoint before wave {index} failed: {e}"));
                None
            }
        }
    }

    fn finish(&self, state: RunState, outcome: RunOutcome, started: Instant, emitter: &EventEmitter) -> RunReport {
        let phase = outcome.phase();
        info!(request_id = %self.request_id, %phase, summary = %outcome.summary(), "Orchestrator::finish");
        emitter.phase_changed(phase);
        emitter.run_finished(&outcome.summary());
        RunReport {
            request_id: self.request_id.clone(),
            session_id: self.session_id().to_string(),
            outcome,
            recoveries: state.recovery.history().to_vec(),
            graph: state.graph,
            waves: state.waves,
            trace: state.trace,
            checkpoints: state.checkpoints,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Skip whatever can no longer run and report the failing tasks
fn stop(state: &mut RunState, reason: StopReason) -> RunOutcome {
    let skipped = state.graph.skip_pending();
    if !skipped.is_empty() {
        state.log(format!("skipped {}", skipped.join(", ")));
    }
    RunOutcome::Stopped {
        reason,
        failed: state.graph.failed_ids(),
    }
}

/// Outcome once nothing is pending
fn assess(state: &mut RunState) -> RunOutcome {
    let assessment = RecoveryEngine::assess(&state.graph);
    match assessment.action {
        RecoveryAction::Completed => RunOutcome::Completed,
        RecoveryAction::Stop => stop(state, StopReason::TaskFailed),
        _ => RunOutcome::Failed {
            error: "run ended with unfinished tasks".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskNode;
    use crate::executor::mock::MockExecutor;

    fn orchestrator(executor: MockExecutor) -> Orchestrator {
        Orchestrator::new(Arc::new(executor), OrchestratorSettings::default()).with_request_id("req")
    }

    fn chain() -> TaskGraph {
        TaskGraph::from_nodes(vec![
            TaskNode::new_command("A", "first", "true"),
            TaskNode::new_command("B", "second", "true").with_dependencies(["A"]),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_completes_in_dependency_waves() {
        let report = orchestrator(MockExecutor::new()).run(chain()).await;
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.waves.len(), 2);
        assert_eq!(report.waves[0].tasks, vec!["A"]);
        assert_eq!(report.waves[1].tasks, vec!["B"]);
        assert_eq!(report.phase(), RequestPhase::Completed);
    }

    #[tokio::test]
    async fn test_independent_tasks_share_a_wave() {
        let graph = TaskGraph::from_nodes(vec![
            TaskNode::new_command("x", "x", "true"),
            TaskNode::new_command("y", "y", "true"),
            TaskNode::new_command("z", "z", "true").with_dependencies(["x", "y"]),
        ])
        .unwrap();
        let report = orchestrator(MockExecutor::new()).run(graph).await;
        assert_eq!(report.waves[0].tasks, vec!["x", "y"]);
        assert_eq!(report.waves[1].tasks, vec!["z"]);
    }

    #[tokio::test]
    async fn test_failure_is_recovered_in_place() {
        let executor = MockExecutor::new().fail_times("A", "SyntaxError: invalid syntax", 1);
        let report = orchestrator(executor).run(chain()).await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.dispatched(), vec!["A", "A-fix-1", "A", "B"]);
        assert_eq!(report.waves[0].fixes, vec!["A-fix-1"]);
        assert_eq!(report.recoveries.len(), 1);
        assert_eq!(report.graph.get("A").unwrap().retry_count, 1);
    }

    #[tokio::test]
    async fn test_retry_ceiling_stops_run() {
        let executor = MockExecutor::new().fail_times("A", "No module named 'x'", 4);
        let report = orchestrator(executor).run(chain()).await;

        assert_eq!(
            report.outcome,
            RunOutcome::Stopped {
                reason: StopReason::TaskFailed,
                failed: vec!["A".to_string()],
            }
        );
        assert_eq!(report.recoveries.len(), 3);
        assert_eq!(report.graph.get("B").unwrap().status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn test_loop_detection_stops_run() {
        let executor = MockExecutor::new().fail_times("A", "SyntaxError: invalid syntax", 3);
        let report = orchestrator(executor).run(chain()).await;
        assert!(matches!(
            report.outcome,
            RunOutcome::Stopped {
                reason: StopReason::LoopDetected,
                ..
            }
        ));
        assert!(report.trace.iter().any(|l| l.contains("no more strategies")));
    }

    #[tokio::test]
    async fn test_prefailed_upstream_deadlocks() {
        let mut graph = chain();
        graph.set_status("A", TaskStatus::Failed).unwrap();
        let report = orchestrator(MockExecutor::new()).run(graph).await;
        assert_eq!(
            report.outcome,
            RunOutcome::Stopped {
                reason: StopReason::Deadlock,
                failed: vec!["A".to_string()],
            }
        );
        assert!(report.waves.is_empty());
    }

    #[tokio::test]
    async fn test_zero_budget_times_out() {
        let settings = OrchestratorSettings {
            timeout: Duration::ZERO,
            ..OrchestratorSettings::default()
        };
        let mut orch = Orchestrator::new(Arc::new(MockExecutor::new()), settings);
        let report = orch.run(chain()).await;
        assert!(matches!(
            report.outcome,
            RunOutcome::Stopped {
                reason: StopReason::GlobalTimeout,
                ..
            }
        ));
        assert!(report.graph.nodes().iter().all(|n| n.status == TaskStatus::Skipped));
    }

    #[test]
    fn test_session_follows_request_id_until_set() {
        let orch = orchestrator(MockExecutor::new());
        assert_eq!(orch.session_id(), "req");

        let orch = orch.with_request_id("req-2");
        assert_eq!(orch.session_id(), "req-2");

        let orch = orch.with_session_id("chat-9").with_request_id("req-3");
        assert_eq!(orch.session_id(), "chat-9");
        assert_eq!(orch.request_id(), "req-3");
    }

    #[tokio::test]
    async fn test_wave_limit() {
        let settings = OrchestratorSettings {
            max_waves: 1,
            ..OrchestratorSettings::default()
        };
        let mut orch = Orchestrator::new(Arc::new(MockExecutor::new()), settings);
        let report = orch.run(chain()).await;
        assert!(matches!(
            report.outcome,
            RunOutcome::Stopped {
                reason: StopReason::WaveLimit,
                ..
            }
        ));
        assert_eq!(report.waves.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_dependency_fails_structurally() {
        let graph = TaskGraph::from_nodes(vec![TaskNode::new_command("A", "a", "true").with_dependencies(["ghost"])]).unwrap();
        let report = orchestrator(MockExecutor::new()).run(graph).await;
        assert!(matches!(report.outcome, RunOutcome::Failed { .. }));
        assert!(report.waves.is_empty());
    }

    #[tokio::test]
    async fn test_events_follow_the_run() {
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let report = orchestrator(MockExecutor::new()).with_events(Arc::clone(&bus)).run(chain()).await;
        assert!(report.outcome.is_completed());

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert_eq!(types.first(), Some(&"PhaseChanged"));
        assert_eq!(types.last(), Some(&"RunFinished"));
        assert_eq!(types.iter().filter(|t| **t == "WaveStarted").count(), 2);
    }
}
