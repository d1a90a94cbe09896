//! RecoveryEngine - turn a task failure into a fix task or a terminal stop

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::classifier::classify_with_hints;
use super::strategies;
use crate::domain::{ErrorCategory, GraphError, RecoveryAttempt, TaskGraph, TaskKind, TaskNode, TaskOrigin, TaskStatus};
use crate::executor::ErrorHint;

/// Default retry ceiling per task
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// What the orchestrator should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Work remains and nothing is wrong
    Continue,
    /// A fix task was inserted; the failed task will run again after it
    Retry,
    /// Terminal; the failed task is marked failed
    Stop,
    /// Every task is completed or skipped
    Completed,
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Retry => write!(f, "retry"),
            Self::Stop => write!(f, "stop"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Result of one recovery decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub action: RecoveryAction,
    pub fix_task_id: Option<String>,
    pub category: Option<ErrorCategory>,
    /// Stopped because every alternative for the category was already tried
    #[serde(default)]
    pub loop_detected: bool,
    /// Every structural change made, in order
    pub reasoning: Vec<String>,
}

impl RecoveryOutcome {
    fn new(action: RecoveryAction) -> Self {
        Self {
            action,
            fix_task_id: None,
            category: None,
            loop_detected: false,
            reasoning: Vec::new(),
        }
    }

    fn note(mut self, line: impl Into<String>) -> Self {
        self.reasoning.push(line.into());
        self
    }
}

/// Classifies failures, inserts fix tasks, and enforces termination
///
/// The engine keeps an append-only history of the fixes it inserted, which is
/// what loop detection scans. One engine serves one request.
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    max_retries: u32,
    history: Vec<RecoveryAttempt>,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RecoveryEngine {
    pub fn new(max_retries: u32) -> Self {
        debug!(max_retries, "RecoveryEngine::new: called");
        Self {
            max_retries,
            history: Vec::new(),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Fixes inserted so far, oldest first
    pub fn history(&self) -> &[RecoveryAttempt] {
        &self.history
    }

    /// Earlier fixes for the same (task, category) pair
    fn loop_count(&self, parent: &str, category: ErrorCategory) -> usize {
        self.history
            .iter()
            .rev()
            .filter(|a| a.parent == parent && a.category == category)
            .count()
    }

    /// Handle the failure of `failed_id`, mutating `graph` in place
    ///
    /// A failing fix task is charged to the planned task it was inserted for:
    /// the retry ceiling and loop history belong to that root task, so chains
    /// of fixes are bounded by the same ceiling as the task itself.
    pub fn recover(
        &mut self,
        graph: &mut TaskGraph,
        failed_id: &str,
        error_text: &str,
        hints: &[ErrorHint],
    ) -> RecoveryOutcome {
        debug!(%failed_id, "RecoveryEngine::recover: called");
        let Some(task) = graph.get(failed_id).cloned() else {
            warn!(%failed_id, "RecoveryEngine::recover: unknown task");
            return RecoveryOutcome::new(RecoveryAction::Stop).note(format!("task {failed_id} is not in the graph"));
        };
        let root_id = root_task(graph, failed_id);
        let Some(root) = graph.get(&root_id).cloned() else {
            warn!(%failed_id, %root_id, "RecoveryEngine::recover: fix parent missing");
            let outcome = RecoveryOutcome::new(RecoveryAction::Stop)
                .note(format!("fix task {failed_id} belongs to {root_id}, which is not in the graph"));
            return fail_task(graph, failed_id, outcome);
        };
        let mut outcome = RecoveryOutcome::new(RecoveryAction::Retry);
        if root_id != failed_id {
            outcome = outcome.note(format!("{failed_id} is a fix for {root_id}; charging the failure to {root_id}"));
        }

        if root.retry_count >= self.max_retries {
            info!(%failed_id, %root_id, retries = root.retry_count, "RecoveryEngine::recover: retry ceiling reached");
            outcome.action = RecoveryAction::Stop;
            outcome = outcome.note(format!(
                "retry ceiling reached: {root_id} already has {} fix attempts (max {})",
                root.retry_count, self.max_retries
            ));
            return fail_chain(graph, failed_id, &root_id, outcome);
        }

        let category = classify_with_hints(error_text, hints);
        outcome.category = Some(category);
        outcome = outcome.note(format!("classified failure of {failed_id} as {category}"));

        let attempt = self.loop_count(&root_id, category);
        let available = strategies::alternatives(category).len();
        if attempt >= available {
            info!(%failed_id, %root_id, %category, attempt, "RecoveryEngine::recover: loop detected");
            outcome.action = RecoveryAction::Stop;
            outcome.loop_detected = true;
            outcome = outcome.note(format!(
                "loop detected: {root_id} failed with {category} {} times; no more strategies after {available} alternatives",
                attempt + 1
            ));
            return fail_chain(graph, failed_id, &root_id, outcome);
        }

        let strategy = strategies::select(category, attempt);
        let fix = build_fix(graph, &root, &task, category, &strategy);
        let fix_id = fix.id.clone();

        if let Err(e) = splice_fix(graph, failed_id, &root_id, fix) {
            warn!(%failed_id, %e, "RecoveryEngine::recover: could not insert fix");
            outcome.action = RecoveryAction::Stop;
            outcome = outcome.note(format!("could not insert fix task {fix_id}: {e}"));
            return fail_chain(graph, failed_id, &root_id, outcome);
        }

        let retries = root.retry_count + 1;
        outcome = outcome
            .note(format!("inserted fix task {fix_id} before {failed_id} (strategy: {strategy})"))
            .note(format!("{failed_id} now depends on {fix_id}"))
            .note(format!("reset {failed_id} to pending, retry {retries}/{} for {root_id}", self.max_retries));
        outcome.fix_task_id = Some(fix_id.clone());

        self.history.push(RecoveryAttempt {
            parent: root_id.clone(),
            category,
            fix_task_id: fix_id,
            strategy,
        });
        info!(%failed_id, %root_id, %category, retries, "RecoveryEngine::recover: fix inserted");
        outcome
    }

    /// Summarise a graph's state as an action
    pub fn assess(graph: &TaskGraph) -> RecoveryOutcome {
        debug!("RecoveryEngine::assess: called");
        let failed = graph.failed_ids();
        if !failed.is_empty() {
            return RecoveryOutcome::new(RecoveryAction::Stop).note(format!("failed tasks: {}", failed.join(", ")));
        }
        let done = graph
            .nodes()
            .iter()
            .all(|n| matches!(n.status, TaskStatus::Completed | TaskStatus::Skipped));
        if done {
            RecoveryOutcome::new(RecoveryAction::Completed)
        } else {
            RecoveryOutcome::new(RecoveryAction::Continue)
        }
    }
}

fn fail_task(graph: &mut TaskGraph, id: &str, outcome: RecoveryOutcome) -> RecoveryOutcome {
    match graph.set_status(id, TaskStatus::Failed) {
        Ok(()) => outcome.note(format!("marked {id} failed")),
        Err(e) => {
            warn!(%id, %e, "fail_task: could not mark failed");
            outcome.note(format!("could not mark {id} failed: {e}"))
        }
    }
}

/// Planned task a fix chain was inserted for; `id` itself when it is not a fix
fn root_task(graph: &TaskGraph, id: &str) -> String {
    let mut current = id.to_string();
    // bounded walk; a parent chain can never be longer than the graph
    for _ in 0..=graph.len() {
        match graph.get(&current).and_then(|n| n.fix_parent()) {
            Some(parent) => current = parent.to_string(),
            None => break,
        }
    }
    current
}

/// Fail the task that just failed and, for a fix task, the root it was fixing
fn fail_chain(graph: &mut TaskGraph, failed_id: &str, root_id: &str, outcome: RecoveryOutcome) -> RecoveryOutcome {
    let outcome = fail_task(graph, failed_id, outcome);
    if failed_id == root_id {
        return outcome;
    }
    fail_task(graph, root_id, outcome)
}

/// Next free fix id for `parent`
fn fix_id(graph: &TaskGraph, parent: &TaskNode) -> String {
    let base = format!("{}-fix-{}", parent.id, parent.retry_count + 1);
    if !graph.contains(&base) {
        return base;
    }
    let mut k = 2;
    loop {
        let candidate = format!("{base}-{k}");
        if !graph.contains(&candidate) {
            return candidate;
        }
        k += 1;
    }
}

/// Fix for `parent`, placed in front of `anchor` (the parent itself or one of its fixes)
fn build_fix(graph: &TaskGraph, parent: &TaskNode, anchor: &TaskNode, category: ErrorCategory, strategy: &str) -> TaskNode {
    let id = fix_id(graph, parent);
    let description = format!("Fix {} in {}: {}", category, parent.id, strategy);
    let kind = match parent.file_path() {
        Some(path) if !strategies::is_environmental(category) => TaskKind::Code {
            file_path: path.to_path_buf(),
            command: None,
        },
        path => TaskKind::Command {
            command: String::new(),
            file_path: path.map(|p| p.to_path_buf()),
        },
    };
    let mut fix = TaskNode::new(id, description, kind).with_dependencies(anchor.dependencies.clone());
    fix.origin = TaskOrigin::Fix {
        parent: parent.id.clone(),
        category,
        strategy: strategy.to_string(),
    };
    fix
}

/// Insert `fix` before `anchor`, make the anchor wait for it, re-arm it, and charge the root
fn splice_fix(graph: &mut TaskGraph, anchor: &str, root: &str, fix: TaskNode) -> Result<(), GraphError> {
    let fix_id = fix.id.clone();
    graph.insert_before(anchor, fix)?;
    graph.add_dependency(anchor, &fix_id)?;
    graph.set_status(anchor, TaskStatus::Pending)?;
    if let Some(node) = graph.get_mut(root) {
        node.retry_count += 1;
    }
    Ok(())
}
