//! Run outcome and report types

use serde::{Deserialize, Serialize};

use crate::domain::{RecoveryAttempt, TaskGraph};

/// Per-request state machine: Planning -> Executing -> terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    Planning,
    Executing,
    Completed,
    Stopped,
    Failed,
}

impl RequestPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

impl std::fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a run stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A task hit the retry ceiling or its fix could not be inserted
    TaskFailed,
    /// A task kept failing the same way after every alternative strategy
    LoopDetected,
    /// Pending tasks wait on upstream tasks that will never complete
    Deadlock,
    /// The wall-clock budget ran out
    GlobalTimeout,
    /// The wave limit was reached
    WaveLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskFailed => write!(f, "task failed"),
            Self::LoopDetected => write!(f, "loop detected"),
            Self::Deadlock => write!(f, "deadlock"),
            Self::GlobalTimeout => write!(f, "global timeout"),
            Self::WaveLimit => write!(f, "wave limit"),
        }
    }
}

/// User-visible result of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Stopped { reason: StopReason, failed: Vec<String> },
    Failed { error: String },
}

impl RunOutcome {
    pub fn phase(&self) -> RequestPhase {
        match self {
            Self::Completed => RequestPhase::Completed,
            Self::Stopped { .. } => RequestPhase::Stopped,
            Self::Failed { .. } => RequestPhase::Failed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Completed => "completed".to_string(),
            Self::Stopped { reason, failed } if failed.is_empty() => format!("stopped: {reason}"),
            Self::Stopped { reason, failed } => format!("stopped: {reason} ({})", failed.join(", ")),
            Self::Failed { error } => format!("failed: {error}"),
        }
    }
}

/// One scheduling round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveRecord {
    /// 1-based
    pub index: usize,
    pub tasks: Vec<String>,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Fix tasks inserted after this wave
    pub fixes: Vec<String>,
    pub checkpoint_id: Option<String>,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub request_id: String,
    pub session_id: String,
    pub outcome: RunOutcome,
    /// Final graph, fix tasks included
    pub graph: TaskGraph,
    pub waves: Vec<WaveRecord>,
    /// Human-readable log of decisions and structural changes
    pub trace: Vec<String>,
    /// Checkpoint ids created (or replayed) during the run
    pub checkpoints: Vec<String>,
    pub recoveries: Vec<RecoveryAttempt>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn phase(&self) -> RequestPhase {
        self.outcome.phase()
    }

    /// Ids of tasks in the order they were dispatched
    pub fn dispatched(&self) -> Vec<String> {
        self.waves.iter().flat_map(|w| w.tasks.iter().cloned()).collect()
    }
}
