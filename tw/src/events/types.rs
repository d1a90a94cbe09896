//! Run event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orchestrator::RequestPhase;
use crate::recovery::RecoveryAction;

/// Everything observable about a run, in emission order
///
/// Events are for observers only; the orchestrator never reads them back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    PhaseChanged {
        request_id: String,
        phase: RequestPhase,
    },
    WaveStarted {
        request_id: String,
        wave: usize,
        task_ids: Vec<String>,
    },
    CheckpointCreated {
        request_id: String,
        wave: usize,
        checkpoint_id: String,
        files: Vec<String>,
    },
    CheckpointFailed {
        request_id: String,
        wave: usize,
        error: String,
    },
    TaskStarted {
        request_id: String,
        task_id: String,
    },
    TaskCompleted {
        request_id: String,
        task_id: String,
    },
    TaskFailed {
        request_id: String,
        task_id: String,
        error: String,
    },
    RecoveryApplied {
        request_id: String,
        task_id: String,
        action: RecoveryAction,
        fix_task_id: Option<String>,
    },
    WaveCompleted {
        request_id: String,
        wave: usize,
        succeeded: usize,
        failed: usize,
    },
    RunFinished {
        request_id: String,
        summary: String,
    },
}

impl RunEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PhaseChanged { .. } => "PhaseChanged",
            Self::WaveStarted { .. } => "WaveStarted",
            Self::CheckpointCreated { .. } => "CheckpointCreated",
            Self::CheckpointFailed { .. } => "CheckpointFailed",
            Self::TaskStarted { .. } => "TaskStarted",
            Self::TaskCompleted { .. } => "TaskCompleted",
            Self::TaskFailed { .. } => "TaskFailed",
            Self::RecoveryApplied { .. } => "RecoveryApplied",
            Self::WaveCompleted { .. } => "WaveCompleted",
            Self::RunFinished { .. } => "RunFinished",
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            Self::PhaseChanged { request_id, .. }
            | Self::WaveStarted { request_id, .. }
            | Self::CheckpointCreated { request_id, .. }
            | Self::CheckpointFailed { request_id, .. }
            | Self::TaskStarted { request_id, .. }
            | Self::TaskCompleted { request_id, .. }
            | Self::TaskFailed { request_id, .. }
            | Self::RecoveryApplied { request_id, .. }
            | Self::WaveCompleted { request_id, .. }
            | Self::RunFinished { request_id, .. } => request_id,
        }
    }

    /// Last event of a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinished { .. })
    }
}

/// Timestamped wrapper written to event logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RunEvent,
}

impl EventLogEntry {
    pub fn new(event: RunEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
