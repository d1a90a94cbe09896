//! Task executor capability
//!
//! The orchestrator never performs a task's effect itself; it hands each ready
//! task to a [`TaskExecutor`] and only looks at the returned [`ExecutionResult`].

mod shell;

pub use shell::ShellExecutor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TaskNode;

/// A ranked recovery suggestion from the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorHint {
    /// Free-form strategy name, e.g. "install missing dependency"
    pub strategy_name: String,
    /// 0.0 to 1.0
    pub confidence: f64,
}

impl ErrorHint {
    pub fn new(strategy_name: impl Into<String>, confidence: f64) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            confidence,
        }
    }
}

/// Outcome of one task execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// Result text on success, error text on failure
    pub output: String,
    #[serde(default)]
    pub error_hints: Vec<ErrorHint>,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error_hints: Vec::new(),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error_hints: Vec::new(),
        }
    }

    pub fn with_hint(mut self, hint: ErrorHint) -> Self {
        self.error_hints.push(hint);
        self
    }
}

/// Executor-side failures that prevented a task from running at all
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("No executor for capability {0}")]
    UnsupportedCapability(String),

    #[error("Executor unavailable: {0}")]
    Unavailable(String),
}

/// Performs a task's real-world effect
///
/// Implementations must be safe to call concurrently for different tasks of
/// the same wave.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &TaskNode) -> Result<ExecutionResult, ExecutorError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// Scripted executor for unit tests
    ///
    /// Each task id maps to a queue of results consumed in order; once a queue
    /// is drained (or for unknown ids) the task succeeds.
    #[derive(Default)]
    pub struct MockExecutor {
        scripts: Mutex<HashMap<String, Vec<ExecutionResult>>>,
        calls: Mutex<Vec<String>>,
        call_count: AtomicUsize,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue results for a task id
        pub fn script(self, id: &str, results: Vec<ExecutionResult>) -> Self {
            debug!(%id, count = results.len(), "MockExecutor::script: called");
            if let Ok(mut scripts) = self.scripts.lock() {
                scripts.insert(id.to_string(), results);
            }
            self
        }

        /// Fail `id` with the same text `times` times
        pub fn fail_times(self, id: &str, text: &str, times: usize) -> Self {
            self.script(id, vec![ExecutionResult::failure(text); times])
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Task ids in call order
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl TaskExecutor for MockExecutor {
        async fn execute(&self, task: &TaskNode) -> Result<ExecutionResult, ExecutorError> {
            debug!(id = %task.id, "MockExecutor::execute: called");
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(task.id.clone());
            }
            let next = self.scripts.lock().ok().and_then(|mut scripts| {
                let queue = scripts.get_mut(&task.id)?;
                if queue.is_empty() { None } else { Some(queue.remove(0)) }
            });
            Ok(next.unwrap_or_else(|| ExecutionResult::success(format!("{} done", task.id))))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_executor_consumes_script() {
            let exec = MockExecutor::new().fail_times("a", "boom", 2);
            let task = TaskNode::new_command("a", "a", "true");

            assert!(!exec.execute(&task).await.unwrap().success);
            assert!(!exec.execute(&task).await.unwrap().success);
            assert!(exec.execute(&task).await.unwrap().success);
            assert_eq!(exec.call_count(), 3);
            assert_eq!(exec.calls(), vec!["a", "a", "a"]);
        }
    }
}
