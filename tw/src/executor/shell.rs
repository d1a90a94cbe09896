//! ShellExecutor - run a task's command and validation through the shell

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ErrorHint, ExecutionResult, ExecutorError, TaskExecutor};
use crate::config::ExecutorConfig;
use crate::domain::TaskNode;

/// Exit status the shell uses for an unknown command
const EXIT_NOT_FOUND: i32 = 127;
/// Exit status the shell uses for a command it may not execute
const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Runs `command` then `validation_command` via `<shell> -c`
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    timeout: Duration,
    working_dir: Option<PathBuf>,
    max_output_chars: usize,
}

enum StepOutcome {
    Passed(String),
    Failed(ExecutionResult),
}

impl ShellExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        debug!(?config, "ShellExecutor::new: called");
        Self {
            shell: config.shell.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            working_dir: config.working_dir.clone(),
            max_output_chars: config.max_output_chars,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    async fn run_step(&self, label: &str, command: &str) -> Result<StepOutcome, ExecutorError> {
        debug!(%label, %command, "ShellExecutor::run_step: called");
        let mut cmd = tokio::process::Command::new(&self.shell);
        cmd.arg("-c").arg(command).kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(%e, "ShellExecutor::run_step: spawn failed");
                return Err(ExecutorError::Spawn(e));
            }
            Err(_) => {
                debug!("ShellExecutor::run_step: timed out");
                let result = ExecutionResult::failure(format!(
                    "{label} timed out after {}ms: {command}",
                    self.timeout.as_millis()
                ))
                .with_hint(ErrorHint::new("optimise the slow step or raise the timeout", 0.6));
                return Ok(StepOutcome::Failed(result));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = if stdout.is_empty() {
            stderr.to_string()
        } else if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\n\nSTDERR:\n{}", stdout, stderr)
        };
        let text = self.truncate(combined);

        if output.status.success() {
            debug!(%label, "ShellExecutor::run_step: succeeded");
            return Ok(StepOutcome::Passed(text));
        }

        let code = output.status.code().unwrap_or(-1);
        debug!(%label, code, "ShellExecutor::run_step: failed");
        let mut result = ExecutionResult::failure(format!("{label} failed with exit code {code}\n{text}"));
        match code {
            EXIT_NOT_FOUND => result = result.with_hint(ErrorHint::new("install missing dependency", 0.7)),
            EXIT_NOT_EXECUTABLE => result = result.with_hint(ErrorHint::new("fix permission on the target", 0.7)),
            _ => {}
        }
        Ok(StepOutcome::Failed(result))
    }

    fn truncate(&self, text: String) -> String {
        let total = text.chars().count();
        if total <= self.max_output_chars {
            return text;
        }
        let head: String = text.chars().take(self.max_output_chars).collect();
        format!("{head}...\n[truncated, {total} chars total]")
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(&ExecutorConfig::default())
    }
}

#[async_trait]
impl TaskExecutor for ShellExecutor {
    async fn execute(&self, task: &TaskNode) -> Result<ExecutionResult, ExecutorError> {
        debug!(id = %task.id, kind = task.kind.name(), "ShellExecutor::execute: called");
        let steps: Vec<(&str, &str)> = [("command", task.command()), ("validation", task.validation_command.as_deref())]
            .into_iter()
            .filter_map(|(label, cmd)| cmd.filter(|c| !c.trim().is_empty()).map(|c| (label, c)))
            .collect();

        if steps.is_empty() {
            warn!(id = %task.id, "ShellExecutor::execute: nothing to run");
            return Ok(ExecutionResult::success(format!("{}: nothing to run", task.id)));
        }

        let mut outputs = Vec::new();
        for (label, command) in steps {
            match self.run_step(label, command).await? {
                StepOutcome::Passed(text) => outputs.push(text),
                StepOutcome::Failed(result) => return Ok(result),
            }
        }
        Ok(ExecutionResult::success(outputs.join("\n")))
    }
}
