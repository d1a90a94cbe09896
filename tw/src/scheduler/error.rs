//! Scheduling error types

use thiserror::Error;

/// Structural and scheduling failures; none of these are retried
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The dependency graph has no valid order
    #[error("Dependency cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// A dependency names a task that does not exist
    #[error("Task {task} depends on unknown task {dependency}")]
    MissingDependency { task: String, dependency: String },

    /// Pending tasks remain but none can become ready
    #[error("Deadlock: {blocked:?} cannot run, upstream {failed_upstream:?} will never complete")]
    Deadlock {
        blocked: Vec<String>,
        failed_upstream: Vec<String>,
    },
}

impl ScheduleError {
    /// Construction-time errors as opposed to scheduling-time ones
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::Deadlock { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_shows_path() {
        let err = ScheduleError::Cycle {
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Dependency cycle: a -> b -> a");
        assert!(err.is_structural());
    }

    #[test]
    fn test_deadlock_is_not_structural() {
        let err = ScheduleError::Deadlock {
            blocked: vec!["b".to_string()],
            failed_upstream: vec!["a".to_string()],
        };
        assert!(!err.is_structural());
        assert!(err.to_string().contains("\"a\""));
    }
}
