//! Error categories used to classify task failures

use serde::{Deserialize, Serialize};

/// Failure category inferred from error text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    MissingDependencies,
    SyntaxError,
    UndefinedVariable,
    TypeMismatch,
    PerformanceIssue,
    PermissionIssue,
    MissingFile,
    GeneralError,
}

impl ErrorCategory {
    /// Every category in classification order
    pub const ALL: [ErrorCategory; 8] = [
        Self::MissingDependencies,
        Self::SyntaxError,
        Self::UndefinedVariable,
        Self::TypeMismatch,
        Self::PerformanceIssue,
        Self::PermissionIssue,
        Self::MissingFile,
        Self::GeneralError,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingDependencies => "missing dependencies",
            Self::SyntaxError => "syntax error",
            Self::UndefinedVariable => "undefined variable",
            Self::TypeMismatch => "type mismatch",
            Self::PerformanceIssue => "performance issue",
            Self::PermissionIssue => "permission issue",
            Self::MissingFile => "missing file",
            Self::GeneralError => "general error",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
