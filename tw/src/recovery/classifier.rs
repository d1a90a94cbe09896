//! Error text classification
//!
//! Best-effort pattern matching. The first category whose pattern matches
//! wins; there is no confidence scoring between categories.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::domain::ErrorCategory;
use crate::executor::ErrorHint;

/// Error-text patterns, in classification order
const ERROR_PATTERNS: &[(ErrorCategory, &str)] = &[
    (
        ErrorCategory::MissingDependencies,
        r"(?i)(no module named|modulenotfounderror|cannot find module|module not found|could not resolve|unresolved import|can't find crate|package .+ not found|no matching package|command not found|not installed|missing dependenc)",
    ),
    (
        ErrorCategory::SyntaxError,
        r"(?i)(syntax ?error|invalid syntax|unexpected token|unexpected (end|eof)|parse error|unterminated|expected .+, found)",
    ),
    (
        ErrorCategory::UndefinedVariable,
        r"(?i)(is not defined|undefined variable|referenceerror|nameerror|cannot find value|not found in this scope|undeclared identifier)",
    ),
    (
        ErrorCategory::TypeMismatch,
        r"(?i)(type ?error|mismatched types|type mismatch|is not assignable to|incompatible types|cannot convert)",
    ),
    (
        ErrorCategory::PerformanceIssue,
        r"(?i)(timed out|timeout|out of memory|stack overflow|heap limit|deadline exceeded|too slow)",
    ),
    (
        ErrorCategory::PermissionIssue,
        r"(?i)(permission denied|eacces|eperm|access denied|operation not permitted|read-only file system)",
    ),
    (
        ErrorCategory::MissingFile,
        r"(?i)(no such file|enoent|file not found|does not exist|cannot open)",
    ),
];

/// Keywords that map a free-form executor hint onto a category
const HINT_PATTERNS: &[(ErrorCategory, &str)] = &[
    (ErrorCategory::MissingDependencies, r"(?i)(install|dependenc|package|import)"),
    (ErrorCategory::SyntaxError, r"(?i)syntax"),
    (ErrorCategory::UndefinedVariable, r"(?i)(undefined|declare|variable)"),
    (ErrorCategory::TypeMismatch, r"(?i)\btypes?\b"),
    (ErrorCategory::PerformanceIssue, r"(?i)(optimi[sz]e|performance|timeout|slow)"),
    (ErrorCategory::PermissionIssue, r"(?i)(permission|chmod|access)"),
    (ErrorCategory::MissingFile, r"(?i)(create .*file|missing file|path)"),
];

fn compile(table: &[(ErrorCategory, &str)]) -> Vec<(ErrorCategory, Regex)> {
    table
        .iter()
        .filter_map(|(category, pattern)| match Regex::new(pattern) {
            Ok(re) => Some((*category, re)),
            Err(e) => {
                warn!(%category, %e, "compile: dropping invalid pattern");
                None
            }
        })
        .collect()
}

static ERROR_RULES: LazyLock<Vec<(ErrorCategory, Regex)>> = LazyLock::new(|| compile(ERROR_PATTERNS));
static HINT_RULES: LazyLock<Vec<(ErrorCategory, Regex)>> = LazyLock::new(|| compile(HINT_PATTERNS));

fn first_match(rules: &[(ErrorCategory, Regex)], text: &str) -> Option<ErrorCategory> {
    rules.iter().find(|(_, re)| re.is_match(text)).map(|(category, _)| *category)
}

/// Classify raw error text
pub fn classify(text: &str) -> ErrorCategory {
    debug!(len = text.len(), "classify: called");
    first_match(&ERROR_RULES, text).unwrap_or(ErrorCategory::GeneralError)
}

/// Classify error text, consulting executor hints when the text is inconclusive
///
/// Hints are only used when the text alone yields `general error`; they are
/// tried in descending confidence order and the first specific match wins.
pub fn classify_with_hints(text: &str, hints: &[ErrorHint]) -> ErrorCategory {
    debug!(hints = hints.len(), "classify_with_hints: called");
    let category = classify(text);
    if category != ErrorCategory::GeneralError || hints.is_empty() {
        return category;
    }

    let mut ranked: Vec<&ErrorHint> = hints.iter().collect();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    for hint in ranked {
        if let Some(category) = first_match(&HINT_RULES, &hint.strategy_name) {
            debug!(hint = %hint.strategy_name, %category, "classify_with_hints: hint matched");
            return category;
        }
    }
    ErrorCategory::GeneralError
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(ERROR_RULES.len(), ERROR_PATTERNS.len());
        assert_eq!(HINT_RULES.len(), HINT_PATTERNS.len());
    }

    #[test]
    fn test_classify_each_category() {
        let cases = [
            ("ModuleNotFoundError: No module named 'requests'", ErrorCategory::MissingDependencies),
            ("sh: 1: jq: command not found", ErrorCategory::MissingDependencies),
            ("SyntaxError: Unexpected token '}'", ErrorCategory::SyntaxError),
            ("error: expected `;`, found `let`", ErrorCategory::SyntaxError),
            ("ReferenceError: foo is not defined", ErrorCategory::UndefinedVariable),
            ("error[E0425]: cannot find value `x` in this scope", ErrorCategory::UndefinedVariable),
            ("error[E0308]: mismatched types", ErrorCategory::TypeMismatch),
            ("operation timed out after 30s", ErrorCategory::PerformanceIssue),
            ("EACCES: permission denied, open '/etc/x'", ErrorCategory::PermissionIssue),
            ("cat: config.yml: No such file or directory", ErrorCategory::MissingFile),
            ("something odd happened", ErrorCategory::GeneralError),
        ];
        for (text, expected) in cases {
            assert_eq!(classify(text), expected, "text: {text}");
        }
    }

    #[test]
    fn test_first_match_wins() {
        // both a missing module and a missing file; dependencies come first
        let text = "Error: Cannot find module './util'\nENOENT: no such file or directory";
        assert_eq!(classify(text), ErrorCategory::MissingDependencies);
    }

    #[test]
    fn test_hints_ignored_when_text_is_specific() {
        let hints = vec![ErrorHint::new("fix permission", 0.99)];
        assert_eq!(
            classify_with_hints("SyntaxError: invalid syntax", &hints),
            ErrorCategory::SyntaxError
        );
    }

    #[test]
    fn test_hints_used_by_confidence() {
        let hints = vec![
            ErrorHint::new("fix syntax", 0.4),
            ErrorHint::new("install missing dependency", 0.9),
        ];
        assert_eq!(
            classify_with_hints("exit status 1", &hints),
            ErrorCategory::MissingDependencies
        );
    }

    #[test]
    fn test_unmatched_hints_stay_general() {
        let hints = vec![ErrorHint::new("try again", 0.5)];
        assert_eq!(classify_with_hints("exit status 1", &hints), ErrorCategory::GeneralError);
    }
}
