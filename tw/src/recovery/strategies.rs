//! Alternative fix strategies per error category

use crate::domain::ErrorCategory;

/// Ordered alternatives; the Nth repeat of a (task, category) failure uses the Nth entry
pub fn alternatives(category: ErrorCategory) -> &'static [&'static str] {
    match category {
        ErrorCategory::MissingDependencies => &[
            "install the missing package with the project's package manager",
            "declare the dependency in the project manifest and reinstall",
            "replace the import with an equivalent available package",
        ],
        ErrorCategory::SyntaxError => &[
            "fix the syntax at the reported location",
            "rewrite the affected block from scratch",
        ],
        ErrorCategory::UndefinedVariable => &[
            "declare or import the missing name",
            "correct the misspelled identifier",
            "move the definition above its first use",
        ],
        ErrorCategory::TypeMismatch => &[
            "convert the value to the expected type",
            "change the declared type to match its usage",
        ],
        ErrorCategory::PerformanceIssue => &[
            "optimise the slow code path",
            "split the work into smaller steps",
        ],
        ErrorCategory::PermissionIssue => &[
            "fix permissions on the target path",
            "write to a location the process owns",
        ],
        ErrorCategory::MissingFile => &[
            "create the missing file",
            "correct the path to point at an existing file",
        ],
        ErrorCategory::GeneralError => &[
            "inspect the output and apply a targeted fix",
            "retry with a simplified approach",
        ],
    }
}

/// Strategy for the `attempt`-th repeat, or a generic description past the list
pub fn select(category: ErrorCategory, attempt: usize) -> String {
    alternatives(category)
        .get(attempt)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("apply a generic fix for the {category}"))
}

/// Whether fixes for this category are environment commands rather than code edits
pub fn is_environmental(category: ErrorCategory) -> bool {
    matches!(
        category,
        ErrorCategory::MissingDependencies | ErrorCategory::PermissionIssue
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_has_two_or_three() {
        for category in ErrorCategory::ALL {
            let n = alternatives(category).len();
            assert!((2..=3).contains(&n), "{category} has {n}");
        }
    }

    #[test]
    fn test_select_is_positional() {
        assert_eq!(select(ErrorCategory::SyntaxError, 0), "fix the syntax at the reported location");
        assert_eq!(select(ErrorCategory::SyntaxError, 1), "rewrite the affected block from scratch");
        assert_eq!(select(ErrorCategory::SyntaxError, 2), "apply a generic fix for the syntax error");
    }
}
