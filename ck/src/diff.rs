//! Line-based unified diff

use std::fmt::Write;
use tracing::debug;

/// Context lines around each hunk
pub const DEFAULT_CONTEXT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal(usize, usize),
    Delete(usize),
    Insert(usize),
}

impl Op {
    fn is_change(&self) -> bool {
        !matches!(self, Op::Equal(..))
    }
}

/// Largest LCS table (cells) built for the differing middle of two files
pub const MAX_LCS_CELLS: usize = 4_000_000;

/// Edit script between two line lists
///
/// Common leading and trailing lines are matched directly. The differing
/// middle gets a longest-common-subsequence alignment when its table fits in
/// [`MAX_LCS_CELLS`]; past that it is reported as a block replacement.
fn edit_script(old: &[&str], new: &[&str]) -> Vec<Op> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let (old_end, new_end) = (old.len() - suffix, new.len() - suffix);

    let mut ops = Vec::with_capacity(old.len() + new.len());
    ops.extend((0..prefix).map(|i| Op::Equal(i, i)));
    middle_script(old, new, prefix, old_end, prefix, new_end, &mut ops);
    ops.extend((0..suffix).map(|k| Op::Equal(old_end + k, new_end + k)));
    ops
}

fn middle_script(old: &[&str], new: &[&str], i0: usize, i1: usize, j0: usize, j1: usize, ops: &mut Vec<Op>) {
    let (n, m) = (i1 - i0, j1 - j0);
    let cells = (n + 1).saturating_mul(m + 1);
    if n == 0 || m == 0 || cells > MAX_LCS_CELLS {
        if cells > MAX_LCS_CELLS {
            debug!(n, m, "middle_script: too large for alignment, replacing block");
        }
        ops.extend((i0..i1).map(Op::Delete));
        ops.extend((j0..j1).map(Op::Insert));
        return;
    }

    // lcs[i * (m + 1) + j] = LCS length of old[i0 + i..i1] and new[j0 + j..j1]
    let width = m + 1;
    let mut lcs = vec![0u32; cells];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if old[i0 + i] == new[j0 + j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i0 + i] == new[j0 + j] {
            ops.push(Op::Equal(i0 + i, j0 + j));
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            ops.push(Op::Delete(i0 + i));
            i += 1;
        } else {
            ops.push(Op::Insert(j0 + j));
            j += 1;
        }
    }
    ops.extend((i0 + i..i1).map(Op::Delete));
    ops.extend((j0 + j..j1).map(Op::Insert));
}

/// Group change positions into hunk ranges over the op list
fn hunk_ranges(ops: &[Op], context: usize) -> Vec<(usize, usize)> {
    let changes: Vec<usize> = ops.iter().enumerate().filter(|(_, op)| op.is_change()).map(|(i, _)| i).collect();
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for idx in changes {
        let start = idx.saturating_sub(context);
        let end = (idx + context + 1).min(ops.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => ranges.push((start, end)),
        }
    }
    ranges
}

/// Render a unified-style diff; returns an empty string when the inputs match
pub fn unified_diff(old: &str, new: &str, old_label: &str, new_label: &str, context: usize) -> String {
    if old == new {
        return String::new();
    }
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let ops = edit_script(&old_lines, &new_lines);

    let mut out = String::new();
    let _ = writeln!(out, "--- {}", old_label);
    let _ = writeln!(out, "+++ {}", new_label);

    for (start, end) in hunk_ranges(&ops, context) {
        // Lines consumed before the hunk on each side
        let old_before = ops[..start].iter().filter(|op| !matches!(op, Op::Insert(_))).count();
        let new_before = ops[..start].iter().filter(|op| !matches!(op, Op::Delete(_))).count();
        let hunk = &ops[start..end];
        let old_count = hunk.iter().filter(|op| !matches!(op, Op::Insert(_))).count();
        let new_count = hunk.iter().filter(|op| !matches!(op, Op::Delete(_))).count();
        let old_start = if old_count == 0 { old_before } else { old_before + 1 };
        let new_start = if new_count == 0 { new_before } else { new_before + 1 };

        let _ = writeln!(out, "@@ -{},{} +{},{} @@", old_start, old_count, new_start, new_count);
        for op in hunk {
            let _ = match *op {
                Op::Equal(i, _) => writeln!(out, " {}", old_lines[i]),
                Op::Delete(i) => writeln!(out, "-{}", old_lines[i]),
                Op::Insert(j) => writeln!(out, "+{}", new_lines[j]),
            };
        }
    }

    // Trailing-newline-only differences produce no line ops
    if out.lines().count() == 2 {
        let _ = writeln!(out, "@@ trailing newline differs @@");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_inputs_produce_empty_diff() {
        assert!(unified_diff("a\nb\n", "a\nb\n", "old", "new", DEFAULT_CONTEXT).is_empty());
    }

    #[test]
    fn test_single_line_change() {
        let diff = unified_diff("hello\n", "world\n", "checkpoint/f", "current/f", DEFAULT_CONTEXT);
        assert!(diff.starts_with("--- checkpoint/f\n+++ current/f\n"));
        assert!(diff.contains("@@ -1,1 +1,1 @@"));
        assert!(diff.contains("-hello\n"));
        assert!(diff.contains("+world\n"));
    }

    #[test]
    fn test_context_lines_are_limited() {
        let old: String = (1..=20).map(|i| format!("line{}\n", i)).collect();
        let new = old.replace("line10\n", "changed\n");
        let diff = unified_diff(&old, &new, "a", "b", 3);

        assert!(diff.contains("@@ -7,7 +7,7 @@"));
        assert!(diff.contains(" line7\n"));
        assert!(!diff.contains(" line6\n"));
        assert!(diff.contains(" line13\n"));
        assert!(!diff.contains(" line14\n"));
    }

    #[test]
    fn test_distant_changes_make_two_hunks() {
        let old: String = (1..=30).map(|i| format!("l{}\n", i)).collect();
        let new = old.replace("l2\n", "x\n").replace("l28\n", "y\n");
        let diff = unified_diff(&old, &new, "a", "b", 3);
        assert_eq!(diff.matches("@@ -").count(), 2);
    }

    #[test]
    fn test_large_files_with_one_change() {
        let old: String = (0..20_000).map(|i| format!("dep-{}\n", i)).collect();
        let new = old.replace("dep-10000\n", "dep-10000 updated\n");
        let diff = unified_diff(&old, &new, "a", "b", 3);

        assert_eq!(diff.matches("@@ -").count(), 1);
        assert!(diff.contains("@@ -9998,7 +9998,7 @@"));
        assert!(diff.contains("-dep-10000\n+dep-10000 updated\n"));
    }

    #[test]
    fn test_large_rewrite_falls_back_to_block_replacement() {
        let old: String = (0..20_000).map(|i| format!("old-{}\n", i)).collect();
        let new: String = (0..20_000).map(|i| format!("new-{}\n", i)).collect();
        let diff = unified_diff(&old, &new, "a", "b", 3);

        assert!(diff.contains("@@ -1,20000 +1,20000 @@"));
        assert_eq!(diff.lines().filter(|l| l.starts_with('-') && !l.starts_with("---")).count(), 20_000);
        assert_eq!(diff.lines().filter(|l| l.starts_with('+') && !l.starts_with("+++")).count(), 20_000);
    }

    #[test]
    fn test_against_empty_file() {
        let diff = unified_diff("a\nb\n", "", "a", "b", 3);
        assert!(diff.contains("@@ -1,2 +0,0 @@"));
        assert!(diff.contains("-a\n-b\n"));
    }
}
