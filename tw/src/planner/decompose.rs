//! Bounded decomposition of coarse tasks into sub-graphs
//!
//! Runs to completion before scheduling starts. Each round asks the
//! decomposer about every node produced by the previous round; a node it
//! declines to split is atomic. Rounds stop at `max_depth`.

use async_trait::async_trait;
use tracing::{debug, info};

use super::ingest::{IngestOptions, ingest_nodes};
use super::{PlannedTask, PlannerError};
use crate::domain::{TaskGraph, TaskNode, TaskStatus};

/// Default number of decomposition rounds
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Splits a task into smaller ones, or declines
#[async_trait]
pub trait Decomposer: Send + Sync {
    /// `Ok(None)` (or an empty list) marks the task atomic
    async fn decompose(&self, task: &TaskNode) -> Result<Option<Vec<PlannedTask>>, PlannerError>;
}

/// Expand `graph` breadth-first, at most `max_depth` rounds deep
///
/// Sub-tasks without ids are named `{parent}-part-{n}`. Sub-task dependencies
/// may name siblings or any task already in the graph.
pub async fn decompose_graph(
    mut graph: TaskGraph,
    decomposer: &dyn Decomposer,
    max_depth: usize,
) -> Result<TaskGraph, PlannerError> {
    debug!(count = graph.len(), max_depth, "decompose_graph: called");
    let mut frontier: Vec<String> = graph.pending_ids();

    for depth in 0..max_depth {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for id in frontier {
            let Some(node) = graph.get(&id).filter(|n| n.status == TaskStatus::Pending).cloned() else {
                continue;
            };
            let Some(records) = decomposer.decompose(&node).await?.filter(|r| !r.is_empty()) else {
                debug!(%id, depth, "decompose_graph: atomic");
                continue;
            };

            let options = IngestOptions {
                allow_external: true,
                id_prefix: format!("{id}-part"),
            };
            let subtasks = ingest_nodes(&records, &options)?;
            let sub_ids: Vec<String> = subtasks.iter().map(|s| s.id.clone()).collect();
            graph.expand_node(&id, subtasks)?;
            info!(%id, depth, parts = sub_ids.len(), "decompose_graph: expanded");
            next.extend(sub_ids);
        }
        frontier = next;
    }

    if !frontier.is_empty() {
        debug!(count = frontier.len(), "decompose_graph: depth limit reached, keeping tasks as-is");
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Splits any task whose id is a key, counting calls
    struct TableDecomposer {
        table: HashMap<String, Vec<PlannedTask>>,
        calls: AtomicUsize,
    }

    impl TableDecomposer {
        fn new(entries: Vec<(&str, Vec<PlannedTask>)>) -> Self {
            Self {
                table: entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Decomposer for TableDecomposer {
        async fn decompose(&self, task: &TaskNode) -> Result<Option<Vec<PlannedTask>>, PlannerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.table.get(&task.id).cloned())
        }
    }

    /// Always splits into one more level
    struct Endless;

    #[async_trait]
    impl Decomposer for Endless {
        async fn decompose(&self, task: &TaskNode) -> Result<Option<Vec<PlannedTask>>, PlannerError> {
            Ok(Some(vec![PlannedTask::new(format!("{}.x", task.id), "deeper").with_command("true")]))
        }
    }

    fn base() -> TaskGraph {
        TaskGraph::from_nodes(vec![
            TaskNode::new_command("setup", "setup", "true"),
            TaskNode::new_command("build", "build", "true").with_dependencies(["setup"]),
            TaskNode::new_command("ship", "ship", "true").with_dependencies(["build"]),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_decompose_splices_sub_graph() {
        let decomposer = TableDecomposer::new(vec![(
            "build",
            vec![
                PlannedTask::new("compile", "compile").with_command("make"),
                PlannedTask::new("link", "link").with_command("ld").with_deps(["compile"]),
            ],
        )]);

        let graph = decompose_graph(base(), &decomposer, DEFAULT_MAX_DEPTH).await.unwrap();

        assert_eq!(graph.ids(), vec!["setup", "compile", "link", "ship"]);
        assert_eq!(graph.get("compile").unwrap().dependencies, vec!["setup"]);
        assert_eq!(graph.get("link").unwrap().dependencies, vec!["compile"]);
        assert_eq!(graph.get("ship").unwrap().dependencies, vec!["link"]);
        assert!(!graph.contains("build"));
    }

    #[tokio::test]
    async fn test_decompose_names_unnamed_parts() {
        let decomposer = TableDecomposer::new(vec![(
            "ship",
            vec![
                PlannedTask::default().with_command("tar czf out.tgz ."),
                PlannedTask::default().with_command("scp out.tgz host:"),
            ],
        )]);
        let graph = decompose_graph(base(), &decomposer, 1).await.unwrap();
        assert!(graph.contains("ship-part-1"));
        assert!(graph.contains("ship-part-2"));
    }

    #[tokio::test]
    async fn test_decompose_stops_at_max_depth() {
        let graph = TaskGraph::from_nodes(vec![TaskNode::new_command("a", "a", "true")]).unwrap();
        let graph = decompose_graph(graph, &Endless, 2).await.unwrap();
        assert_eq!(graph.ids(), vec!["a.x.x"]);
    }

    #[tokio::test]
    async fn test_zero_depth_is_noop() {
        let decomposer = TableDecomposer::new(vec![]);
        let graph = decompose_graph(base(), &decomposer, 0).await.unwrap();
        assert_eq!(graph.ids(), base().ids());
        assert_eq!(decomposer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_atomic_tasks_asked_once() {
        let decomposer = TableDecomposer::new(vec![]);
        decompose_graph(base(), &decomposer, DEFAULT_MAX_DEPTH).await.unwrap();
        assert_eq!(decomposer.calls.load(Ordering::SeqCst), 3);
    }
}
