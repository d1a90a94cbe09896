//! Topological ordering and structural validation

use std::collections::HashMap;
use tracing::debug;

use super::error::ScheduleError;
use crate::domain::TaskGraph;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Order every task so that each appears after all of its in-graph dependencies
///
/// Nodes are visited in insertion order, so the result is deterministic and
/// stable for an unchanged graph. Dependencies naming tasks outside the graph
/// are treated as external and skipped. A back edge yields `Cycle` with the
/// path from the first repeated node back to itself.
pub fn topological_order(graph: &TaskGraph) -> Result<Vec<String>, ScheduleError> {
    debug!(count = graph.len(), "topological_order: called");
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(graph.len());
    let mut stack: Vec<&str> = Vec::new();
    let mut order = Vec::with_capacity(graph.len());

    for node in graph.nodes() {
        visit(graph, &node.id, &mut marks, &mut stack, &mut order)?;
    }

    debug!(len = order.len(), "topological_order: complete");
    Ok(order)
}

fn visit<'a>(
    graph: &'a TaskGraph,
    id: &'a str,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> Result<(), ScheduleError> {
    match marks.get(id) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|s| *s == id).unwrap_or(0);
            let mut path: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
            path.push(id.to_string());
            debug!(?path, "visit: back edge - cycle detected");
            return Err(ScheduleError::Cycle { path });
        }
        None => {}
    }

    let Some(node) = graph.get(id) else {
        debug!(%id, "visit: external dependency, skipping");
        return Ok(());
    };

    marks.insert(id, Mark::Visiting);
    stack.push(id);
    for dep in &node.dependencies {
        if graph.contains(dep) {
            visit(graph, dep, marks, stack, order)?;
        }
    }
    stack.pop();
    marks.insert(id, Mark::Done);
    order.push(id.to_string());
    Ok(())
}

/// Check that the graph is acyclic and, unless `allow_external`, that every
/// dependency names a task in the graph
pub fn validate_structure(graph: &TaskGraph, allow_external: bool) -> Result<(), ScheduleError> {
    debug!(allow_external, "validate_structure: called");
    topological_order(graph)?;
    if allow_external {
        return Ok(());
    }
    for node in graph.nodes() {
        if let Some(dep) = node.dependencies.iter().find(|d| !graph.contains(d)) {
            debug!(task = %node.id, %dep, "validate_structure: missing dependency");
            return Err(ScheduleError::MissingDependency {
                task: node.id.clone(),
                dependency: dep.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskNode;

    fn node(id: &str, deps: &[&str]) -> TaskNode {
        TaskNode::new_command(id, id, "true").with_dependencies(deps.iter().copied())
    }

    fn unchecked(nodes: Vec<TaskNode>) -> TaskGraph {
        TaskGraph::from(nodes)
    }

    #[test]
    fn test_order_respects_dependencies() {
        let graph = unchecked(vec![node("c", &["b"]), node("b", &["a"]), node("a", &[])]);
        let order = topological_order(&graph).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_order_is_stable_for_independent_tasks() {
        let graph = unchecked(vec![node("x", &[]), node("y", &[]), node("z", &[])]);
        assert_eq!(topological_order(&graph).unwrap(), vec!["x", "y", "z"]);
        assert_eq!(topological_order(&graph).unwrap(), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_cycle_detection_two_nodes() {
        let graph = unchecked(vec![node("a", &["b"]), node("b", &["a"])]);
        match topological_order(&graph) {
            Err(ScheduleError::Cycle { path }) => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"a".to_string()));
                assert!(path.contains(&"b".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_detection_self_loop() {
        let graph = unchecked(vec![node("a", &["a"])]);
        assert_eq!(
            topological_order(&graph),
            Err(ScheduleError::Cycle {
                path: vec!["a".to_string(), "a".to_string()]
            })
        );
    }

    #[test]
    fn test_cycle_path_excludes_entry_prefix() {
        let graph = unchecked(vec![node("root", &["a"]), node("a", &["b"]), node("b", &["a"])]);
        let Err(ScheduleError::Cycle { path }) = topological_order(&graph) else {
            panic!("expected cycle");
        };
        assert_eq!(path, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_external_dependencies_are_skipped() {
        let graph = unchecked(vec![node("a", &["outside"]), node("b", &["a"])]);
        assert_eq!(topological_order(&graph).unwrap(), vec!["a", "b"]);
        assert!(validate_structure(&graph, true).is_ok());
        assert_eq!(
            validate_structure(&graph, false),
            Err(ScheduleError::MissingDependency {
                task: "a".to_string(),
                dependency: "outside".to_string(),
            })
        );
    }

    #[test]
    fn test_validate_reports_cycle_before_missing() {
        let graph = unchecked(vec![node("a", &["b", "ghost"]), node("b", &["a"])]);
        assert!(matches!(
            validate_structure(&graph, false),
            Err(ScheduleError::Cycle { .. })
        ));
    }

    #[test]
    fn test_empty_graph_orders_to_nothing() {
        assert!(topological_order(&TaskGraph::new()).unwrap().is_empty());
    }
}
