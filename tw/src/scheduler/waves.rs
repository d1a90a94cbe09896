//! Ready-set computation and wave planning

use std::collections::{HashSet, VecDeque};
use tracing::debug;

use super::error::ScheduleError;
use super::order::topological_order;
use crate::domain::{TaskGraph, TaskNode, TaskStatus};

fn satisfied(graph: &TaskGraph, completed: &HashSet<String>, dep: &str) -> bool {
    completed.contains(dep) || !graph.contains(dep)
}

/// Pending tasks whose dependencies are all in `completed`, in graph order
///
/// Dependencies that name no task in the graph count as satisfied external state.
pub fn ready_tasks<'a>(graph: &'a TaskGraph, completed: &HashSet<String>) -> Vec<&'a TaskNode> {
    debug!(completed = completed.len(), "ready_tasks: called");
    graph
        .nodes()
        .iter()
        .filter(|n| n.status == TaskStatus::Pending)
        .filter(|n| n.dependencies.iter().all(|d| satisfied(graph, completed, d)))
        .collect()
}

/// Ids of the next wave to dispatch
///
/// `Ok(None)` when nothing is pending. When pending tasks remain but none is
/// ready, returns `Deadlock` naming the blocked tasks and the non-completing
/// upstream tasks responsible.
pub fn next_wave(graph: &TaskGraph, completed: &HashSet<String>) -> Result<Option<Vec<String>>, ScheduleError> {
    debug!("next_wave: called");
    let pending = graph.pending_ids();
    if pending.is_empty() {
        debug!("next_wave: nothing pending");
        return Ok(None);
    }

    let ready: Vec<String> = ready_tasks(graph, completed).into_iter().map(|n| n.id.clone()).collect();
    if !ready.is_empty() {
        debug!(?ready, "next_wave: wave ready");
        return Ok(Some(ready));
    }

    let failed_upstream = blocking_upstream(graph, completed, &pending);
    debug!(?pending, ?failed_upstream, "next_wave: deadlock");
    Err(ScheduleError::Deadlock {
        blocked: pending,
        failed_upstream,
    })
}

/// Walk unsatisfied dependencies from the blocked tasks and collect the ones
/// that will never complete (failed, skipped, stuck in progress)
fn blocking_upstream(graph: &TaskGraph, completed: &HashSet<String>, blocked: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = blocked.iter().map(String::as_str).collect();
    let mut culprits: HashSet<&str> = HashSet::new();

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let Some(node) = graph.get(id) else {
            continue;
        };
        if node.status != TaskStatus::Pending {
            culprits.insert(id);
            continue;
        }
        for dep in node.dependencies.iter().filter(|d| !satisfied(graph, completed, d)) {
            queue.push_back(dep);
        }
    }

    graph
        .nodes()
        .iter()
        .filter(|n| culprits.contains(n.id.as_str()))
        .map(|n| n.id.clone())
        .collect()
}

/// Static wave plan assuming every pending task succeeds
pub fn execution_waves(graph: &TaskGraph) -> Result<Vec<Vec<String>>, ScheduleError> {
    debug!(count = graph.len(), "execution_waves: called");
    topological_order(graph)?;

    let mut completed = graph.completed_ids();
    let mut planned: HashSet<String> = HashSet::new();
    let mut waves = Vec::new();

    loop {
        let wave: Vec<String> = graph
            .nodes()
            .iter()
            .filter(|n| n.status == TaskStatus::Pending && !planned.contains(&n.id))
            .filter(|n| n.dependencies.iter().all(|d| satisfied(graph, &completed, d)))
            .map(|n| n.id.clone())
            .collect();

        if wave.is_empty() {
            break;
        }
        for id in &wave {
            planned.insert(id.clone());
            completed.insert(id.clone());
        }
        debug!(wave = waves.len(), size = wave.len(), "execution_waves: planned wave");
        waves.push(wave);
    }

    let blocked: Vec<String> = graph
        .pending_ids()
        .into_iter()
        .filter(|id| !planned.contains(id))
        .collect();
    if !blocked.is_empty() {
        let failed_upstream = blocking_upstream(graph, &completed, &blocked);
        return Err(ScheduleError::Deadlock {
            blocked,
            failed_upstream,
        });
    }

    Ok(waves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn node(id: &str, deps: &[&str]) -> TaskNode {
        TaskNode::new_command(id, id, "true").with_dependencies(deps.iter().copied())
    }

    fn graph(nodes: Vec<TaskNode>) -> TaskGraph {
        TaskGraph::from_nodes(nodes).unwrap()
    }

    fn ids(tasks: &[&TaskNode]) -> Vec<String> {
        tasks.iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn test_ready_tasks_requires_completed_deps() {
        let g = graph(vec![node("a", &[]), node("b", &["a"]), node("c", &[])]);
        assert_eq!(ids(&ready_tasks(&g, &HashSet::new())), vec!["a", "c"]);

        let done: HashSet<String> = ["a".to_string()].into();
        assert_eq!(ids(&ready_tasks(&g, &done)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ready_tasks_ignores_non_pending() {
        let mut g = graph(vec![node("a", &[]), node("b", &[])]);
        g.set_status("a", TaskStatus::InProgress).unwrap();
        assert_eq!(ids(&ready_tasks(&g, &HashSet::new())), vec!["b"]);
    }

    #[test]
    fn test_external_dependency_counts_as_satisfied() {
        let g = graph(vec![node("a", &["already-built"])]);
        assert_eq!(ids(&ready_tasks(&g, &HashSet::new())), vec!["a"]);
    }

    #[test]
    fn test_second_wave_is_exactly_dependent() {
        let mut g = graph(vec![node("A", &[]), node("B", &["A"])]);
        let first = next_wave(&g, &g.completed_ids()).unwrap().unwrap();
        assert_eq!(first, vec!["A"]);

        g.set_status("A", TaskStatus::Completed).unwrap();
        let second = next_wave(&g, &g.completed_ids()).unwrap().unwrap();
        assert_eq!(second, vec!["B"]);

        g.set_status("B", TaskStatus::Completed).unwrap();
        assert_eq!(next_wave(&g, &g.completed_ids()).unwrap(), None);
    }

    #[test]
    fn test_failed_upstream_is_deadlock() {
        let mut g = graph(vec![node("A", &[]), node("B", &["A"])]);
        g.set_status("A", TaskStatus::Failed).unwrap();
        assert_eq!(
            next_wave(&g, &g.completed_ids()),
            Err(ScheduleError::Deadlock {
                blocked: vec!["B".to_string()],
                failed_upstream: vec!["A".to_string()],
            })
        );
    }

    #[test]
    fn test_deadlock_traces_transitive_failure() {
        let mut g = graph(vec![node("A", &[]), node("B", &["A"]), node("C", &["B"])]);
        g.set_status("A", TaskStatus::Failed).unwrap();
        let Err(ScheduleError::Deadlock { blocked, failed_upstream }) = next_wave(&g, &g.completed_ids()) else {
            panic!("expected deadlock");
        };
        assert_eq!(blocked, vec!["B", "C"]);
        assert_eq!(failed_upstream, vec!["A"]);
    }

    #[test]
    fn test_execution_waves_diamond() {
        let g = graph(vec![
            node("root", &[]),
            node("left", &["root"]),
            node("right", &["root"]),
            node("join", &["left", "right"]),
        ]);
        assert_eq!(
            execution_waves(&g).unwrap(),
            vec![vec!["root".to_string()], vec!["left".to_string(), "right".to_string()], vec!["join".to_string()]]
        );
    }

    #[test]
    fn test_execution_waves_skips_completed() {
        let mut g = graph(vec![node("a", &[]), node("b", &["a"])]);
        g.set_status("a", TaskStatus::Completed).unwrap();
        assert_eq!(execution_waves(&g).unwrap(), vec![vec!["b".to_string()]]);
    }

    #[test]
    fn test_execution_waves_reports_deadlock() {
        let mut g = graph(vec![node("a", &[]), node("b", &["a"])]);
        g.set_status("a", TaskStatus::Failed).unwrap();
        assert!(matches!(execution_waves(&g), Err(ScheduleError::Deadlock { .. })));
    }

    /// Random DAG: node i may depend on any j < i
    fn arb_dag() -> impl Strategy<Value = TaskGraph> {
        (1usize..24)
            .prop_flat_map(|n| (Just(n), proptest::collection::vec(any::<bool>(), n * n)))
            .prop_map(|(n, edges)| {
                let nodes = (0..n)
                    .map(|i| {
                        let deps: Vec<String> = (0..i).filter(|j| edges[i * n + j]).map(|j| format!("t{j}")).collect();
                        TaskNode::new_command(format!("t{i}"), "generated", "true").with_dependencies(deps)
                    })
                    .collect();
                TaskGraph::from_nodes(nodes).unwrap()
            })
    }

    fn depth(g: &TaskGraph, id: &str, memo: &mut HashMap<String, usize>) -> usize {
        if let Some(d) = memo.get(id) {
            return *d;
        }
        let d = g
            .get(id)
            .map(|n| n.dependencies.iter().map(|dep| depth(g, dep, memo) + 1).max().unwrap_or(0))
            .unwrap_or(0);
        memo.insert(id.to_string(), d);
        d
    }

    proptest! {
        #[test]
        fn prop_order_puts_dependencies_first(g in arb_dag()) {
            let order = topological_order(&g).unwrap();
            let pos: HashMap<&str, usize> = order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
            prop_assert_eq!(order.len(), g.len());
            for n in g.nodes() {
                for d in &n.dependencies {
                    prop_assert!(pos[d.as_str()] < pos[n.id.as_str()]);
                }
            }
        }

        #[test]
        fn prop_back_edge_always_cycles(g in arb_dag(), pick in any::<prop::sample::Index>()) {
            let mut nodes: Vec<TaskNode> = g.nodes().to_vec();
            let i = pick.index(nodes.len());
            // node 0 and node i depend on each other
            let first = nodes[0].id.clone();
            let other = nodes[i].id.clone();
            nodes[0].dependencies.push(other);
            if i != 0 {
                nodes[i].dependencies.push(first);
            }
            let unchecked = TaskGraph::from(nodes);
            prop_assert!(
                matches!(topological_order(&unchecked), Err(ScheduleError::Cycle { .. })),
                "expected a cycle"
            );
        }

        #[test]
        fn prop_waves_cover_every_node_once(g in arb_dag()) {
            let waves = execution_waves(&g).unwrap();
            let flat: Vec<&String> = waves.iter().flatten().collect();
            let unique: HashSet<&String> = flat.iter().copied().collect();
            prop_assert_eq!(flat.len(), g.len());
            prop_assert_eq!(unique.len(), g.len());
        }

        #[test]
        fn prop_wave_index_is_longest_path(g in arb_dag()) {
            let waves = execution_waves(&g).unwrap();
            let mut memo = HashMap::new();
            for (w, wave) in waves.iter().enumerate() {
                for id in wave {
                    prop_assert_eq!(depth(&g, id, &mut memo), w);
                }
            }
        }

        #[test]
        fn prop_driving_next_wave_matches_plan(g in arb_dag()) {
            let plan = execution_waves(&g).unwrap();
            let mut g = g;
            let mut driven = Vec::new();
            while let Some(wave) = next_wave(&g, &g.completed_ids()).unwrap() {
                for id in &wave {
                    g.set_status(id, TaskStatus::Completed).unwrap();
                }
                driven.push(wave);
            }
            prop_assert_eq!(driven, plan);
        }
    }
}
