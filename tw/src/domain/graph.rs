//! TaskGraph - ordered collection of task nodes and their dependency edges
//!
//! The graph is mutated in place during a run (fix tasks inserted, statuses
//! flipped, dependencies rewritten) but every structural mutation is applied
//! to a copy and validated first, so the graph stays acyclic at all times.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::error::GraphError;
use super::task::{TaskNode, TaskStatus};
use crate::scheduler::topological_order;

/// Ordered set of tasks with an id index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<TaskNode>", into = "Vec<TaskNode>")]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<String, usize>,
}

impl From<Vec<TaskNode>> for TaskGraph {
    fn from(nodes: Vec<TaskNode>) -> Self {
        let mut graph = Self { nodes, index: HashMap::new() };
        graph.reindex();
        graph
    }
}

impl From<TaskGraph> for Vec<TaskNode> {
    fn from(graph: TaskGraph) -> Self {
        graph.nodes
    }
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph, rejecting duplicate ids and cycles
    pub fn from_nodes(nodes: Vec<TaskNode>) -> Result<Self, GraphError> {
        debug!(count = nodes.len(), "TaskGraph::from_nodes: called");
        let mut seen = HashSet::new();
        for node in &nodes {
            if !seen.insert(node.id.as_str()) {
                debug!(id = %node.id, "TaskGraph::from_nodes: duplicate id");
                return Err(GraphError::DuplicateId(node.id.clone()));
            }
        }
        let graph = Self::from(nodes);
        topological_order(&graph)?;
        Ok(graph)
    }

    fn reindex(&mut self) {
        self.index = self.nodes.iter().enumerate().map(|(i, n)| (n.id.clone(), i)).collect();
    }

    /// Apply a structural change to a copy and keep it only if still acyclic
    fn mutate<F>(&mut self, change: F) -> Result<(), GraphError>
    where
        F: FnOnce(&mut Vec<TaskNode>) -> Result<(), GraphError>,
    {
        let mut nodes = self.nodes.clone();
        change(&mut nodes)?;
        let mut next = Self::from(nodes);
        if next.index.len() != next.nodes.len() {
            let mut seen = HashSet::new();
            let dup = next
                .nodes
                .iter()
                .find(|n| !seen.insert(n.id.as_str()))
                .map(|n| n.id.clone())
                .unwrap_or_default();
            return Err(GraphError::DuplicateId(dup));
        }
        topological_order(&next)?;
        std::mem::swap(self, &mut next);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut TaskNode> {
        let i = *self.index.get(id)?;
        Some(&mut self.nodes[i])
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    /// Position of a node in the ordered collection
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Append a node
    pub fn push(&mut self, node: TaskNode) -> Result<(), GraphError> {
        debug!(id = %node.id, "TaskGraph::push: called");
        if self.contains(&node.id) {
            return Err(GraphError::DuplicateId(node.id));
        }
        self.mutate(|nodes| {
            nodes.push(node);
            Ok(())
        })
    }

    /// Insert a node immediately before `anchor`
    pub fn insert_before(&mut self, anchor: &str, node: TaskNode) -> Result<(), GraphError> {
        debug!(%anchor, id = %node.id, "TaskGraph::insert_before: called");
        let pos = self
            .position(anchor)
            .ok_or_else(|| GraphError::UnknownTask(anchor.to_string()))?;
        if self.contains(&node.id) {
            return Err(GraphError::DuplicateId(node.id));
        }
        self.mutate(|nodes| {
            nodes.insert(pos, node);
            Ok(())
        })
    }

    /// Make `id` depend on `dependency`
    pub fn add_dependency(&mut self, id: &str, dependency: &str) -> Result<(), GraphError> {
        debug!(%id, %dependency, "TaskGraph::add_dependency: called");
        let pos = self.position(id).ok_or_else(|| GraphError::UnknownTask(id.to_string()))?;
        if self.nodes[pos].depends_on(dependency) {
            return Ok(());
        }
        let dependency = dependency.to_string();
        self.mutate(|nodes| {
            nodes[pos].dependencies.push(dependency);
            Ok(())
        })
    }

    /// Change a node's status; completed nodes never transition again
    pub fn set_status(&mut self, id: &str, status: TaskStatus) -> Result<(), GraphError> {
        let node = self.get_mut(id).ok_or_else(|| GraphError::UnknownTask(id.to_string()))?;
        if node.status == status {
            return Ok(());
        }
        if node.status == TaskStatus::Completed {
            debug!(%id, %status, "TaskGraph::set_status: refused, already completed");
            return Err(GraphError::CompletedImmutable(id.to_string()));
        }
        debug!(%id, from = %node.status, to = %status, "TaskGraph::set_status");
        node.status = status;
        Ok(())
    }

    fn ids_with(&self, status: TaskStatus) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.status == status)
            .map(|n| n.id.clone())
            .collect()
    }

    pub fn completed_ids(&self) -> HashSet<String> {
        self.ids_with(TaskStatus::Completed).into_iter().collect()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.ids_with(TaskStatus::Pending)
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.ids_with(TaskStatus::Failed)
    }

    /// Dependency ids that name no node in this graph
    pub fn external_dependencies(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .flat_map(|n| n.dependencies.iter())
            .filter(|d| !self.contains(d))
            .cloned()
            .collect()
    }

    /// Mark every pending node skipped; returns their ids
    pub fn skip_pending(&mut self) -> Vec<String> {
        let ids = self.pending_ids();
        for node in self.nodes.iter_mut().filter(|n| n.status == TaskStatus::Pending) {
            node.status = TaskStatus::Skipped;
        }
        debug!(?ids, "TaskGraph::skip_pending: done");
        ids
    }

    /// Replace `id` with a sub-DAG and splice it into the surrounding edges
    ///
    /// Sub-task sources inherit the parent's dependencies, and every node that
    /// depended on the parent depends on the sub-DAG's sinks instead. Dependencies
    /// between sub-tasks are kept; other dependencies are left as given. A
    /// sub-task may reuse the parent's id since the parent is removed; otherwise
    /// sub-task edges to the parent are dropped.
    pub fn expand_node(&mut self, id: &str, mut subtasks: Vec<TaskNode>) -> Result<(), GraphError> {
        debug!(%id, count = subtasks.len(), "TaskGraph::expand_node: called");
        let pos = self.position(id).ok_or_else(|| GraphError::UnknownTask(id.to_string()))?;
        if self.nodes[pos].status == TaskStatus::Completed {
            return Err(GraphError::CompletedImmutable(id.to_string()));
        }
        if subtasks.is_empty() {
            return Err(GraphError::EmptyExpansion(id.to_string()));
        }
        if let Some(clash) = subtasks.iter().find(|s| s.id != id && self.contains(&s.id)) {
            return Err(GraphError::DuplicateId(clash.id.clone()));
        }
        if !subtasks.iter().any(|s| s.id == id) {
            for sub in subtasks.iter_mut() {
                sub.dependencies.retain(|d| d != id);
            }
        }

        let parent_deps = self.nodes[pos].dependencies.clone();
        let sub_ids: HashSet<String> = subtasks.iter().map(|s| s.id.clone()).collect();
        let depended_on: HashSet<&str> = subtasks
            .iter()
            .flat_map(|s| s.dependencies.iter())
            .filter(|d| sub_ids.contains(*d))
            .map(String::as_str)
            .collect();
        let sinks: Vec<String> = subtasks
            .iter()
            .filter(|s| !depended_on.contains(s.id.as_str()))
            .map(|s| s.id.clone())
            .collect();
        debug!(%id, ?sinks, "TaskGraph::expand_node: sinks computed");

        let spliced: Vec<TaskNode> = subtasks
            .into_iter()
            .map(|mut sub| {
                let is_source = !sub.dependencies.iter().any(|d| sub_ids.contains(d));
                if is_source {
                    for dep in &parent_deps {
                        if !sub.depends_on(dep) {
                            sub.dependencies.push(dep.clone());
                        }
                    }
                }
                sub
            })
            .collect();

        let parent_id = id.to_string();
        self.mutate(move |nodes| {
            for node in nodes.iter_mut() {
                if node.depends_on(&parent_id) {
                    node.dependencies.retain(|d| d != &parent_id);
                    for sink in &sinks {
                        if !node.depends_on(sink) {
                            node.dependencies.push(sink.clone());
                        }
                    }
                }
            }
            nodes.remove(pos);
            for (offset, sub) in spliced.into_iter().enumerate() {
                nodes.insert(pos + offset, sub);
            }
            Ok(())
        })
    }
}
