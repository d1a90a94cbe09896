//! Ingestion - planner records to a validated TaskGraph
//!
//! Repairs what is unambiguous (missing ids, missing kinds, stray whitespace,
//! repeated dependencies) and rejects everything else with a typed error.

use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use super::PlannedTask;
use crate::domain::{GraphError, TaskGraph, TaskKind, TaskNode};
use crate::scheduler::{ScheduleError, validate_structure};

/// Ingestion failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("Plan contains no tasks")]
    EmptyPlan,

    #[error("Task {task}: unknown kind {kind:?}")]
    UnknownKind { task: String, kind: String },

    #[error("Task {task}: kind {kind} requires {field}")]
    MissingField {
        task: String,
        kind: &'static str,
        field: &'static str,
    },

    #[error("Task {task}: cannot infer a kind without a command or file path")]
    Uninferable { task: String },

    #[error("Task {0} depends on itself")]
    SelfDependency(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Structural(#[from] ScheduleError),
}

/// Ingestion knobs
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Accept dependencies on ids outside the plan as already-satisfied
    pub allow_external: bool,
    /// Prefix for generated ids (`{prefix}-{n}`)
    pub id_prefix: String,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            allow_external: false,
            id_prefix: "task".to_string(),
        }
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn parse_kind(task: &str, kind: &str) -> Result<&'static str, IngestError> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "code" | "edit" | "file" | "write" => Ok("code"),
        "command" | "shell" | "cmd" | "run" => Ok("command"),
        "test" | "tests" | "testing" | "verify" => Ok("test"),
        _ => Err(IngestError::UnknownKind {
            task: task.to_string(),
            kind: kind.to_string(),
        }),
    }
}

fn infer_kind(task: &str, file: Option<&String>, command: Option<&String>) -> Result<&'static str, IngestError> {
    match (file, command) {
        (Some(_), _) => Ok("code"),
        (None, Some(cmd)) if cmd.split_whitespace().any(|w| w == "test" || w.starts_with("pytest")) => Ok("test"),
        (None, Some(_)) => Ok("command"),
        (None, None) => Err(IngestError::Uninferable { task: task.to_string() }),
    }
}

fn convert(record: &PlannedTask, id: String) -> Result<TaskNode, IngestError> {
    let file = clean(record.file_path.as_deref());
    let command = clean(record.command.as_deref());
    let kind_name = match clean(record.kind.as_deref()) {
        Some(kind) => parse_kind(&id, &kind)?,
        None => {
            let inferred = infer_kind(&id, file.as_ref(), command.as_ref())?;
            debug!(%id, inferred, "convert: inferred kind");
            inferred
        }
    };

    let missing = |field: &'static str| IngestError::MissingField {
        task: id.clone(),
        kind: kind_name,
        field,
    };
    let kind = match kind_name {
        "code" => TaskKind::Code {
            file_path: PathBuf::from(file.clone().ok_or_else(|| missing("file_path"))?),
            command: command.clone(),
        },
        "command" => TaskKind::Command {
            command: command.clone().ok_or_else(|| missing("command"))?,
            file_path: file.clone().map(PathBuf::from),
        },
        _ => TaskKind::Test {
            command: command.clone().ok_or_else(|| missing("command"))?,
        },
    };

    let description = clean(record.description.as_deref())
        .or_else(|| command.clone())
        .or_else(|| file.clone().map(|f| format!("edit {f}")))
        .unwrap_or_else(|| id.clone());

    let mut dependencies: Vec<String> = Vec::new();
    for dep in record.dependencies.iter().filter_map(|d| clean(Some(d))) {
        if dep == id {
            return Err(IngestError::SelfDependency(id));
        }
        if !dependencies.contains(&dep) {
            dependencies.push(dep);
        }
    }

    let mut node = TaskNode::new(id, description, kind).with_dependencies(dependencies);
    if let Some(validation) = clean(record.validation_command.as_deref()) {
        node = node.with_validation(validation);
    }
    if let Some(capability) = clean(record.assigned_capability.as_deref()) {
        node = node.with_capability(capability);
    }
    Ok(node)
}

/// Convert records to nodes without building a graph
pub(crate) fn ingest_nodes(records: &[PlannedTask], options: &IngestOptions) -> Result<Vec<TaskNode>, IngestError> {
    let taken: HashSet<String> = records.iter().filter_map(|r| clean(r.id.as_deref())).collect();
    let mut generated = 0usize;
    let mut nodes = Vec::with_capacity(records.len());

    for record in records {
        let id = match clean(record.id.as_deref()) {
            Some(id) => id,
            None => loop {
                generated += 1;
                let candidate = format!("{}-{}", options.id_prefix, generated);
                if !taken.contains(&candidate) {
                    warn!(%candidate, "ingest_nodes: record without id, generated one");
                    break candidate;
                }
            },
        };
        nodes.push(convert(record, id)?);
    }
    Ok(nodes)
}

/// Validate and convert planner output into a graph
pub fn ingest(records: &[PlannedTask], options: &IngestOptions) -> Result<TaskGraph, IngestError> {
    debug!(count = records.len(), ?options, "ingest: called");
    if records.is_empty() {
        return Err(IngestError::EmptyPlan);
    }
    let nodes = ingest_nodes(records, options)?;
    let graph = TaskGraph::from_nodes(nodes)?;
    validate_structure(&graph, options.allow_external)?;
    debug!(count = graph.len(), "ingest: graph built");
    Ok(graph)
}
