//! FilePlanner - read planner records from a JSON or YAML file

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{PlannedTask, Planner, PlannerError, ProjectMetadata};

/// Accepted top-level shapes: a bare list or `{ tasks: [...] }`
#[derive(Deserialize)]
#[serde(untagged)]
enum PlanDocument {
    List(Vec<PlannedTask>),
    Wrapped { tasks: Vec<PlannedTask> },
}

impl From<PlanDocument> for Vec<PlannedTask> {
    fn from(doc: PlanDocument) -> Self {
        match doc {
            PlanDocument::List(tasks) | PlanDocument::Wrapped { tasks } => tasks,
        }
    }
}

/// Planner backed by a plan file; the request text is ignored
#[derive(Debug, Clone)]
pub struct FilePlanner {
    path: PathBuf,
}

impl FilePlanner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse plan text; `.json` files are parsed as JSON, everything else as YAML
    pub fn parse(path: &Path, content: &str) -> Result<Vec<PlannedTask>, PlannerError> {
        debug!(path = %path.display(), "FilePlanner::parse: called");
        let is_json = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let doc: PlanDocument = if is_json {
            serde_json::from_str(content).map_err(|e| PlannerError::InvalidResponse(e.to_string()))?
        } else {
            serde_yaml::from_str(content).map_err(|e| PlannerError::InvalidResponse(e.to_string()))?
        };
        Ok(doc.into())
    }
}

#[async_trait]
impl Planner for FilePlanner {
    async fn plan(&self, _request: &str, _project: &ProjectMetadata) -> Result<Vec<PlannedTask>, PlannerError> {
        debug!(path = %self.path.display(), "FilePlanner::plan: called");
        let content = tokio::fs::read_to_string(&self.path).await?;
        Self::parse(&self.path, &content)
    }
}
