//! Records exchanged with the coordinator.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use super::diagnostics::Diagnostics;
use crate::error::CoordinatorError;

/// One of the three processing stages of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Setup,
    Workflow,
    Upload,
}

impl Stage {
    /// Integer code used by the coordinator.
    pub fn code(self) -> u8 {
        match self {
            Stage::Setup => 1,
            Stage::Workflow => 2,
            Stage::Upload => 3,
        }
    }

    /// Upper-case label.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Setup => "SETUP",
            Stage::Workflow => "WORKFLOW",
            Stage::Upload => "UPLOAD",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Lifecycle point within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Start,
    Success,
    Fail,
}

impl State {
    /// Integer code used by the coordinator.
    pub fn code(self) -> u8 {
        match self {
            State::Start => 1,
            State::Success => 2,
            State::Fail => 3,
        }
    }

    /// Upper-case label.
    pub fn label(self) -> &'static str {
        match self {
            State::Start => "START",
            State::Success => "SUCCESS",
            State::Fail => "FAIL",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// One unit of work as described by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetJob {
    /// Coordinator id, used when posting statuses.
    pub id: u64,
    /// Dataset slug.
    pub slug: String,
    /// Slug of the project the dataset belongs to.
    pub project_slug: String,
    /// Storage path holding the dataset's files.
    pub base_path: String,
    /// The full record, persisted verbatim as `dataset.json`.
    pub raw: serde_json::Value,
}

#[derive(Deserialize)]
struct DatasetFields {
    id: u64,
    slug: String,
    parent: String,
    base_file_path: String,
}

impl DatasetJob {
    /// Extracts the fields the agent needs from a dataset record.
    pub fn from_json(raw: serde_json::Value) -> Result<Self, CoordinatorError> {
        let fields: DatasetFields = serde_json::from_value(raw.clone())?;
        Ok(Self {
            id: fields.id,
            slug: fields.slug,
            project_slug: fields.parent,
            base_path: fields.base_file_path,
            raw,
        })
    }
}

/// A project and its workflow definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSpec {
    /// Project slug.
    pub slug: String,
    /// Text of the Snakefile or shell script.
    pub workflow_source: String,
    /// The full record, persisted verbatim as `project.json`.
    pub raw: serde_json::Value,
}

#[derive(Deserialize)]
struct ProjectFields {
    slug: String,
    #[serde(default)]
    workflow: Option<String>,
}

impl ProjectSpec {
    /// Extracts the fields the agent needs from a project record.
    pub fn from_json(raw: serde_json::Value) -> Result<Self, CoordinatorError> {
        let fields: ProjectFields = serde_json::from_value(raw.clone())?;
        Ok(Self {
            slug: fields.slug,
            workflow_source: fields.workflow.unwrap_or_default(),
            raw,
        })
    }
}

/// Reply to a "next unclaimed dataset" request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextDataset {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub dataset: String,
}

impl NextDataset {
    /// The coordinator answers with empty strings when nothing is left.
    pub fn is_available(&self) -> bool {
        !self.project.is_empty() && !self.dataset.is_empty()
    }
}

/// A stage transition posted to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub dataset: u64,
    pub stage: Stage,
    pub state: State,
    pub note: String,
    #[serde(flatten)]
    pub diagnostics: Diagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dataset_from_json() {
        let raw = json!({
            "id": 2,
            "slug": "dataset",
            "parent": "project",
            "base_file_path": "crunch/project/dataset",
            "description": "extra fields are kept",
        });

        let job = DatasetJob::from_json(raw.clone()).unwrap();
        assert_eq!(job.id, 2);
        assert_eq!(job.slug, "dataset");
        assert_eq!(job.project_slug, "project");
        assert_eq!(job.base_path, "crunch/project/dataset");
        assert_eq!(job.raw, raw);
    }

    #[test]
    fn test_dataset_missing_field() {
        let raw = json!({"id": 2, "slug": "dataset"});
        assert!(matches!(
            DatasetJob::from_json(raw),
            Err(CoordinatorError::Json(_))
        ));
    }

    #[test]
    fn test_project_from_json() {
        let project =
            ProjectSpec::from_json(json!({"slug": "project", "workflow": "cat dataset.json"}))
                .unwrap();
        assert_eq!(project.slug, "project");
        assert_eq!(project.workflow_source, "cat dataset.json");

        let no_workflow = ProjectSpec::from_json(json!({"slug": "project"})).unwrap();
        assert_eq!(no_workflow.workflow_source, "");
    }

    #[test]
    fn test_next_dataset_availability() {
        let none: NextDataset = serde_json::from_value(json!({"project": "", "dataset": ""})).unwrap();
        assert!(!none.is_available());

        let some: NextDataset =
            serde_json::from_value(json!({"project": "p", "dataset": "d"})).unwrap();
        assert!(some.is_available());
    }

    #[test]
    fn test_status_update_serialization() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.insert("hostname", json!("agent-01"));

        let update = StatusUpdate {
            dataset: 2,
            stage: Stage::Workflow,
            state: State::Fail,
            note: "boom".to_string(),
            diagnostics,
        };

        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(
            value,
            json!({
                "dataset": 2,
                "stage": 2,
                "state": 3,
                "note": "boom",
                "hostname": "agent-01",
            })
        );
    }

    #[test]
    fn test_labels() {
        assert_eq!(Stage::Setup.to_string(), "SETUP");
        assert_eq!(State::Success.to_string(), "SUCCESS");
        assert_eq!(Stage::Upload.code(), 3);
        assert_eq!(State::Start.code(), 1);
    }
}
