//! Canonical project snapshot types.
//!
//! These are the shapes every consumer reads. They serialize back to the
//! backend's camelCase `{project, scriptData}` layout, so a serialized snapshot
//! can be fed through [`crate::normalize::normalize_snapshot`] again unchanged.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use serde::ser::SerializeMap;
use serde_json::Value;

/// Backend project identifier.
///
/// The backend issues integer ids; they are kept in their decimal string form
/// so statically configured ids and backend ids compare the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for ProjectId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// Identifier and metadata of a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub budget: Option<f64>,
}

/// The script currently attached to a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedScript {
    pub name: String,
    /// `Processing` while an upload is in flight; backend snapshots leave it unset.
    pub status: Option<String>,
    pub uploaded_at: Option<String>,
}

impl UploadedScript {
    pub const PROCESSING: &'static str = "Processing";

    /// Optimistic placeholder recorded before the upload call.
    pub fn processing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Some(Self::PROCESSING.to_string()),
            uploaded_at: None,
        }
    }
}

/// One analyzed scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub index: u64,
    #[serde(rename = "scene")]
    pub scene_label: String,
    pub location: String,
    #[serde(rename = "type")]
    pub scene_type: Option<String>,
    pub time: Option<String>,
    pub summary: Option<String>,
    pub word_count: u64,
    pub predicted_budget: f64,
    pub suggested_location: Option<String>,
    pub progress_status: String,
    pub characters: BTreeSet<String>,
    pub props: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneBudget {
    pub scene: String,
    pub total: f64,
}

/// Budget as supplied by the backend. `total` is not reconciled with `per_scene`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub total: f64,
    pub per_scene: Vec<SceneBudget>,
}

impl Budget {
    pub const ZERO: Budget = Budget {
        total: 0.0,
        per_scene: Vec::new(),
    };
}

impl Default for Budget {
    fn default() -> Self {
        Self::ZERO
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleEntry {
    pub id: String,
    pub date: Option<String>,
    pub scene: Option<String>,
    pub location: Option<String>,
    pub cast: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrewMember {
    pub id: String,
    pub name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Actor {
    pub id: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardTask {
    pub id: String,
    pub title: Option<String>,
    pub scene: Option<String>,
    pub status: String,
    pub assigned_to: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardColumn {
    pub name: String,
    pub tasks: Vec<BoardTask>,
}

/// Production board columns in the order the backend listed them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProductionBoard {
    columns: Vec<BoardColumn>,
}

impl ProductionBoard {
    pub const EMPTY: ProductionBoard = ProductionBoard {
        columns: Vec::new(),
    };

    pub fn columns(&self) -> &[BoardColumn] {
        &self.columns
    }

    /// Append a column, or replace the tasks of an existing one in place.
    pub fn insert(&mut self, name: impl Into<String>, tasks: Vec<BoardTask>) {
        let name = name.into();
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => column.tasks = tasks,
            None => self.columns.push(BoardColumn { name, tasks }),
        }
    }
}

impl Serialize for ProductionBoard {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in &self.columns {
            map.serialize_entry(&column.name, &column.tasks)?;
        }
        map.end()
    }
}

/// Everything the dashboard pages render for the active project.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptData {
    pub uploaded_script: Option<UploadedScript>,
    pub scene_data: Vec<Scene>,
    pub budget: Budget,
    pub schedule_data: Vec<ScheduleEntry>,
    pub crew: Vec<CrewMember>,
    pub actors: Vec<Actor>,
    pub reports: Option<Value>,
    pub production_board: ProductionBoard,
}

/// State when no session exists or no project is resolved.
pub const EMPTY_SCRIPT_DATA: ScriptData = ScriptData {
    uploaded_script: None,
    scene_data: Vec::new(),
    budget: Budget::ZERO,
    schedule_data: Vec::new(),
    crew: Vec::new(),
    actors: Vec::new(),
    reports: None,
    production_board: ProductionBoard::EMPTY,
};

impl Default for ScriptData {
    fn default() -> Self {
        EMPTY_SCRIPT_DATA
    }
}

/// Normalized remote snapshot: the active project plus its script data.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub project: Option<ProjectRecord>,
    pub script_data: ScriptData,
}

impl ProjectSnapshot {
    pub const EMPTY: ProjectSnapshot = ProjectSnapshot {
        project: None,
        script_data: EMPTY_SCRIPT_DATA,
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Name of the attached script, if any.
    pub fn script_name(&self) -> Option<&str> {
        self.script_data
            .uploaded_script
            .as_ref()
            .map(|s| s.name.as_str())
    }
}
