//! Backend payload → canonical snapshot normalization.
//!
//! Every function here is total: malformed or missing fields are replaced by
//! safe defaults so the dashboard keeps rendering on partial data. Entries of a
//! list that are not JSON objects are dropped; positional ids still count them.

use std::collections::BTreeSet;

use serde_json::Map;
use serde_json::Value;

use crate::model::{
    Actor, BoardTask, Budget, CrewMember, ProductionBoard, ProjectId, ProjectRecord,
    ProjectSnapshot, ScheduleEntry, Scene, SceneBudget, ScriptData, UploadedScript,
};

const UNKNOWN_LOCATION: &str = "Unknown";
const DEFAULT_TASK_STATUS: &str = "todo";
const UNASSIGNED: &str = "Unassigned";

/// Normalize a raw `{project, scriptData}` payload.
///
/// A missing/null payload, or one without a usable `project`, yields
/// [`ProjectSnapshot::EMPTY`]: "no data yet" is not an error.
pub fn normalize_snapshot(raw: Option<&Value>) -> ProjectSnapshot {
    let Some(root) = raw.and_then(Value::as_object) else {
        return ProjectSnapshot::EMPTY;
    };
    let Some(project) = root.get("project").and_then(normalize_project) else {
        return ProjectSnapshot::EMPTY;
    };

    ProjectSnapshot {
        project: Some(project),
        script_data: normalize_script_data(root.get("scriptData").and_then(Value::as_object)),
    }
}

/// Normalize a single project record. Records without an id are unusable.
pub fn normalize_project(raw: &Value) -> Option<ProjectRecord> {
    let obj = raw.as_object()?;
    let id = id_text(obj.get("id"))?;
    Some(ProjectRecord {
        id: ProjectId::from(id),
        name: text(obj.get("name")),
        description: text(obj.get("description")),
        budget: obj.get("budget").and_then(number),
    })
}

/// Normalize the `GET /projects/` listing.
pub fn normalize_project_list(raw: &Value) -> Vec<ProjectRecord> {
    raw.as_array()
        .map(|items| items.iter().filter_map(normalize_project).collect())
        .unwrap_or_default()
}

/// Canonical filename from an upload response.
pub fn upload_filename(raw: &Value) -> Option<String> {
    non_empty_text(raw.get("filename"))
}

/// Snapshot embedded in an analysis response, when the backend included one.
pub fn embedded_snapshot(raw: &Value) -> Option<&Value> {
    raw.get("snapshot").filter(|v| v.is_object())
}

fn normalize_script_data(raw: Option<&Map<String, Value>>) -> ScriptData {
    let Some(data) = raw else {
        return ScriptData::default();
    };

    ScriptData {
        uploaded_script: data.get("uploadedScript").and_then(normalize_uploaded_script),
        scene_data: objects(data.get("sceneData"))
            .map(|(pos, scene)| normalize_scene(pos, scene))
            .collect(),
        budget: normalize_budget(data.get("budget")),
        schedule_data: objects(data.get("scheduleData"))
            .map(|(pos, entry)| ScheduleEntry {
                id: id_text(entry.get("id")).unwrap_or_else(|| pos.to_string()),
                date: text(entry.get("date")),
                scene: text(entry.get("scene")),
                location: text(entry.get("location")),
                cast: string_list(entry.get("cast")),
            })
            .collect(),
        crew: objects(data.get("crew"))
            .map(|(pos, member)| CrewMember {
                id: id_text(member.get("id")).unwrap_or_else(|| pos.to_string()),
                name: text(member.get("name")),
                role: text(member.get("role")),
            })
            .collect(),
        actors: objects(data.get("actors"))
            .map(|(pos, actor)| Actor {
                id: id_text(actor.get("id")).unwrap_or_else(|| format!("actor-{pos}")),
                name: text(actor.get("name")),
                role: text(actor.get("role")),
                cost: coerce_number(actor.get("cost")),
            })
            .collect(),
        reports: data.get("reports").filter(|v| v.is_object()).cloned(),
        production_board: normalize_board(data.get("productionBoard")),
    }
}

fn normalize_uploaded_script(raw: &Value) -> Option<UploadedScript> {
    let obj = raw.as_object()?;
    Some(UploadedScript {
        name: non_empty_text(obj.get("name"))?,
        status: text(obj.get("status")),
        uploaded_at: text(obj.get("uploadedAt")),
    })
}

fn normalize_scene(pos: usize, raw: &Map<String, Value>) -> Scene {
    let index = raw
        .get("index")
        .and_then(number)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64)
        .unwrap_or(pos as u64 + 1);

    let scene_label = non_empty_text(raw.get("scene"))
        .or_else(|| non_empty_text(raw.get("heading")))
        .unwrap_or_else(|| format!("Scene {index}"));

    Scene {
        id: id_text(raw.get("id")).unwrap_or_else(|| format!("scene-{pos}")),
        index,
        scene_label,
        location: non_empty_text(raw.get("location"))
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
        scene_type: text(raw.get("type")),
        time: text(raw.get("time")),
        summary: text(raw.get("summary")),
        word_count: coerce_number(raw.get("wordCount")).max(0.0) as u64,
        predicted_budget: coerce_number(raw.get("predictedBudget")).max(0.0),
        suggested_location: text(raw.get("suggestedLocation")),
        progress_status: non_empty_text(raw.get("progressStatus"))
            .unwrap_or_else(|| DEFAULT_TASK_STATUS.to_string()),
        characters: string_set(raw.get("characters")),
        props: string_set(raw.get("props")),
    }
}

fn normalize_budget(raw: Option<&Value>) -> Budget {
    let Some(obj) = raw.and_then(Value::as_object) else {
        return Budget::default();
    };
    Budget {
        total: coerce_number(obj.get("total")),
        per_scene: objects(obj.get("perScene"))
            .map(|(pos, item)| SceneBudget {
                scene: non_empty_text(item.get("scene"))
                    .unwrap_or_else(|| format!("Scene {}", pos + 1)),
                total: coerce_number(item.get("total")),
            })
            .collect(),
    }
}

fn normalize_board(raw: Option<&Value>) -> ProductionBoard {
    let mut board = ProductionBoard::default();
    let Some(columns) = raw.and_then(Value::as_object) else {
        return board;
    };

    for (column, tasks) in columns {
        let tasks = objects(Some(tasks))
            .map(|(pos, task)| BoardTask {
                id: id_text(task.get("id")).unwrap_or_else(|| format!("{column}-{pos}")),
                title: text(task.get("title")),
                scene: text(task.get("scene")),
                status: non_empty_text(task.get("status"))
                    .unwrap_or_else(|| DEFAULT_TASK_STATUS.to_string()),
                assigned_to: non_empty_text(task.get("assignedTo"))
                    .unwrap_or_else(|| UNASSIGNED.to_string()),
            })
            .collect();
        board.insert(column.clone(), tasks);
    }
    board
}

/// Object entries of an array field, paired with their position in the array.
fn objects(raw: Option<&Value>) -> impl Iterator<Item = (usize, &Map<String, Value>)> {
    raw.and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .filter_map(|(pos, item)| item.as_object().map(|obj| (pos, obj)))
}

/// Scalar rendered as text; objects, arrays and null are absent.
fn text(raw: Option<&Value>) -> Option<String> {
    match raw? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn non_empty_text(raw: Option<&Value>) -> Option<String> {
    text(raw).filter(|s| !s.trim().is_empty())
}

fn id_text(raw: Option<&Value>) -> Option<String> {
    match raw? {
        Value::Number(n) => Some(
            n.as_i64()
                .map(|i| i.to_string())
                .unwrap_or_else(|| n.to_string()),
        ),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// JSON number or numeric string; non-finite values are rejected.
fn number(raw: &Value) -> Option<f64> {
    let n = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn coerce_number(raw: Option<&Value>) -> f64 {
    raw.and_then(number).unwrap_or(0.0)
}

fn string_set(raw: Option<&Value>) -> BTreeSet<String> {
    string_list(raw).into_iter().collect()
}

/// Array of scalars as strings; anything that is not an array is empty.
fn string_list(raw: Option<&Value>) -> Vec<String> {
    raw.and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| text(Some(v))).collect())
        .unwrap_or_default()
}
