//! Terminal rendering of command results and notices.

use std::fmt::Write as _;

use serde_json::{Value, json};
use w2f_project_sync::{Notice, NoticeLevel, Notifier, ProjectId, ProjectRecord, ProjectSnapshot};

/// Prints core notices to stderr so stdout stays machine-readable.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: &Notice) {
        let icon = match notice.level {
            NoticeLevel::Success => "✓",
            NoticeLevel::Error => "✗",
            NoticeLevel::Info => "·",
        };
        eprintln!("{icon} {}", notice.message);
    }
}

/// Result of a successful command.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Projects(Vec<ProjectRecord>),
    Resolved(Option<ProjectId>, Option<ProjectRecord>),
    Snapshot(ProjectSnapshot),
    Analyzed(String, ProjectSnapshot),
    Created(ProjectRecord),
    Reports(Option<Value>),
}

impl Report {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Projects(projects) => json!({ "projects": projects }),
            Self::Resolved(id, project) => json!({ "projectId": id, "project": project }),
            Self::Snapshot(snapshot) => json!(snapshot),
            Self::Analyzed(filename, snapshot) => json!({
                "filename": filename,
                "snapshot": snapshot,
            }),
            Self::Created(project) => json!({ "project": project }),
            Self::Reports(reports) => json!({ "reports": reports }),
        }
    }

    pub fn human(&self) -> String {
        match self {
            Self::Projects(projects) if projects.is_empty() => "No projects.".to_string(),
            Self::Projects(projects) => projects
                .iter()
                .map(project_line)
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Resolved(None, _) => "No project resolved.".to_string(),
            Self::Resolved(Some(id), project) => match project {
                Some(project) => project_line(project),
                None => format!("{id} (from configuration)"),
            },
            Self::Snapshot(snapshot) => snapshot_summary(snapshot),
            Self::Analyzed(filename, snapshot) => {
                format!("Analyzed {filename}\n{}", snapshot_summary(snapshot))
            }
            Self::Created(project) => format!("Created {}", project_line(project)),
            Self::Reports(None) => {
                "No reports yet. Upload and analyze a script first.".to_string()
            }
            Self::Reports(Some(reports)) => {
                serde_json::to_string_pretty(reports).unwrap_or_default()
            }
        }
    }
}

fn project_line(project: &ProjectRecord) -> String {
    let name = project.name.as_deref().unwrap_or("(unnamed)");
    match project.budget {
        Some(budget) => format!("{:>6}  {name}  budget {budget:.2}", project.id),
        None => format!("{:>6}  {name}", project.id),
    }
}

fn snapshot_summary(snapshot: &ProjectSnapshot) -> String {
    let Some(project) = &snapshot.project else {
        return "No project data yet.".to_string();
    };
    let data = &snapshot.script_data;

    let mut out = project_line(project);
    let script = match &data.uploaded_script {
        Some(script) => match &script.status {
            Some(status) => format!("{} ({status})", script.name),
            None => script.name.clone(),
        },
        None => "none".to_string(),
    };
    let _ = write!(
        out,
        "\nScript: {script}\nScenes: {}  Budget: {:.2}",
        data.scene_data.len(),
        data.budget.total
    );
    for scene in &data.scene_data {
        let _ = write!(
            out,
            "\n  {:>3}. {} ({}) - {} characters",
            scene.index,
            scene.scene_label,
            scene.location,
            scene.characters.len()
        );
    }
    out
}
