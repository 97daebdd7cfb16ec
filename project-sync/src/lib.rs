//! Client-side project and script synchronization for Words2Frame.
//!
//! [`ProjectSyncCore`] owns the active project's script data, keeps it
//! reconciled with the script-analysis backend, and drives the
//! upload → analyze → refresh workflow. Dashboard pages observe it through a
//! `watch` channel and mutate it only through its operations.
//!
//! Backend payloads are shaped by [`normalize`], which never fails: malformed
//! or missing fields become defaults so views always have something to render.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod api;
pub mod config;
pub mod errors;
pub mod local;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod session;
pub mod status;
pub mod sync_core;

pub use api::{CreateProjectRequest, HttpProjectApi, ProjectApi, ScriptFile};
pub use config::{NewProjectDefaults, SyncConfig};
pub use errors::{ErrorCategory, Result, SyncError};
pub use model::{
    Actor, BoardColumn, BoardTask, Budget, CrewMember, EMPTY_SCRIPT_DATA, ProductionBoard,
    ProjectId, ProjectRecord, ProjectSnapshot, Scene, SceneBudget, ScheduleEntry, ScriptData,
    UploadedScript,
};
pub use normalize::normalize_snapshot;
pub use notify::{ChannelNotifier, Notice, NoticeCenter, NoticeHookGuard, NoticeLevel, Notifier};
pub use session::SessionWatcher;
pub use status::{AnalysisStatus, IllegalTransition, StatusChange};
pub use sync_core::{NewProjectOverrides, ProjectSyncCore, SyncState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build a core talking HTTP to the configured backend.
pub fn connect(config: SyncConfig, notices: NoticeCenter) -> ProjectSyncCore {
    let api = std::sync::Arc::new(HttpProjectApi::from_config(&config));
    tracing::info!(base_url = %config.base_url(), version = VERSION, "project sync ready");
    ProjectSyncCore::new(api, config, notices)
}
