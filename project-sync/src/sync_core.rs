//! ProjectSyncCore: the single owner of the active project's script data.
//!
//! Pages read state through [`ProjectSyncCore::subscribe`] and change it only
//! through the operations below. All bookkeeping that decides whether a
//! response may still be applied (session epoch, latest refresh sequence,
//! in-flight refresh count) lives inside the watched [`SyncState`], so every
//! check-and-write happens under the channel's single write lock.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::api::{CreateProjectRequest, ProjectApi, ScriptFile};
use crate::config::SyncConfig;
use crate::errors::{Result, SyncError};
use crate::local::{estimate_local_budget, parse_character_list};
use crate::model::{
    EMPTY_SCRIPT_DATA, ProjectId, ProjectRecord, ProjectSnapshot, Scene, ScriptData,
    UploadedScript,
};
use crate::normalize::{
    embedded_snapshot, normalize_project, normalize_project_list, normalize_snapshot,
    upload_filename,
};
use crate::notify::NoticeCenter;
use crate::status::{
    ANALYZING_MESSAGE, AnalysisStatus, COMPLETED_MESSAGE, FAILED_MESSAGE, StatusChange,
    UPLOADING_MESSAGE,
};

const STATUS_EVENT_CAPACITY: usize = 64;

/// Everything a page can observe about the active project.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub script_data: ScriptData,
    pub project: Option<ProjectRecord>,
    pub project_id: Option<ProjectId>,
    pub analysis_status: AnalysisStatus,
    pub status_message: String,
    pub is_loading_snapshot: bool,
    pub is_creating_project: bool,
    pub last_analyzed_filename: Option<String>,
    session_epoch: u64,
    refresh_seq: u64,
    refreshes_in_flight: usize,
}

impl SyncState {
    fn signed_out(default_project: Option<ProjectId>, session_epoch: u64, refresh_seq: u64) -> Self {
        Self {
            script_data: EMPTY_SCRIPT_DATA,
            project: None,
            project_id: default_project,
            analysis_status: AnalysisStatus::Idle,
            status_message: String::new(),
            is_loading_snapshot: false,
            is_creating_project: false,
            last_analyzed_filename: None,
            session_epoch,
            refresh_seq,
            refreshes_in_flight: 0,
        }
    }

    /// Pages should not start an upload or re-analysis while this is true.
    pub fn is_busy(&self) -> bool {
        self.analysis_status.is_in_flight() || self.is_loading_snapshot
    }

    /// Script that a re-analysis would target.
    pub fn known_script_name(&self) -> Option<&str> {
        self.last_analyzed_filename.as_deref().or_else(|| {
            self.script_data
                .uploaded_script
                .as_ref()
                .map(|s| s.name.as_str())
        })
    }
}

/// Overrides for [`ProjectSyncCore::create_new_project`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProjectOverrides {
    pub name: Option<String>,
    pub description: Option<String>,
    pub budget: Option<f64>,
}

impl NewProjectOverrides {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feedback {
    Notify,
    Silent,
}

struct Inner {
    api: Arc<dyn ProjectApi>,
    config: SyncConfig,
    notices: NoticeCenter,
    state: watch::Sender<SyncState>,
    status_tx: broadcast::Sender<StatusChange>,
    token: Mutex<Option<String>>,
}

/// Cheaply clonable handle to the sync core.
#[derive(Clone)]
pub struct ProjectSyncCore {
    inner: Arc<Inner>,
}

impl ProjectSyncCore {
    pub fn new(api: Arc<dyn ProjectApi>, config: SyncConfig, notices: NoticeCenter) -> Self {
        let (state, _) = watch::channel(SyncState::signed_out(config.default_project(), 0, 0));
        let (status_tx, _) = broadcast::channel(STATUS_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                api,
                config,
                notices,
                state,
                status_tx,
                token: Mutex::new(None),
            }),
        }
    }

    /// Read-only view that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// Copy of the current state.
    pub fn state(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    /// Every analysis-status transition, in the order applied.
    pub fn status_events(&self) -> broadcast::Receiver<StatusChange> {
        self.inner.status_tx.subscribe()
    }

    pub fn notices(&self) -> &NoticeCenter {
        &self.inner.notices
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn has_session(&self) -> bool {
        self.token().is_some()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────────────────────

    /// React to an auth token change.
    ///
    /// absent → present resolves the project and refreshes once; present →
    /// absent resets synchronously without any network call; a changed but
    /// still present token is only stored.
    pub async fn set_auth_token(&self, token: Option<String>) -> Result<()> {
        let token = token.filter(|t| !t.is_empty());
        let had_token = {
            let mut slot = self.inner.token.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, token.clone()).is_some()
        };

        match (had_token, token.is_some()) {
            (false, true) => {
                tracing::info!("session started; resolving project");
                let epoch = self.epoch();
                self.resolve_project().await;
                if self.epoch() != epoch {
                    tracing::debug!("session ended during project resolution; skipping refresh");
                    return Ok(());
                }
                self.refresh_snapshot(None).await.map(|_| ())
            }
            (true, false) => {
                self.reset_session();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Drop the session token and reset to the empty snapshot. Never suspends.
    pub fn sign_out(&self) {
        *self.inner.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.reset_session();
    }

    /// Store `token` without resolving a project or loading a snapshot.
    ///
    /// For one-shot callers that name their target explicitly. An empty token
    /// is ignored.
    pub fn adopt_token(&self, token: String) {
        if token.is_empty() {
            return;
        }
        *self.inner.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn reset_session(&self) {
        let default_project = self.inner.config.default_project();
        let mut change = None;
        self.inner.state.send_modify(|s| {
            change = reset_status(s);
            *s = SyncState::signed_out(
                default_project,
                s.session_epoch + 1,
                s.refresh_seq + 1,
            );
        });
        self.emit_status(change);
        tracing::info!("session ended; state reset");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Project resolution and refresh
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask the backend for the caller's default project.
    ///
    /// Falls back to the configured default project id on failure. Failures are
    /// notified, never returned.
    pub async fn resolve_project(&self) -> Option<ProjectId> {
        let token = self.token()?;
        let epoch = self.epoch();

        let failure = match self.inner.api.fetch_default_project(&token).await {
            Ok(raw) => match normalize_project(&raw) {
                Some(project) => {
                    let id = project.id.clone();
                    let applied = self.update(epoch, |s| {
                        s.project_id = Some(project.id.clone());
                        s.project = Some(project);
                    });
                    if !applied {
                        return None;
                    }
                    tracing::info!(project_id = %id, "resolved default project");
                    return Some(id);
                }
                None => SyncError::Decode("default project response has no id".to_string()),
            },
            Err(err) => err,
        };

        tracing::warn!(error = %failure, "failed to resolve default project");
        self.inner
            .notices
            .error(format!("Could not load your project: {failure}"));

        let fallback = self.inner.config.default_project()?;
        self.update(epoch, |s| s.project_id = Some(fallback.clone()))
            .then_some(fallback)
    }

    /// Replace the script data with the backend's snapshot of `target`
    /// (default: the current project).
    ///
    /// Returns `Ok(None)` without side effects when there is no session or no
    /// project, and `Ok(None)` when a later refresh superseded this one.
    pub async fn refresh_snapshot(
        &self,
        target: Option<ProjectId>,
    ) -> Result<Option<ProjectSnapshot>> {
        self.refresh_with(target, Feedback::Notify).await
    }

    async fn refresh_with(
        &self,
        target: Option<ProjectId>,
        feedback: Feedback,
    ) -> Result<Option<ProjectSnapshot>> {
        let Some(token) = self.token() else {
            return Ok(None);
        };
        let Some(target) = target.or_else(|| self.state().project_id) else {
            return Ok(None);
        };

        let epoch = self.epoch();
        let Some(seq) = self.begin_refresh(epoch) else {
            return Ok(None);
        };
        let _loading = LoadingGuard {
            core: self,
            epoch,
        };

        tracing::debug!(project_id = %target, seq, "fetching snapshot");
        let raw = match self.inner.api.fetch_snapshot(&token, &target).await {
            Ok(raw) => raw,
            Err(err) => {
                if feedback == Feedback::Notify {
                    self.inner.notices.error(err.to_string());
                }
                return Err(err);
            }
        };

        let snapshot = normalize_snapshot(Some(&raw));
        if self.apply_snapshot(epoch, seq, &target, snapshot.clone()) {
            tracing::info!(project_id = %target, scenes = snapshot.script_data.scene_data.len(), "snapshot applied");
            Ok(Some(snapshot))
        } else {
            tracing::debug!(project_id = %target, seq, "discarding superseded snapshot");
            Ok(None)
        }
    }

    /// Issue a new refresh sequence number and mark a refresh in flight.
    fn begin_refresh(&self, epoch: u64) -> Option<u64> {
        let mut seq = None;
        self.inner.state.send_if_modified(|s| {
            if s.session_epoch != epoch {
                return false;
            }
            s.refresh_seq += 1;
            s.refreshes_in_flight += 1;
            seq = Some(s.refresh_seq);
            let was_loading = s.is_loading_snapshot;
            s.is_loading_snapshot = true;
            !was_loading
        });
        seq
    }

    /// Issue a sequence number without a fetch, invalidating older refreshes.
    fn supersede_refreshes(&self, epoch: u64) -> Option<u64> {
        let mut seq = None;
        self.inner.state.send_if_modified(|s| {
            if s.session_epoch == epoch {
                s.refresh_seq += 1;
                seq = Some(s.refresh_seq);
            }
            false
        });
        seq
    }

    /// Full replacement of project and script data, if `seq` is still the latest.
    fn apply_snapshot(
        &self,
        epoch: u64,
        seq: u64,
        target: &ProjectId,
        snapshot: ProjectSnapshot,
    ) -> bool {
        self.inner.state.send_if_modified(|s| {
            if s.session_epoch != epoch || s.refresh_seq != seq {
                return false;
            }
            s.last_analyzed_filename = snapshot.script_name().map(str::to_string);
            s.project = snapshot.project;
            s.script_data = snapshot.script_data;
            if s.project_id.as_ref() != Some(target) {
                s.project_id = Some(target.clone());
            }
            true
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Upload and analysis
    // ─────────────────────────────────────────────────────────────────────────

    /// Upload `file` to the current project and analyze it.
    ///
    /// Status goes `uploading → analyzing → completed`, or ends at `error`.
    /// On failure the optimistic `Processing` placeholder is left in place
    /// until the next successful refresh. Returns the canonical filename.
    pub async fn upload_and_analyze(&self, file: ScriptFile) -> Result<String> {
        let token = self.require_token()?;
        let project_id = self.require_project().await?;
        let epoch = self.epoch();

        self.update(epoch, |s| {
            s.script_data.uploaded_script = Some(UploadedScript::processing(&file.name));
        });
        self.set_status(epoch, AnalysisStatus::Uploading, UPLOADING_MESSAGE);
        tracing::info!(project_id = %project_id, file = %file.name, "uploading script");

        let result = async {
            let receipt = self
                .inner
                .api
                .upload_script(&token, &project_id, &file)
                .await?;
            let filename = upload_filename(&receipt).unwrap_or_else(|| file.name.clone());
            self.analyze_and_adopt(epoch, &token, &project_id, &filename)
                .await?;
            Ok::<_, SyncError>(filename)
        }
        .await;

        self.finish_analysis(epoch, result)
    }

    /// Re-run analysis on the script already attached to the project.
    pub async fn run_script_breakdown(&self) -> Result<String> {
        let token = self.require_token()?;
        let project_id = self.require_project().await?;
        let filename = self
            .state()
            .known_script_name()
            .map(str::to_string)
            .ok_or(SyncError::NothingToAnalyze)?;
        let epoch = self.epoch();

        tracing::info!(project_id = %project_id, file = %filename, "re-running script breakdown");
        let result = self
            .analyze_and_adopt(epoch, &token, &project_id, &filename)
            .await
            .map(|()| filename);

        self.finish_analysis(epoch, result)
    }

    async fn analyze_and_adopt(
        &self,
        epoch: u64,
        token: &str,
        project_id: &ProjectId,
        filename: &str,
    ) -> Result<()> {
        self.set_status(epoch, AnalysisStatus::Analyzing, ANALYZING_MESSAGE);
        let response = self
            .inner
            .api
            .analyze_script(token, project_id, filename)
            .await?;

        match embedded_snapshot(&response) {
            Some(raw) => {
                let snapshot = normalize_snapshot(Some(raw));
                if let Some(seq) = self.supersede_refreshes(epoch) {
                    self.apply_snapshot(epoch, seq, project_id, snapshot);
                }
            }
            None => {
                self.refresh_with(Some(project_id.clone()), Feedback::Silent)
                    .await?;
            }
        }
        Ok(())
    }

    fn finish_analysis(&self, epoch: u64, result: Result<String>) -> Result<String> {
        let current = self.epoch() == epoch;
        match result {
            Ok(filename) => {
                self.update(epoch, |s| s.last_analyzed_filename = Some(filename.clone()));
                self.set_status(epoch, AnalysisStatus::Completed, COMPLETED_MESSAGE);
                if current {
                    self.inner
                        .notices
                        .success(format!("Script \"{filename}\" analyzed successfully."));
                }
                Ok(filename)
            }
            Err(err) => {
                let message = err.to_string();
                let message = if message.trim().is_empty() {
                    FAILED_MESSAGE.to_string()
                } else {
                    message
                };
                tracing::warn!(error = %message, "script analysis failed");
                self.set_status(epoch, AnalysisStatus::Error, message.clone());
                if current {
                    self.inner.notices.error(message);
                }
                Err(err)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Projects and reports
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a project, make it current with empty script data, then refresh it.
    pub async fn create_new_project(
        &self,
        overrides: NewProjectOverrides,
    ) -> Result<ProjectRecord> {
        let token = self.require_token()?;
        let epoch = self.epoch();
        let _creating = CreatingGuard::begin(self, epoch);

        let defaults = &self.inner.config.new_project;
        let request = CreateProjectRequest {
            name: overrides
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| {
                    format!(
                        "{} {}",
                        defaults.name_prefix,
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
                    )
                }),
            description: overrides
                .description
                .unwrap_or_else(|| defaults.description.clone()),
            budget: overrides.budget.unwrap_or(defaults.budget),
        };

        let created = self
            .inner
            .api
            .create_project(&token, &request)
            .await
            .and_then(|raw| {
                normalize_project(&raw).ok_or_else(|| {
                    SyncError::Decode("created project response has no id".to_string())
                })
            });
        let project = match created {
            Ok(project) => project,
            Err(err) => {
                tracing::warn!(error = %err, "project creation failed");
                self.inner.notices.error(err.to_string());
                return Err(err);
            }
        };

        self.supersede_refreshes(epoch);
        let mut change = None;
        self.update(epoch, |s| {
            s.project_id = Some(project.id.clone());
            s.project = Some(project.clone());
            s.script_data = EMPTY_SCRIPT_DATA;
            s.last_analyzed_filename = None;
            change = reset_status(s);
        });
        self.emit_status(change);

        tracing::info!(project_id = %project.id, name = %request.name, "project created");
        self.inner
            .notices
            .success(format!("Project \"{}\" created.", request.name));

        if let Err(err) = self.refresh_snapshot(Some(project.id.clone())).await {
            tracing::warn!(error = %err, "refresh after project creation failed");
        }
        Ok(project)
    }

    /// The caller's projects.
    pub async fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        let token = self.require_token()?;
        match self.inner.api.list_projects(&token).await {
            Ok(raw) => Ok(normalize_project_list(&raw)),
            Err(err) => {
                self.inner.notices.error(err.to_string());
                Err(err)
            }
        }
    }

    /// Report aggregate for the current project.
    ///
    /// A 404 means the backend has no derived data for the project yet: the
    /// snapshot is refreshed once, silently, and `Ok(None)` is returned.
    pub async fn load_reports(&self) -> Result<Option<Value>> {
        let token = self.require_token()?;
        let project_id = self.state().project_id.ok_or(SyncError::NoProject)?;

        match self.inner.api.fetch_reports(&token, &project_id).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.is_not_found() => {
                tracing::debug!(project_id = %project_id, "reports missing; repairing snapshot");
                if let Err(repair) = self
                    .refresh_with(Some(project_id), Feedback::Silent)
                    .await
                {
                    tracing::debug!(error = %repair, "snapshot repair failed");
                }
                Ok(None)
            }
            Err(err) => {
                self.inner.notices.error(err.to_string());
                Err(err)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local edits
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a local, non-persisted edit. The next refresh overwrites it.
    pub fn merge_script_data(&self, edit: impl FnOnce(&mut ScriptData)) {
        self.inner.state.send_modify(|s| edit(&mut s.script_data));
    }

    /// Append a client-side scene and re-estimate the local budget.
    pub fn add_local_scene(&self, label: &str, location: &str) -> Result<()> {
        if label.trim().is_empty() {
            return Err(SyncError::InvalidInput(
                "Please provide a scene name".to_string(),
            ));
        }
        self.merge_script_data(|data| {
            let index = data.scene_data.len() as u64 + 1;
            data.scene_data.push(Scene::local(label, location, index));
            data.budget = estimate_local_budget(&data.scene_data);
        });
        Ok(())
    }

    /// Replace a scene's characters from a comma separated list.
    /// Returns false when `position` is out of range.
    pub fn set_scene_characters(&self, position: usize, csv: &str) -> bool {
        let mut found = false;
        self.inner.state.send_if_modified(|s| {
            let data = &mut s.script_data;
            let Some(scene) = data.scene_data.get_mut(position) else {
                return false;
            };
            scene.characters = parse_character_list(csv);
            data.budget = estimate_local_budget(&data.scene_data);
            found = true;
            true
        });
        found
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn token(&self) -> Option<String> {
        self.inner
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_token(&self) -> Result<String> {
        self.token().ok_or(SyncError::AuthRequired)
    }

    /// Current project id, resolving it once if needed.
    async fn require_project(&self) -> Result<ProjectId> {
        if let Some(id) = self.state().project_id {
            return Ok(id);
        }
        self.resolve_project().await.ok_or(SyncError::NoProject)
    }

    fn epoch(&self) -> u64 {
        self.inner.state.borrow().session_epoch
    }

    /// Apply `edit` only if the session that started the operation is still live.
    fn update(&self, epoch: u64, edit: impl FnOnce(&mut SyncState)) -> bool {
        self.inner.state.send_if_modified(|s| {
            if s.session_epoch != epoch {
                return false;
            }
            edit(s);
            true
        })
    }

    fn set_status(&self, epoch: u64, next: AnalysisStatus, message: impl Into<String>) {
        let message = message.into();
        let mut change = None;
        self.update(epoch, |s| {
            if let Err(illegal) = s.analysis_status.transition(next) {
                tracing::warn!(error = %illegal, "applying out-of-order status transition");
            }
            change = Some(StatusChange {
                from: s.analysis_status,
                to: next,
                message: message.clone(),
            });
            s.analysis_status = next;
            s.status_message = message;
        });
        self.emit_status(change);
    }

    fn emit_status(&self, change: Option<StatusChange>) {
        if let Some(change) = change {
            tracing::debug!(from = %change.from, to = %change.to, "analysis status");
            let _ = self.inner.status_tx.send(change);
        }
    }
}

/// Return the status to `Idle`, yielding the change event if it moved.
fn reset_status(s: &mut SyncState) -> Option<StatusChange> {
    let from = s.analysis_status;
    s.analysis_status = AnalysisStatus::Idle;
    s.status_message = String::new();
    (from != AnalysisStatus::Idle).then(|| StatusChange {
        from,
        to: AnalysisStatus::Idle,
        message: String::new(),
    })
}

/// Keeps `is_loading_snapshot` true while any refresh of the session is in flight.
struct LoadingGuard<'a> {
    core: &'a ProjectSyncCore,
    epoch: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let epoch = self.epoch;
        self.core.inner.state.send_if_modified(|s| {
            if s.session_epoch != epoch {
                return false;
            }
            s.refreshes_in_flight = s.refreshes_in_flight.saturating_sub(1);
            let loading = s.refreshes_in_flight > 0;
            let changed = s.is_loading_snapshot != loading;
            s.is_loading_snapshot = loading;
            changed
        });
    }
}

struct CreatingGuard<'a> {
    core: &'a ProjectSyncCore,
    epoch: u64,
}

impl<'a> CreatingGuard<'a> {
    fn begin(core: &'a ProjectSyncCore, epoch: u64) -> Self {
        core.update(epoch, |s| s.is_creating_project = true);
        Self { core, epoch }
    }
}

impl Drop for CreatingGuard<'_> {
    fn drop(&mut self) {
        self.core
            .update(self.epoch, |s| s.is_creating_project = false);
    }
}
