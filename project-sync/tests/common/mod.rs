#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tokio::sync::oneshot;
use w2f_project_sync::CreateProjectRequest;
use w2f_project_sync::Notice;
use w2f_project_sync::NoticeCenter;
use w2f_project_sync::NoticeHookGuard;
use w2f_project_sync::NoticeLevel;
use w2f_project_sync::ProjectApi;
use w2f_project_sync::ProjectId;
use w2f_project_sync::ProjectSyncCore;
use w2f_project_sync::ScriptFile;
use w2f_project_sync::SyncConfig;
use w2f_project_sync::SyncError;

pub const UPLOAD: &str = "upload_script";
pub const ANALYZE: &str = "analyze_script";
pub const SNAPSHOT: &str = "snapshot";
pub const LIST: &str = "list_projects";
pub const DEFAULT_PROJECT: &str = "default_project";
pub const CREATE: &str = "create_project";
pub const REPORTS: &str = "reports";

pub const TOKEN: &str = "test-token";

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub endpoint: &'static str,
    pub project: Option<String>,
    pub detail: Option<String>,
}

struct Reply {
    result: Result<Value, (u16, String)>,
    gate: Option<oneshot::Receiver<()>>,
}

type Key = (&'static str, Option<String>);

/// Scripted in-memory backend. Replies are consumed in order per endpoint
/// (optionally per project); unscripted calls fail with a 500.
#[derive(Default)]
pub struct MockProjectApi {
    replies: Mutex<HashMap<Key, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockProjectApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, endpoint: &'static str, project: Option<&str>, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry((endpoint, project.map(str::to_string)))
            .or_default()
            .push_back(reply);
    }

    pub fn reply(&self, endpoint: &'static str, project: Option<&str>, body: Value) {
        self.push(endpoint, project, Reply { result: Ok(body), gate: None });
    }

    pub fn fail(&self, endpoint: &'static str, project: Option<&str>, status: u16, message: &str) {
        self.push(
            endpoint,
            project,
            Reply {
                result: Err((status, message.to_string())),
                gate: None,
            },
        );
    }

    /// Reply held back until the returned sender fires.
    pub fn gated_reply(
        &self,
        endpoint: &'static str,
        project: Option<&str>,
        body: Value,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(
            endpoint,
            project,
            Reply {
                result: Ok(body),
                gate: Some(rx),
            },
        );
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.calls().iter().filter(|c| c.endpoint == endpoint).count()
    }

    pub fn count_for(&self, endpoint: &str, project: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.endpoint == endpoint && c.project.as_deref() == Some(project))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Wait until `endpoint` has been called at least `n` times.
    pub async fn wait_for_calls(&self, endpoint: &str, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.count(endpoint) < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("timed out waiting for backend call");
    }

    async fn answer(
        &self,
        endpoint: &'static str,
        project: Option<&ProjectId>,
        detail: Option<String>,
    ) -> Result<Value, SyncError> {
        let project = project.map(|p| p.as_str().to_string());
        self.calls.lock().unwrap().push(Call {
            endpoint,
            project: project.clone(),
            detail,
        });

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            replies
                .get_mut(&(endpoint, project.clone()))
                .and_then(VecDeque::pop_front)
                .or_else(|| replies.get_mut(&(endpoint, None)).and_then(VecDeque::pop_front))
        };
        let Some(reply) = reply else {
            return Err(SyncError::api(500, format!("unscripted call: {endpoint}")));
        };
        if let Some(gate) = reply.gate {
            let _ = gate.await;
        }
        reply
            .result
            .map_err(|(status, message)| SyncError::api(status, message))
    }
}

#[async_trait]
impl ProjectApi for MockProjectApi {
    async fn upload_script(
        &self,
        _token: &str,
        project_id: &ProjectId,
        file: &ScriptFile,
    ) -> Result<Value, SyncError> {
        self.answer(UPLOAD, Some(project_id), Some(file.name.clone()))
            .await
    }

    async fn analyze_script(
        &self,
        _token: &str,
        project_id: &ProjectId,
        filename: &str,
    ) -> Result<Value, SyncError> {
        self.answer(ANALYZE, Some(project_id), Some(filename.to_string()))
            .await
    }

    async fn fetch_snapshot(&self, _token: &str, project_id: &ProjectId) -> Result<Value, SyncError> {
        self.answer(SNAPSHOT, Some(project_id), None).await
    }

    async fn list_projects(&self, _token: &str) -> Result<Value, SyncError> {
        self.answer(LIST, None, None).await
    }

    async fn fetch_default_project(&self, _token: &str) -> Result<Value, SyncError> {
        self.answer(DEFAULT_PROJECT, None, None).await
    }

    async fn create_project(
        &self,
        _token: &str,
        request: &CreateProjectRequest,
    ) -> Result<Value, SyncError> {
        self.answer(CREATE, None, Some(request.name.clone())).await
    }

    async fn fetch_reports(&self, _token: &str, project_id: &ProjectId) -> Result<Value, SyncError> {
        self.answer(REPORTS, Some(project_id), None).await
    }
}

/// Notifier that records every notice it receives.
#[derive(Clone, Default)]
pub struct NoticeLog {
    seen: Arc<Mutex<Vec<Notice>>>,
}

impl NoticeLog {
    pub fn install(&self, center: &NoticeCenter) -> NoticeHookGuard {
        let seen = Arc::clone(&self.seen);
        center.install(Arc::new(move |notice: &Notice| {
            seen.lock().unwrap().push(notice.clone());
        }))
    }

    pub fn all(&self) -> Vec<Notice> {
        self.seen.lock().unwrap().clone()
    }

    pub fn of(&self, level: NoticeLevel) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|n| n.level == level)
            .map(|n| n.message)
            .collect()
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }
}

pub struct Harness {
    pub api: Arc<MockProjectApi>,
    pub core: ProjectSyncCore,
    pub notices: NoticeLog,
    _guard: NoticeHookGuard,
}

pub fn harness() -> Harness {
    harness_with_config(SyncConfig::default())
}

pub fn harness_with_config(config: SyncConfig) -> Harness {
    let api = MockProjectApi::new();
    let center = NoticeCenter::new();
    let notices = NoticeLog::default();
    let guard = notices.install(&center);
    let core = ProjectSyncCore::new(api.clone(), config, center);
    Harness {
        api,
        core,
        notices,
        _guard: guard,
    }
}

impl Harness {
    /// Sign in against a backend whose default project is `project_id`, then
    /// forget the calls and notices the sign-in produced.
    pub async fn signed_in(&self, project_id: i64, snapshot: Value) {
        self.api
            .reply(DEFAULT_PROJECT, None, project_json(project_id, "Pilot"));
        let id = project_id.to_string();
        self.api.reply(SNAPSHOT, Some(id.as_str()), snapshot);
        self.core
            .set_auth_token(Some(TOKEN.to_string()))
            .await
            .expect("sign in");
        self.api.clear_calls();
        self.notices.clear();
    }
}

pub fn project_json(id: i64, name: &str) -> Value {
    json!({ "id": id, "name": name, "description": "", "budget": 0.0 })
}

/// Backend snapshot with one scene and, optionally, an attached script.
pub fn snapshot_json(id: i64, name: &str, script: Option<&str>) -> Value {
    let mut script_data = json!({
        "projectId": id,
        "sceneData": [{
            "id": format!("s{id}"),
            "index": 1,
            "scene": format!("{name} opening"),
            "location": "Beach",
            "characters": ["MAYA"],
            "props": []
        }],
        "budget": { "total": 1200, "perScene": [{ "scene": format!("{name} opening"), "total": 1200 }] }
    });
    if let Some(script) = script {
        script_data["uploadedScript"] = json!({ "name": script, "id": 1, "uploadedAt": "2026-01-01T00:00:00" });
    }
    json!({ "project": project_json(id, name), "scriptData": script_data })
}
