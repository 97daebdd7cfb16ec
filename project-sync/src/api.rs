//! Backend API client.
//!
//! [`ProjectApi`] is the seam between the sync core and the script-analysis
//! backend. [`HttpProjectApi`] implements it over reqwest:
//!
//! | Operation        | Request                                   |
//! |------------------|-------------------------------------------|
//! | upload script    | `POST /projects/{id}/upload_script` (multipart `file`) |
//! | analyze script   | `POST /projects/{id}/analyze_script` `{filename}` |
//! | snapshot         | `GET /projects/{id}/snapshot`             |
//! | list projects    | `GET /projects/`                          |
//! | default project  | `GET /projects/default`                   |
//! | create project   | `POST /projects/` `{name, description, budget}` |
//! | reports          | `GET /projects/{id}/reports`              |
//!
//! Every call carries `Authorization: Bearer <token>`. Bodies are returned
//! undecoded as [`serde_json::Value`]; shaping them is the job of
//! [`crate::normalize`].

use std::path::Path;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::SyncConfig;
use crate::errors::{Result, SyncError};
use crate::model::ProjectId;

/// A script file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ScriptFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SyncError::MissingFile);
        }
        Ok(Self {
            name,
            bytes: bytes.into(),
        })
    }

    /// Read a script from disk, naming it after the file.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or(SyncError::MissingFile)?;
        let bytes = tokio::fs::read(path).await.map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(name, bytes)
    }

    fn mime(&self) -> String {
        mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// Body of `POST /projects/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: String,
    pub budget: f64,
}

/// Script-analysis backend operations used by the sync core.
#[async_trait]
pub trait ProjectApi: Send + Sync {
    async fn upload_script(
        &self,
        token: &str,
        project_id: &ProjectId,
        file: &ScriptFile,
    ) -> Result<Value>;

    async fn analyze_script(
        &self,
        token: &str,
        project_id: &ProjectId,
        filename: &str,
    ) -> Result<Value>;

    async fn fetch_snapshot(&self, token: &str, project_id: &ProjectId) -> Result<Value>;

    async fn list_projects(&self, token: &str) -> Result<Value>;

    async fn fetch_default_project(&self, token: &str) -> Result<Value>;

    async fn create_project(&self, token: &str, request: &CreateProjectRequest) -> Result<Value>;

    async fn fetch_reports(&self, token: &str, project_id: &ProjectId) -> Result<Value>;
}

/// reqwest-backed [`ProjectApi`].
#[derive(Debug, Clone)]
pub struct HttpProjectApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProjectApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.base_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            SyncError::config_with_source(format!("invalid api base URL {:?}", self.base_url), e)
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                SyncError::config(format!("api base URL cannot take a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(
        &self,
        method: reqwest::Method,
        segments: &[&str],
        token: &str,
    ) -> Result<reqwest::RequestBuilder> {
        let mut builder = self
            .client
            .request(method, self.url(segments)?)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if !token.is_empty() {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value> {
        let response = builder.send().await?;
        tracing::debug!(
            url = %response.url(),
            status = response.status().as_u16(),
            "backend response"
        );
        decode_response(response).await
    }
}

#[async_trait]
impl ProjectApi for HttpProjectApi {
    async fn upload_script(
        &self,
        token: &str,
        project_id: &ProjectId,
        file: &ScriptFile,
    ) -> Result<Value> {
        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime())?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let builder = self
            .request(
                reqwest::Method::POST,
                &["projects", project_id.as_str(), "upload_script"],
                token,
            )?
            .multipart(form);
        self.send(builder).await
    }

    async fn analyze_script(
        &self,
        token: &str,
        project_id: &ProjectId,
        filename: &str,
    ) -> Result<Value> {
        let builder = self
            .request(
                reqwest::Method::POST,
                &["projects", project_id.as_str(), "analyze_script"],
                token,
            )?
            .json(&serde_json::json!({ "filename": filename }));
        self.send(builder).await
    }

    async fn fetch_snapshot(&self, token: &str, project_id: &ProjectId) -> Result<Value> {
        let builder = self.request(
            reqwest::Method::GET,
            &["projects", project_id.as_str(), "snapshot"],
            token,
        )?;
        self.send(builder).await
    }

    async fn list_projects(&self, token: &str) -> Result<Value> {
        self.send(self.request(reqwest::Method::GET, &["projects", ""], token)?)
            .await
    }

    async fn fetch_default_project(&self, token: &str) -> Result<Value> {
        self.send(self.request(reqwest::Method::GET, &["projects", "default"], token)?)
            .await
    }

    async fn create_project(&self, token: &str, request: &CreateProjectRequest) -> Result<Value> {
        let builder = self
            .request(reqwest::Method::POST, &["projects", ""], token)?
            .json(request);
        self.send(builder).await
    }

    async fn fetch_reports(&self, token: &str, project_id: &ProjectId) -> Result<Value> {
        let builder = self.request(
            reqwest::Method::GET,
            &["projects", project_id.as_str(), "reports"],
            token,
        )?;
        self.send(builder).await
    }
}

fn is_json(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"))
}

/// 204 → `Null`, JSON → parsed, anything else → `Value::String`.
/// Non-2xx responses become [`SyncError::Api`].
async fn decode_response(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let message = error_message(response).await;
        return Err(SyncError::api(status.as_u16(), message));
    }

    if status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }

    if is_json(&response) {
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::Decode(format!("invalid JSON body: {e}")));
    }

    Ok(Value::String(response.text().await?))
}

/// Backend `detail`/`message` for JSON errors, raw text otherwise.
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let fallback = || {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| "Unknown error".to_string())
    };

    let message = if is_json(&response) {
        match response.json::<Value>().await {
            Ok(body) => json_error_message(&body),
            Err(_) => fallback(),
        }
    } else {
        response.text().await.unwrap_or_else(|_| fallback())
    };

    if message.trim().is_empty() {
        format!("Request failed with status {}", status.as_u16())
    } else {
        message
    }
}

fn json_error_message(body: &Value) -> String {
    for key in ["detail", "message"] {
        match body.get(key) {
            Some(Value::String(s)) if s.is_empty() => {}
            Some(Value::String(s)) => return s.clone(),
            Some(Value::Null) | None => {}
            Some(other) => return other.to_string(),
        }
    }
    body.to_string()
}
