//! Sync core configuration loading
//!
//! Loads configuration from `~/.config/words2frame/sync.toml` (or `W2F_SYNC_CONFIG` env),
//! then applies `W2F_API_BASE_URL` / `W2F_DEFAULT_PROJECT_ID` overrides.
//! A missing file is not an error: defaults apply.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::errors::{Result, SyncError};
use crate::model::ProjectId;

/// Root configuration for the sync core
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SyncConfig {
    /// Base URL of the script-analysis backend
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Project used when the backend cannot resolve a default project
    #[serde(default)]
    pub default_project_id: Option<String>,

    /// Defaults for `createNewProject`
    #[serde(default)]
    pub new_project: NewProjectDefaults,
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

/// Request defaults applied when creating a project without overrides
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct NewProjectDefaults {
    /// Prefix of the generated, timestamped project name
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    #[serde(default = "default_description")]
    pub description: String,

    #[serde(default = "default_budget")]
    pub budget: f64,
}

fn default_name_prefix() -> String {
    "Untitled Project".to_string()
}

fn default_description() -> String {
    "Project created from the Words2Frame dashboard".to_string()
}

fn default_budget() -> f64 {
    0.0
}

impl Default for NewProjectDefaults {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            description: default_description(),
            budget: default_budget(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            default_project_id: None,
            new_project: NewProjectDefaults::default(),
        }
    }
}

impl SyncConfig {
    /// Environment variable overriding the config file location
    pub const ENV_CONFIG_PATH: &'static str = "W2F_SYNC_CONFIG";
    pub const ENV_API_BASE_URL: &'static str = "W2F_API_BASE_URL";
    pub const ENV_DEFAULT_PROJECT_ID: &'static str = "W2F_DEFAULT_PROJECT_ID";
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "sync.toml";

    /// Load configuration from the default location plus env overrides
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();
        let cfg = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            tracing::debug!(
                path = %path.display(),
                "Sync config not found, using defaults"
            );
            Self::default()
        };

        cfg.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Load configuration from a specific path (no env overrides)
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: SyncConfig = toml::from_str(contents)
            .map_err(|e| SyncError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply env overrides through `lookup` and re-validate.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup(Self::ENV_API_BASE_URL) {
            self.api_base_url = url;
        }
        if let Some(id) = lookup(Self::ENV_DEFAULT_PROJECT_ID) {
            self.default_project_id = Some(id);
        }
        self.validate()?;
        Ok(self)
    }

    /// The statically configured fallback project, if any
    pub fn default_project(&self) -> Option<ProjectId> {
        self.default_project_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ProjectId::from)
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("words2frame")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.api_base_url).map_err(|e| {
            SyncError::config_with_source(
                format!("invalid api_base_url {:?}", self.api_base_url),
                e,
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::config(format!(
                "api_base_url must be http or https, got {}",
                parsed.scheme()
            )));
        }

        if !self.new_project.budget.is_finite() || self.new_project.budget < 0.0 {
            return Err(SyncError::config(
                "new_project.budget must be a non-negative number",
            ));
        }

        if self.default_project_id.is_some() && self.default_project().is_none() {
            tracing::warn!("default_project_id is empty; treating it as unset");
        }

        Ok(())
    }
}
