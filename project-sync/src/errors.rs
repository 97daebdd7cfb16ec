//! Error types for the project sync core
//!
//! Three families of failure reach callers:
//! - precondition errors, raised before any network call
//! - backend errors, carrying the backend's message and HTTP status
//! - transport/decoding errors from the HTTP layer
//!
//! Payload normalization never produces an error; see [`crate::normalize`].

use std::path::PathBuf;

use thiserror::Error;

/// Error category for structured logging and caller-side branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing token, project, file or filename. Never retried automatically.
    Precondition,
    /// The backend answered with a non-2xx status.
    Backend,
    /// The request never produced a usable response.
    Transport,
    /// `sync.toml` or env misconfigured
    Config,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precondition => "PRECONDITION_ERROR",
            Self::Backend => "BACKEND_ERROR",
            Self::Transport => "TRANSPORT_ERROR",
            Self::Config => "CONFIG_ERROR",
        }
    }
}

/// Errors raised by [`crate::ProjectSyncCore`] operations and the API client.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Authentication required. Please sign in again.")]
    AuthRequired,

    #[error("No project is available. Create a project first.")]
    NoProject,

    #[error("No script available to analyze. Upload a script first.")]
    NothingToAnalyze,

    #[error("No file provided for upload")]
    MissingFile,

    #[error("{0}")]
    InvalidInput(String),

    /// Non-2xx response. Displays as the backend's own message.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthRequired
            | Self::NoProject
            | Self::NothingToAnalyze
            | Self::MissingFile
            | Self::InvalidInput(_) => ErrorCategory::Precondition,
            Self::Api { .. } => ErrorCategory::Backend,
            Self::Network(_) | Self::Decode(_) | Self::Io { .. } => ErrorCategory::Transport,
            Self::Config { .. } => ErrorCategory::Config,
        }
    }

    /// HTTP status of a backend error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the backend reported 404.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Create a backend error
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
