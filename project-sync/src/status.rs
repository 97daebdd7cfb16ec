//! Analysis status state machine.
//!
//! ```text
//! Idle ──► Uploading ──► Analyzing ──► Completed
//!   │          │             ▲  │
//!   │          ▼             │  ▼
//!   └──────► Error ◄─────────┘ Error
//! ```
//!
//! `Completed` and `Error` may start a new operation (`Uploading` or
//! `Analyzing`), and every state may be reset to `Idle`.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Idle,
    Uploading,
    Analyzing,
    Completed,
    Error,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// An upload or analysis is in flight.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Uploading | Self::Analyzing)
    }

    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        match (*self, next) {
            (_, Idle) => true,
            (Idle | Completed | Error, Uploading | Analyzing) => true,
            (Uploading, Analyzing | Error) => true,
            (Analyzing, Completed | Error) => true,
            _ => false,
        }
    }

    /// Checked transition.
    pub fn transition(self, next: AnalysisStatus) -> Result<AnalysisStatus, IllegalTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal analysis status transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: AnalysisStatus,
    pub to: AnalysisStatus,
}

/// A single observed status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: AnalysisStatus,
    pub to: AnalysisStatus,
    pub message: String,
}

pub(crate) const UPLOADING_MESSAGE: &str = "Uploading script...";
pub(crate) const ANALYZING_MESSAGE: &str = "Analyzing script...";
pub(crate) const COMPLETED_MESSAGE: &str = "Script analysis completed.";
pub(crate) const FAILED_MESSAGE: &str = "Script analysis failed.";
