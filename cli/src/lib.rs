//! `w2f`: drive the Words2Frame project sync core from a terminal.
//!
//! ## Exit codes
//! - 0: success
//! - 1: backend or precondition failure
//! - 2: configuration failure

mod output;

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use w2f_project_sync::{
    ErrorCategory, NewProjectOverrides, NoticeCenter, ProjectId, ProjectSnapshot,
    ProjectSyncCore, ScriptFile, SyncConfig, SyncError,
};

pub use output::{Report, TerminalNotifier};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// Words2Frame project sync client
#[derive(Debug, Parser)]
#[command(name = "w2f", version, about)]
pub struct Cli {
    /// Config file (default: $W2F_SYNC_CONFIG or ~/.config/words2frame/sync.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Backend access token
    #[arg(long, global = true, env = "W2F_AUTH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Output as JSON for automation
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List your projects
    Projects,
    /// Show the project the backend resolves as your default
    Resolve,
    /// Show the normalized snapshot of a project
    Snapshot(SnapshotArgs),
    /// Upload a script to the current project and analyze it
    Upload(UploadArgs),
    /// Re-run analysis on the script already attached to the project
    Reanalyze,
    /// Create a project and make it current
    Create(CreateArgs),
    /// Fetch the report aggregate of the current project
    Reports,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Project to show instead of the default one
    #[arg(long, value_name = "ID")]
    pub project: Option<String>,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Script file (.pdf, .docx, .txt, .fdx)
    #[arg(value_name = "PATH")]
    pub path: PathBuf,
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub budget: Option<f64>,
}

impl Cli {
    pub async fn run(self) -> i32 {
        let config = match load_config(self.config.as_deref()) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error: {err}");
                return EXIT_CONFIG;
            }
        };

        let notices = NoticeCenter::new();
        let _hook = notices.install(Arc::new(TerminalNotifier));
        let core = w2f_project_sync::connect(config, notices);

        let json = self.json;
        match self.execute(&core).await {
            Ok(report) => {
                if json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&report.to_json()).unwrap_or_default()
                    );
                } else {
                    println!("{}", report.human());
                }
                EXIT_OK
            }
            Err(err) => {
                tracing::debug!(category = err.category().as_str(), error = %err, "command failed");
                if !already_notified(&err) {
                    eprintln!("error: {err}");
                }
                exit_code(&err)
            }
        }
    }

    async fn execute(self, core: &ProjectSyncCore) -> Result<Report, SyncError> {
        let token = self
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or(SyncError::AuthRequired)?;

        // Only commands that read the default project's snapshot pay for loading it.
        let needs_default_snapshot = match &self.command {
            Command::Projects | Command::Create(_) => false,
            Command::Snapshot(args) => args.project.is_none(),
            Command::Resolve | Command::Upload(_) | Command::Reanalyze | Command::Reports => true,
        };
        let session = if needs_default_snapshot {
            core.set_auth_token(Some(token)).await
        } else {
            core.adopt_token(token);
            Ok(())
        };
        if let Err(err) = &session {
            tracing::debug!(error = %err, "initial snapshot load failed");
        }

        match self.command {
            Command::Projects => core.list_projects().await.map(Report::Projects),
            Command::Resolve => {
                let state = core.state();
                Ok(Report::Resolved(state.project_id, state.project))
            }
            Command::Snapshot(args) => {
                match args.project {
                    Some(id) => {
                        core.refresh_snapshot(Some(ProjectId::from(id))).await?;
                    }
                    None => session?,
                }
                Ok(Report::Snapshot(current_snapshot(core)))
            }
            Command::Upload(args) => {
                let file = ScriptFile::from_path(&args.path).await?;
                let filename = core.upload_and_analyze(file).await?;
                Ok(Report::Analyzed(filename, current_snapshot(core)))
            }
            Command::Reanalyze => {
                session?;
                let filename = core.run_script_breakdown().await?;
                Ok(Report::Analyzed(filename, current_snapshot(core)))
            }
            Command::Create(args) => {
                let project = core
                    .create_new_project(NewProjectOverrides {
                        name: args.name,
                        description: args.description,
                        budget: args.budget,
                    })
                    .await?;
                Ok(Report::Created(project))
            }
            Command::Reports => core.load_reports().await.map(Report::Reports),
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig, SyncError> {
    match path {
        Some(path) => SyncConfig::load_from_path(path)?
            .with_env_overrides(|key| std::env::var(key).ok()),
        None => SyncConfig::load(),
    }
}

fn current_snapshot(core: &ProjectSyncCore) -> ProjectSnapshot {
    let state = core.state();
    ProjectSnapshot {
        project: state.project,
        script_data: state.script_data,
    }
}

/// Backend and transport failures were already shown as notices by the core.
fn already_notified(err: &SyncError) -> bool {
    matches!(
        err,
        SyncError::Api { .. } | SyncError::Network(_) | SyncError::Decode(_)
    )
}

fn exit_code(err: &SyncError) -> i32 {
    match err.category() {
        ErrorCategory::Config => EXIT_CONFIG,
        ErrorCategory::Precondition | ErrorCategory::Backend | ErrorCategory::Transport => {
            EXIT_FAILURE
        }
    }
}
