//! Keeps a [`ProjectSyncCore`] in step with an auth-token source.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::sync_core::ProjectSyncCore;

/// Background task feeding token changes into [`ProjectSyncCore::set_auth_token`].
///
/// Dropping the watcher cancels the task, so a torn-down view never keeps
/// updating state.
pub struct SessionWatcher {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SessionWatcher {
    /// Start watching. The receiver's current value is processed first.
    pub fn spawn(core: ProjectSyncCore, mut tokens: watch::Receiver<Option<String>>) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                let token = tokens.borrow_and_update().clone();
                let change = core.set_auth_token(token);
                tokio::pin!(change);

                // A revoked token must not wait for an in-flight sign-in.
                let mut source_open = true;
                let mut pending = false;
                loop {
                    tokio::select! {
                        _ = task_cancel.cancelled() => return,
                        result = &mut change => {
                            if let Err(err) = result {
                                tracing::warn!(error = %err, "session change handling failed");
                            }
                            break;
                        }
                        changed = tokens.changed(), if source_open => {
                            if changed.is_err() {
                                source_open = false;
                                continue;
                            }
                            pending = true;
                            if tokens.borrow().as_deref().is_none_or(str::is_empty) {
                                tracing::info!("token revoked while session change in flight");
                                core.sign_out();
                                break;
                            }
                        }
                    }
                }

                if pending {
                    continue;
                }
                if !source_open {
                    tracing::debug!("token source closed; stopping session watcher");
                    return;
                }
                tokio::select! {
                    _ = task_cancel.cancelled() => return,
                    changed = tokens.changed() => {
                        if changed.is_err() {
                            tracing::debug!("token source closed; stopping session watcher");
                            return;
                        }
                    }
                }
            }
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "session watcher task failed");
        }
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
