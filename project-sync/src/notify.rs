//! Transient user-facing notifications.
//!
//! The core reports outcomes ("Script analyzed", backend error messages) through a
//! [`NoticeCenter`]. A front end installs its [`Notifier`] for as long as it is
//! alive; the returned [`NoticeHookGuard`] removes it again on drop. With no
//! notifier installed, notices go to the `tracing` log instead.

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Receives notices. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

impl<F> Notifier for F
where
    F: Fn(&Notice) + Send + Sync,
{
    fn notify(&self, notice: &Notice) {
        self(notice)
    }
}

/// Notifier that fans notices out to any number of broadcast subscribers.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: broadcast::Sender<Notice>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: &Notice) {
        // No subscribers is fine; the notice is simply dropped.
        let _ = self.tx.send(notice.clone());
    }
}

type Slot = Arc<RwLock<Option<Arc<dyn Notifier>>>>;

/// Holds the currently installed notifier, if any.
#[derive(Clone, Default)]
pub struct NoticeCenter {
    slot: Slot,
}

impl NoticeCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `notifier`, replacing any previous one, until the guard drops.
    #[must_use = "the notifier is uninstalled when the guard is dropped"]
    pub fn install(&self, notifier: Arc<dyn Notifier>) -> NoticeHookGuard {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::clone(&notifier));
        NoticeHookGuard {
            slot: Arc::clone(&self.slot),
            installed: notifier,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn notify(&self, notice: Notice) {
        let notifier = self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match notifier {
            Some(notifier) => notifier.notify(&notice),
            None => match notice.level {
                NoticeLevel::Error => {
                    tracing::warn!(message = %notice.message, "notice (no notifier installed)")
                }
                NoticeLevel::Info | NoticeLevel::Success => {
                    tracing::info!(message = %notice.message, "notice (no notifier installed)")
                }
            },
        }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(Notice::success(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(Notice::error(message));
    }
}

/// Uninstalls its notifier on drop, unless another one replaced it meanwhile.
pub struct NoticeHookGuard {
    slot: Slot,
    installed: Arc<dyn Notifier>,
}

impl Drop for NoticeHookGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &self.installed))
        {
            *slot = None;
        }
    }
}
