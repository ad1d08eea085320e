//! Action-level failure reporting through the presentation collaborator.

use std::future::Future;

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub action: String,
    pub message: String,
}

/// Fire-and-forget presentation surface (toast, status bar, ...).
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => warn!(action = %notice.action, "{}", notice.message),
            NoticeLevel::Info | NoticeLevel::Success => {
                info!(action = %notice.action, "{}", notice.message)
            }
        }
    }
}

/// Awaits one store action and reports a failure to `notifier` instead of
/// propagating it.
///
/// Action failures stay local to the action; they never change the root
/// coordinator's status.
pub async fn run_action<T, F>(notifier: &dyn Notifier, action: &str, fut: F) -> Option<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(action, error = %format!("{err:#}"), "store action failed");
            notifier.notify(Notice {
                level: NoticeLevel::Error,
                action: action.to_string(),
                message: err.to_string(),
            });
            None
        }
    }
}
