use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a child store did not reach a successful `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// `init` returned an error.
    Rejected,
    /// `init` panicked; the panic was caught by the coordinator.
    Panicked,
    /// `init` never ran because the store it depends on failed.
    Skipped,
}

impl FailureKind {
    /// Skipped children are a consequence of another failure, never the cause.
    pub fn is_root_cause(self) -> bool {
        !matches!(self, FailureKind::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    pub store: String,
    pub kind: FailureKind,
    pub message: String,
}

impl ReportedError {
    pub fn new(store: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid status transition from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: crate::status::InitStatus,
    pub to: crate::status::InitStatus,
}
