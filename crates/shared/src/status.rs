use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::ScopeId,
    error::{FailureKind, ReportedError, TransitionError},
};

/// Aggregate lifecycle of a root coordinator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitStatus {
    #[default]
    Idle,
    Initializing,
    Ready,
    Failed,
}

impl InitStatus {
    pub fn is_settled(self) -> bool {
        matches!(self, InitStatus::Ready | InitStatus::Failed)
    }

    /// Transitions reachable through a plain `init`.
    ///
    /// `Failed -> Initializing` is deliberately absent; only a retry may take it,
    /// see [`InitStatus::retry_transition`].
    pub fn transition(self, next: InitStatus) -> Result<InitStatus, TransitionError> {
        let allowed = matches!(
            (self, next),
            (InitStatus::Idle, InitStatus::Initializing)
                | (InitStatus::Initializing, InitStatus::Ready)
                | (InitStatus::Initializing, InitStatus::Failed)
        );
        if allowed {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    pub fn retry_transition(self) -> Result<InitStatus, TransitionError> {
        if self == InitStatus::Failed {
            Ok(InitStatus::Initializing)
        } else {
            Err(TransitionError {
                from: self,
                to: InitStatus::Initializing,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "kind", rename_all = "snake_case")]
pub enum ChildState {
    Pending,
    Succeeded,
    Failed(FailureKind),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChildReport {
    pub store: String,
    pub state: ChildState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Everything a view needs to render loading, error and retry affordances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReport {
    pub scope: ScopeId,
    pub status: InitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportedError>,
    pub children: Vec<ChildReport>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    /// Set once the scope is torn down; `status` is frozen from then on.
    #[serde(default)]
    pub disposed: bool,
}

impl StatusReport {
    pub fn can_retry(&self) -> bool {
        self.status == InitStatus::Failed && !self.disposed
    }

    pub fn child(&self, store: &str) -> Option<&ChildReport> {
        self.children.iter().find(|child| child.store == store)
    }
}
