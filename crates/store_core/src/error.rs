use std::sync::Arc;

use shared::{
    domain::ScopeId,
    error::{FailureKind, ReportedError},
    status::InitStatus,
};
use thiserror::Error;

/// A child store's `init` did not succeed.
#[derive(Debug, Clone, Error)]
#[error("store `{store}` failed to initialize: {cause}")]
pub struct ChildInitError {
    pub store: &'static str,
    pub kind: FailureKind,
    pub cause: Arc<anyhow::Error>,
}

impl ChildInitError {
    pub fn new(store: &'static str, kind: FailureKind, cause: anyhow::Error) -> Self {
        Self {
            store,
            kind,
            cause: Arc::new(cause),
        }
    }

    /// The underlying cause, without the store prefix.
    pub fn message(&self) -> String {
        self.cause.to_string()
    }

    pub fn report(&self) -> ReportedError {
        ReportedError::new(self.store, self.kind, self.message())
    }
}

#[derive(Debug, Clone, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    ChildInit(#[from] ChildInitError),
    #[error("retry is only allowed after a failed init (status is {0:?})")]
    NotFailed(InitStatus),
    #[error("invalid store plan: {0}")]
    InvalidPlan(String),
    #[error("root coordinator has been disposed")]
    Disposed,
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("no root coordinator provided for scope {0}; access must happen inside a mounted scope")]
    ScopeNotFound(ScopeId),
    #[error("scope {scope} has no store named `{name}`")]
    ChildNotFound { scope: ScopeId, name: String },
    #[error("store `{name}` in scope {scope} is not a {expected}")]
    ChildType {
        scope: ScopeId,
        name: String,
        expected: &'static str,
    },
    #[error("scope {0} cannot be provided outside a tokio runtime")]
    NoRuntime(ScopeId),
    #[error(transparent)]
    Plan(#[from] CoordinatorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("mutation dropped: the owning scope has been torn down")]
    StaleMutation,
    #[error("mutation rejected: cells cannot be written while a derivation reads them")]
    MutationDuringRead,
    #[error("the root coordinator is not available (not yet constructed or already torn down)")]
    RootUnavailable,
}
