//! Coordinated initialization for scoped groups of observable stores.
//!
//! A [`RootCoordinator`] owns every store of one page scope plus the
//! [`DepsSnapshot`] captured when the scope was mounted, and sequences the
//! stores' asynchronous `init`. A [`Registry`] hands coordinators out per
//! scope.

pub mod action;
pub mod coordinator;
pub mod deps;
pub mod error;
pub mod reactive;
pub mod registry;
pub mod store;

pub use action::{run_action, Notice, NoticeLevel, Notifier, TracingNotifier};
pub use coordinator::{ChildResult, RootCoordinator};
pub use deps::{DepsSnapshot, Environment, Location, Navigator, RouteParams, StaticEnvironment};
pub use error::{AccessError, ChildInitError, CoordinatorError, StoreError};
pub use reactive::{Computed, Observable, Reactor, Subscription};
pub use registry::{Registry, ScopeGuard};
pub use store::{InitOrder, RootRef, Store, StoreContext, StoreEntry, StoreSet};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
