//! Observable cells, derived cells and the reactor that batches their writes.
//!
//! Dependency tracking is explicit: a [`Computed`] or a reaction names the
//! cells it reads, and compares their version counters to decide whether it
//! is stale. Versions come from the owning [`Reactor`]'s clock and only move
//! when a write actually changes a value.

use std::sync::Arc;

mod computed;
mod observable;
mod reactor;

pub use computed::Computed;
pub use observable::Observable;
pub use reactor::{Reactor, Subscription, WatcherId};

pub(crate) use reactor::lock;

/// Something a derived cell or reaction can depend on.
pub trait Tracked: Send + Sync {
    /// Strictly increases every time the tracked value changes.
    fn version(&self) -> u64;
    fn watch(&self, watcher: WatcherId);
    fn unwatch(&self, watcher: WatcherId);
}

pub type Dep = Arc<dyn Tracked>;

#[cfg(test)]
#[path = "../tests/reactive_tests.rs"]
mod tests;
