use std::{
    any::{type_name, Any},
    fmt,
    sync::{Arc, Weak},
};

use async_trait::async_trait;

use crate::{
    coordinator::{RootCoordinator, RootInner},
    deps::DepsSnapshot,
    error::StoreError,
    reactive::{Observable, Reactor},
};

/// A domain or UI store owned by a root coordinator.
///
/// Constructors must stay synchronous and free of I/O; `init` is only ever
/// invoked by the coordinator. Any write made after an `.await` inside `init`
/// or an action should go through one [`Reactor::batch`].
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn init(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOrder {
    Parallel,
    /// Runs only after the named, earlier-declared store initialized successfully.
    After(&'static str),
}

#[derive(Clone)]
pub struct StoreEntry {
    name: &'static str,
    order: InitOrder,
    store: Arc<dyn Store>,
    any: Arc<dyn Any + Send + Sync>,
}

impl StoreEntry {
    pub fn parallel<T: Store>(name: &'static str, store: &Arc<T>) -> Self {
        Self::with_order(name, InitOrder::Parallel, store)
    }

    pub fn after<T: Store>(name: &'static str, predecessor: &'static str, store: &Arc<T>) -> Self {
        Self::with_order(name, InitOrder::After(predecessor), store)
    }

    pub fn with_order<T: Store>(name: &'static str, order: InitOrder, store: &Arc<T>) -> Self {
        let erased: Arc<dyn Store> = store.clone();
        let any: Arc<dyn Any + Send + Sync> = store.clone();
        Self {
            name,
            order,
            store: erased,
            any,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn order(&self) -> InitOrder {
        self.order
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn downcast<T: Store>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.any).downcast::<T>().ok()
    }
}

impl fmt::Debug for StoreEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreEntry")
            .field("name", &self.name)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// The closed set of stores one page scope owns.
///
/// Implemented by a plain struct with one `Arc` field per store, which gives
/// typed access to every child; [`StoreSet::entries`] names them for the
/// coordinator and fixes their init order.
pub trait StoreSet: Send + Sync + Sized + 'static {
    /// Data-fetch and other collaborators handed to every store constructor.
    type Services: Send + Sync + 'static;

    fn build(ctx: &StoreContext<Self>) -> Self;
    fn entries(&self) -> Vec<StoreEntry>;
}

pub struct StoreContext<S: StoreSet> {
    pub(crate) root: RootRef<S>,
    pub(crate) reactor: Reactor,
    pub(crate) deps: Observable<Arc<DepsSnapshot>>,
    pub(crate) services: Arc<S::Services>,
}

impl<S: StoreSet> StoreContext<S> {
    pub fn root(&self) -> RootRef<S> {
        self.root.clone()
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    pub fn deps(&self) -> Observable<Arc<DepsSnapshot>> {
        self.deps.clone()
    }

    pub fn services(&self) -> &Arc<S::Services> {
        &self.services
    }

    pub fn observable<T: Send + Sync + 'static>(&self, value: T) -> Observable<T> {
        Observable::new(&self.reactor, value)
    }
}

pub struct RootRef<S: StoreSet> {
    pub(crate) inner: Weak<RootInner<S>>,
}

impl<S: StoreSet> Clone for RootRef<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S: StoreSet> fmt::Debug for RootRef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootRef")
            .field("set", &type_name::<S>())
            .field("live", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl<S: StoreSet> RootRef<S> {
    /// Fails while the coordinator is still being constructed and after teardown.
    pub fn upgrade(&self) -> Result<RootCoordinator<S>, StoreError> {
        self.inner
            .upgrade()
            .map(RootCoordinator::from_inner)
            .ok_or(StoreError::RootUnavailable)
    }

    pub fn deps(&self) -> Result<Arc<DepsSnapshot>, StoreError> {
        Ok(self.upgrade()?.deps())
    }
}
