use std::{
    any::type_name,
    collections::{HashMap, HashSet},
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::{
    future::{join_all, BoxFuture, Shared},
    FutureExt,
};
use shared::{
    domain::ScopeId,
    error::FailureKind,
    status::{ChildReport, ChildState, InitStatus, StatusReport},
};
use tracing::{debug, info, warn};

use crate::{
    deps::DepsSnapshot,
    error::{ChildInitError, CoordinatorError},
    reactive::{lock, Observable, Reactor},
    store::{InitOrder, RootRef, Store, StoreContext, StoreEntry, StoreSet},
};

type InitRun = Shared<BoxFuture<'static, Result<(), CoordinatorError>>>;
type ChildRun = Shared<BoxFuture<'static, ChildOutcome>>;

#[derive(Debug, Clone)]
enum ChildOutcome {
    Succeeded,
    Failed(ChildInitError),
}

#[derive(Debug, Clone)]
pub struct ChildResult {
    pub store: &'static str,
    pub state: ChildState,
    pub error: Option<ChildInitError>,
}

impl ChildResult {
    fn pending(store: &'static str) -> Self {
        Self {
            store,
            state: ChildState::Pending,
            error: None,
        }
    }
}

pub(crate) struct RootInner<S: StoreSet> {
    scope: ScopeId,
    stores: S,
    entries: Vec<StoreEntry>,
    reactor: Reactor,
    deps: Observable<Arc<DepsSnapshot>>,
    status: Observable<InitStatus>,
    error: Observable<Option<ChildInitError>>,
    children: Observable<Vec<ChildResult>>,
    settled_at: Observable<Option<DateTime<Utc>>>,
    attempts: AtomicU32,
    in_flight: Mutex<Option<InitRun>>,
}

impl<S: StoreSet> Drop for RootInner<S> {
    fn drop(&mut self) {
        self.reactor.dispose();
    }
}

enum Begin {
    Join(InitRun),
    Done(Result<(), CoordinatorError>),
}

/// Owns every store of one scope plus the dependency snapshot, and sequences
/// their initialization.
///
/// Cloning is cheap and yields another handle to the same coordinator.
pub struct RootCoordinator<S: StoreSet> {
    inner: Arc<RootInner<S>>,
}

impl<S: StoreSet> Clone for RootCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: StoreSet> fmt::Debug for RootCoordinator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootCoordinator")
            .field("set", &type_name::<S>())
            .field("scope", &self.inner.scope)
            .field("status", &self.status())
            .field("stores", &self.store_names())
            .finish()
    }
}

impl<S: StoreSet> RootCoordinator<S> {
    pub fn new(deps: DepsSnapshot, services: Arc<S::Services>) -> Result<Self, CoordinatorError> {
        Self::with_scope(ScopeId::new(), deps, services)
    }

    /// Builds every store synchronously. No store's `init` runs here.
    pub fn with_scope(
        scope: ScopeId,
        deps: DepsSnapshot,
        services: Arc<S::Services>,
    ) -> Result<Self, CoordinatorError> {
        let reactor = Reactor::new();
        let deps = Observable::new(&reactor, Arc::new(deps));

        let inner = Arc::new_cyclic(|weak| {
            let ctx = StoreContext {
                root: RootRef {
                    inner: weak.clone(),
                },
                reactor: reactor.clone(),
                deps: deps.clone(),
                services,
            };
            let stores = S::build(&ctx);
            let entries = stores.entries();
            let children = entries
                .iter()
                .map(|entry| ChildResult::pending(entry.name()))
                .collect();

            RootInner {
                scope,
                stores,
                entries,
                reactor: reactor.clone(),
                deps: deps.clone(),
                status: Observable::new(&reactor, InitStatus::Idle),
                error: Observable::new(&reactor, None),
                children: Observable::new(&reactor, children),
                settled_at: Observable::new(&reactor, None),
                attempts: AtomicU32::new(0),
                in_flight: Mutex::new(None),
            }
        });

        validate_plan(&inner.entries)?;
        debug!(
            scope = %scope,
            set = type_name::<S>(),
            stores = inner.entries.len(),
            "root coordinator constructed"
        );
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<RootInner<S>>) -> Self {
        Self { inner }
    }

    pub fn scope(&self) -> ScopeId {
        self.inner.scope
    }

    pub fn stores(&self) -> &S {
        &self.inner.stores
    }

    pub fn reactor(&self) -> &Reactor {
        &self.inner.reactor
    }

    pub fn deps(&self) -> Arc<DepsSnapshot> {
        self.inner.deps.get()
    }

    pub fn deps_cell(&self) -> &Observable<Arc<DepsSnapshot>> {
        &self.inner.deps
    }

    /// Swaps the snapshot when the ambient inputs differ. Returns whether it did.
    pub fn replace_deps(&self, next: DepsSnapshot) -> bool {
        if self.deps().same_inputs(&next) {
            return false;
        }
        let changed = self.inner.deps.replace(Arc::new(next)).is_some();
        if changed {
            info!(scope = %self.inner.scope, "dependency snapshot refreshed");
        }
        changed
    }

    pub fn status(&self) -> InitStatus {
        self.inner.status.get()
    }

    pub fn status_cell(&self) -> &Observable<InitStatus> {
        &self.inner.status
    }

    pub fn error(&self) -> Option<ChildInitError> {
        self.inner.error.get()
    }

    pub fn failures(&self) -> Vec<ChildInitError> {
        self.inner
            .children
            .with(|children| children.iter().filter_map(|c| c.error.clone()).collect())
    }

    pub fn children(&self) -> Vec<ChildResult> {
        self.inner.children.get()
    }

    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::Acquire)
    }

    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        self.inner.settled_at.get()
    }

    pub fn store_names(&self) -> Vec<&'static str> {
        self.inner.entries.iter().map(StoreEntry::name).collect()
    }

    pub fn child(&self, name: &str) -> Option<Arc<dyn Store>> {
        self.entry(name).map(|entry| Arc::clone(entry.store()))
    }

    pub fn child_as<T: Store>(&self, name: &str) -> Option<Arc<T>> {
        self.entry(name).and_then(StoreEntry::downcast::<T>)
    }

    fn entry(&self, name: &str) -> Option<&StoreEntry> {
        self.inner.entries.iter().find(|entry| entry.name() == name)
    }

    pub fn report(&self) -> StatusReport {
        self.inner.reactor.read(|| StatusReport {
            scope: self.inner.scope,
            status: self.status(),
            error: self.error().map(|err| err.report()),
            children: self
                .children()
                .into_iter()
                .map(|child| ChildReport {
                    store: child.store.to_string(),
                    state: child.state,
                    message: child.error.map(|err| err.message()),
                })
                .collect(),
            attempts: self.attempts(),
            settled_at: self.settled_at(),
            disposed: self.is_disposed(),
        })
    }

    /// Initializes every child according to its declared order.
    ///
    /// Overlapping calls share one run. Once settled, `Ready` returns `Ok`
    /// and `Failed` returns the retained error; only [`RootCoordinator::retry`]
    /// starts another run.
    pub async fn init(&self) -> Result<(), CoordinatorError> {
        match self.begin(false) {
            Begin::Join(run) => run.await,
            Begin::Done(result) => result,
        }
    }

    pub async fn retry(&self) -> Result<(), CoordinatorError> {
        match self.begin(true) {
            Begin::Join(run) => run.await,
            Begin::Done(result) => result,
        }
    }

    /// Tears the scope down: reactions are dropped and later writes are stale.
    ///
    /// An init that is still running is not cancelled; its remaining writes
    /// are discarded, so `status()` keeps its last committed value. Check
    /// [`RootCoordinator::is_disposed`] or `report().disposed`.
    pub fn dispose(&self) {
        info!(scope = %self.inner.scope, status = ?self.status(), "root coordinator disposed");
        self.inner.reactor.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.reactor.is_disposed()
    }

    fn begin(&self, retry: bool) -> Begin {
        let mut in_flight = lock(&self.inner.in_flight);
        if let Some(run) = in_flight.as_ref() {
            if retry {
                return Begin::Done(Err(CoordinatorError::NotFailed(InitStatus::Initializing)));
            }
            debug!(scope = %self.inner.scope, "init already in flight; joining");
            return Begin::Join(run.clone());
        }
        if self.is_disposed() {
            return Begin::Done(Err(CoordinatorError::Disposed));
        }

        let status = self.status();
        let next = if retry {
            status.retry_transition()
        } else {
            match status {
                InitStatus::Ready => return Begin::Done(Ok(())),
                InitStatus::Failed => return Begin::Done(Err(self.retained_error())),
                _ => status.transition(InitStatus::Initializing),
            }
        };
        if next.is_err() {
            return Begin::Done(Err(CoordinatorError::NotFailed(status)));
        }

        let inner = &self.inner;
        let ((), pending) = inner.reactor.batch_deferred(|| {
            inner.status.set(InitStatus::Initializing);
            inner.error.replace(None);
            inner.settled_at.set(None);
            inner.children.update(|children| {
                for child in children.iter_mut() {
                    *child = ChildResult::pending(child.store);
                }
            });
        });
        let run = run_children(Arc::clone(&self.inner)).boxed().shared();
        *in_flight = Some(run.clone());
        // Subscribers may call back into init; notify only after unlocking.
        drop(in_flight);
        pending.deliver();
        Begin::Join(run)
    }

    fn retained_error(&self) -> CoordinatorError {
        match self.error() {
            Some(err) => CoordinatorError::ChildInit(err),
            None => CoordinatorError::NotFailed(InitStatus::Failed),
        }
    }
}

fn validate_plan(entries: &[StoreEntry]) -> Result<(), CoordinatorError> {
    let mut declared = HashSet::with_capacity(entries.len());
    for entry in entries {
        if let InitOrder::After(predecessor) = entry.order() {
            if predecessor == entry.name() {
                return Err(CoordinatorError::InvalidPlan(format!(
                    "store `{}` cannot depend on itself",
                    entry.name()
                )));
            }
            if !declared.contains(predecessor) {
                return Err(CoordinatorError::InvalidPlan(format!(
                    "store `{}` depends on `{predecessor}`, which is not declared before it",
                    entry.name()
                )));
            }
        }
        if !declared.insert(entry.name()) {
            return Err(CoordinatorError::InvalidPlan(format!(
                "store `{}` is declared twice",
                entry.name()
            )));
        }
    }
    Ok(())
}

async fn run_children<S: StoreSet>(inner: Arc<RootInner<S>>) -> Result<(), CoordinatorError> {
    let attempt = inner.attempts.fetch_add(1, Ordering::AcqRel) + 1;
    info!(
        scope = %inner.scope,
        attempt,
        stores = inner.entries.len(),
        "initializing stores"
    );

    let mut by_name: HashMap<&'static str, ChildRun> = HashMap::with_capacity(inner.entries.len());
    let mut runs = Vec::with_capacity(inner.entries.len());
    for (index, entry) in inner.entries.iter().enumerate() {
        let predecessor = match entry.order() {
            InitOrder::Parallel => None,
            InitOrder::After(name) => by_name.get(name).cloned().map(|run| (name, run)),
        };
        let run = run_child(Arc::clone(&inner), index, entry.clone(), predecessor)
            .boxed()
            .shared();
        by_name.insert(entry.name(), run.clone());
        runs.push(run);
    }

    let outcomes = join_all(runs).await;
    let failure = outcomes.into_iter().find_map(|outcome| match outcome {
        ChildOutcome::Failed(err) if err.kind.is_root_cause() => Some(err),
        _ => None,
    });

    let status = if failure.is_some() {
        InitStatus::Failed
    } else {
        InitStatus::Ready
    };
    let pending = {
        // Clearing the run and settling the status under one lock keeps
        // `begin` from seeing `Initializing` with nothing in flight.
        let mut in_flight = lock(&inner.in_flight);
        *in_flight = None;
        let ((), pending) = inner.reactor.batch_deferred(|| {
            inner.status.set(status);
            inner.error.replace(failure.clone());
            inner.settled_at.set(Some(Utc::now()));
        });
        pending
    };
    pending.deliver();

    match failure {
        Some(err) => {
            warn!(scope = %inner.scope, attempt, store = err.store, error = %err.cause, "init failed");
            Err(CoordinatorError::ChildInit(err))
        }
        None => {
            info!(scope = %inner.scope, attempt, "stores ready");
            Ok(())
        }
    }
}

async fn run_child<S: StoreSet>(
    inner: Arc<RootInner<S>>,
    index: usize,
    entry: StoreEntry,
    predecessor: Option<(&'static str, ChildRun)>,
) -> ChildOutcome {
    let name = entry.name();
    let blocked_by = match predecessor {
        Some((peer, run)) => match run.await {
            ChildOutcome::Succeeded => None,
            ChildOutcome::Failed(_) => Some(peer),
        },
        None => None,
    };

    let outcome = match blocked_by {
        Some(peer) => {
            debug!(scope = %inner.scope, store = name, peer, "skipping store after peer failure");
            ChildOutcome::Failed(ChildInitError::new(
                name,
                FailureKind::Skipped,
                anyhow!("skipped because `{peer}` failed to initialize"),
            ))
        }
        None => match AssertUnwindSafe(entry.store().init()).catch_unwind().await {
            Ok(Ok(())) => ChildOutcome::Succeeded,
            Ok(Err(err)) => {
                warn!(scope = %inner.scope, store = name, error = %format!("{err:#}"), "store init rejected");
                ChildOutcome::Failed(ChildInitError::new(name, FailureKind::Rejected, err))
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                warn!(scope = %inner.scope, store = name, panic = %message, "store init panicked");
                ChildOutcome::Failed(ChildInitError::new(
                    name,
                    FailureKind::Panicked,
                    anyhow!("init panicked: {message}"),
                ))
            }
        },
    };

    inner.children.update(|children| {
        if let Some(child) = children.get_mut(index) {
            match &outcome {
                ChildOutcome::Succeeded => {
                    child.state = ChildState::Succeeded;
                    child.error = None;
                }
                ChildOutcome::Failed(err) => {
                    child.state = ChildState::Failed(err.kind);
                    child.error = Some(err.clone());
                }
            }
        }
    });
    outcome
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
