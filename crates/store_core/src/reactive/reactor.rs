use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak,
    },
};

use tracing::{debug, warn};

use super::Dep;

type Callback = Arc<dyn Fn() + Send + Sync>;

static NEXT_REACTOR_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_WATCHER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    fn next() -> Self {
        Self(NEXT_WATCHER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

struct Held {
    reactor: u64,
    access: Access,
    pending: Vec<WatcherId>,
}

thread_local! {
    // Gates this thread currently holds. Batches and reads never await, so the
    // stack never outlives the synchronous closure that pushed it.
    static HELD: RefCell<Vec<Held>> = const { RefCell::new(Vec::new()) };
}

fn held_access(reactor: u64) -> Option<Access> {
    HELD.with(|held| {
        let held = held.borrow();
        let mut access = None;
        for entry in held.iter().filter(|entry| entry.reactor == reactor) {
            if entry.access == Access::Write {
                return Some(Access::Write);
            }
            access = Some(Access::Read);
        }
        access
    })
}

/// Pops its stack entry on drop so a panicking closure cannot leave the gate
/// marked as held.
struct HeldGuard {
    reactor: u64,
}

impl HeldGuard {
    fn push(reactor: u64, access: Access) -> Self {
        HELD.with(|held| {
            held.borrow_mut().push(Held {
                reactor,
                access,
                pending: Vec::new(),
            })
        });
        Self { reactor }
    }

    fn take_pending(&self) -> Vec<WatcherId> {
        HELD.with(|held| {
            held.borrow_mut()
                .iter_mut()
                .rev()
                .find(|entry| entry.reactor == self.reactor)
                .map(|entry| std::mem::take(&mut entry.pending))
                .unwrap_or_default()
        })
    }
}

impl Drop for HeldGuard {
    fn drop(&mut self) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|entry| entry.reactor == self.reactor) {
                held.remove(pos);
            }
        });
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct ReactorInner {
    id: u64,
    gate: RwLock<()>,
    clock: AtomicU64,
    callbacks: Mutex<HashMap<WatcherId, Callback>>,
    kept: Mutex<Vec<Subscription>>,
    disposed: AtomicBool,
    stale_writes: AtomicU64,
}

/// Reactive runtime for one scope.
///
/// Every observable and computed cell created against a reactor shares its
/// commit gate: [`Reactor::batch`] holds it exclusively, so a reader either
/// sees none or all of the writes made inside one batch. Subscribers are
/// notified after the batch commits, once per batch, in registration order.
#[derive(Clone)]
pub struct Reactor {
    inner: Arc<ReactorInner>,
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .field("watchers", &self.active_watchers())
            .finish()
    }
}

impl Reactor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ReactorInner {
                id: NEXT_REACTOR_ID.fetch_add(1, Ordering::Relaxed),
                gate: RwLock::new(()),
                clock: AtomicU64::new(0),
                callbacks: Mutex::new(HashMap::new()),
                kept: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
                stale_writes: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn stale_writes(&self) -> u64 {
        self.inner.stale_writes.load(Ordering::Relaxed)
    }

    pub fn active_watchers(&self) -> usize {
        lock(&self.inner.callbacks).len()
    }

    /// Applies every write made by `f` as one atomic change set.
    ///
    /// Nested batches on the same reactor flatten into the outermost one.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let (result, pending) = self.batch_deferred(f);
        pending.deliver();
        result
    }

    /// Like [`Reactor::batch`], but hands the notifications back so the caller
    /// can deliver them after releasing its own locks.
    pub(crate) fn batch_deferred<R>(&self, f: impl FnOnce() -> R) -> (R, Pending) {
        match held_access(self.inner.id) {
            Some(Access::Write) => return (f(), self.pending(Vec::new())),
            Some(Access::Read) => {
                warn!(
                    reactor = self.inner.id,
                    "batch opened inside a read; writes in it will be rejected"
                );
                return (f(), self.pending(Vec::new()));
            }
            None => {}
        }

        let _gate = self
            .inner
            .gate
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let held = HeldGuard::push(self.inner.id, Access::Write);
        let result = f();
        let watchers = held.take_pending();
        (result, self.pending(watchers))
    }

    fn pending(&self, watchers: Vec<WatcherId>) -> Pending {
        Pending {
            reactor: self.clone(),
            watchers,
        }
    }

    /// Runs `f` against a consistent view of every cell in this reactor.
    pub fn read<R>(&self, f: impl FnOnce() -> R) -> R {
        if held_access(self.inner.id).is_some() {
            return f();
        }
        let _gate = self
            .inner
            .gate
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let _held = HeldGuard::push(self.inner.id, Access::Read);
        f()
    }

    /// Registers `effect` to run after every committed batch that changed any
    /// of `deps`. The reaction lives as long as the returned subscription.
    pub fn reaction(
        &self,
        deps: impl IntoIterator<Item = Dep>,
        effect: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        let id = WatcherId::next();
        let deps: Vec<Dep> = deps.into_iter().collect();
        if self.is_disposed() {
            warn!(reactor = self.inner.id, "reaction registered on a disposed reactor");
        } else {
            lock(&self.inner.callbacks).insert(id, Arc::new(effect));
            for dep in &deps {
                dep.watch(id);
            }
        }
        Subscription {
            reactor: Arc::downgrade(&self.inner),
            id,
            deps,
        }
    }

    pub fn keep(&self, subscription: Subscription) {
        if self.is_disposed() {
            return;
        }
        lock(&self.inner.kept).push(subscription);
    }

    /// Tears down every reaction. Later writes are stale and dropped.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let kept = std::mem::take(&mut *lock(&self.inner.kept));
        let released = kept.len();
        drop(kept);
        let callbacks = std::mem::take(&mut *lock(&self.inner.callbacks));
        drop(callbacks);
        debug!(reactor = self.inner.id, released, "reactor disposed");
    }

    pub(crate) fn access(&self) -> Option<Access> {
        held_access(self.inner.id)
    }

    pub(crate) fn note_stale_write(&self) {
        self.inner.stale_writes.fetch_add(1, Ordering::Relaxed);
        warn!(
            reactor = self.inner.id,
            "write to a disposed scope dropped"
        );
    }

    pub(crate) fn tick(&self) -> u64 {
        self.inner.clock.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn enqueue(&self, watchers: &[WatcherId]) {
        if watchers.is_empty() {
            return;
        }
        HELD.with(|held| {
            if let Some(entry) = held
                .borrow_mut()
                .iter_mut()
                .rev()
                .find(|entry| entry.reactor == self.inner.id && entry.access == Access::Write)
            {
                entry.pending.extend_from_slice(watchers);
            }
        });
    }
}

#[must_use = "pending notifications are lost unless delivered"]
pub(crate) struct Pending {
    reactor: Reactor,
    watchers: Vec<WatcherId>,
}

impl Pending {
    pub(crate) fn deliver(self) {
        if self.watchers.is_empty() {
            return;
        }
        let mut seen = HashSet::with_capacity(self.watchers.len());
        let mut ordered: Vec<WatcherId> = self
            .watchers
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();
        // Watcher ids are allocated monotonically, so this is registration order.
        ordered.sort_by_key(|id| id.0);

        let callbacks: Vec<Callback> = {
            let registered = lock(&self.reactor.inner.callbacks);
            ordered
                .iter()
                .filter_map(|id| registered.get(id).cloned())
                .collect()
        };
        for callback in callbacks {
            callback();
        }
    }
}

/// RAII handle for a reaction; dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    reactor: Weak<ReactorInner>,
    id: WatcherId,
    deps: Vec<Dep>,
}

impl Subscription {
    pub fn id(&self) -> WatcherId {
        self.id
    }

    pub fn dispose(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("deps", &self.deps.len())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(reactor) = self.reactor.upgrade() {
            // Released outside the lock: the callback may own other subscriptions.
            let removed = lock(&reactor.callbacks).remove(&self.id);
            drop(removed);
        }
        for dep in &self.deps {
            dep.unwatch(self.id);
        }
    }
}
