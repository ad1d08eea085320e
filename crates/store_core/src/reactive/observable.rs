use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
};

use tracing::error;

use super::{
    lock,
    reactor::{Access, Reactor},
    Dep, Subscription, Tracked, WatcherId,
};
use crate::error::StoreError;

struct Cell<T> {
    value: RwLock<T>,
    version: AtomicU64,
    watchers: Mutex<Vec<WatcherId>>,
}

/// A version-tracked value bound to a [`Reactor`].
///
/// Clones share the same cell. Reads go through the reactor's gate, writes
/// through a batch, so readers never see a half-applied change set.
pub struct Observable<T> {
    reactor: Reactor,
    cell: Arc<Cell<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            reactor: self.reactor.clone(),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug + Send + Sync + 'static> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| {
            f.debug_struct("Observable")
                .field("value", value)
                .field("version", &self.version())
                .finish()
        })
    }
}

impl<T: Send + Sync + 'static> Observable<T> {
    pub fn new(reactor: &Reactor, value: T) -> Self {
        Self {
            reactor: reactor.clone(),
            cell: Arc::new(Cell {
                value: RwLock::new(value),
                version: AtomicU64::new(0),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.reactor.read(|| {
            let value = self
                .cell
                .value
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            f(&value)
        })
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    pub fn version(&self) -> u64 {
        self.cell.version.load(Ordering::Acquire)
    }

    /// Sets the value; an equal value is a no-op. Returns whether it changed.
    pub fn set(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        self.try_set(value).unwrap_or(false)
    }

    pub fn try_set(&self, value: T) -> Result<bool, StoreError>
    where
        T: PartialEq,
    {
        self.commit(|current| {
            if *current == value {
                (false, false)
            } else {
                *current = value;
                (true, true)
            }
        })
    }

    pub fn replace(&self, value: T) -> Option<T> {
        self.commit(|current| (std::mem::replace(current, value), true))
            .ok()
    }

    /// Mutates in place; always counts as a change.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.try_update(f).ok()
    }

    pub fn try_update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        self.commit(|current| (f(current), true))
    }

    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.reactor.reaction([self.dep()], callback)
    }

    pub fn dep(&self) -> Dep {
        Arc::new(self.clone())
    }

    fn commit<R>(&self, f: impl FnOnce(&mut T) -> (R, bool)) -> Result<R, StoreError> {
        if self.reactor.is_disposed() {
            self.reactor.note_stale_write();
            return Err(StoreError::StaleMutation);
        }
        if self.reactor.access() == Some(Access::Read) {
            error!("observable written while its reactor is being read; write rejected");
            return Err(StoreError::MutationDuringRead);
        }

        Ok(self.reactor.batch(|| {
            let (result, changed) = {
                let mut value = self
                    .cell
                    .value
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                f(&mut value)
            };
            if changed {
                let version = self.reactor.tick();
                self.cell.version.store(version, Ordering::Release);
                let watchers = lock(&self.cell.watchers).clone();
                self.reactor.enqueue(&watchers);
            }
            result
        }))
    }
}

impl<T: Send + Sync + 'static> Tracked for Observable<T> {
    fn version(&self) -> u64 {
        Observable::version(self)
    }

    fn watch(&self, watcher: WatcherId) {
        lock(&self.cell.watchers).push(watcher);
    }

    fn unwatch(&self, watcher: WatcherId) {
        lock(&self.cell.watchers).retain(|id| *id != watcher);
    }
}
