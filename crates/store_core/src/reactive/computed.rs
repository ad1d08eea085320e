use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use super::{lock, Dep, Reactor, Tracked, WatcherId};

type Derive<T> = Box<dyn Fn() -> T + Send + Sync>;

struct ComputedInner<T> {
    reactor: Reactor,
    deps: Vec<Dep>,
    derive: Derive<T>,
    cache: Mutex<Option<(Vec<u64>, T)>>,
    evaluations: AtomicU64,
}

/// A memoized derivation over explicitly declared dependencies.
///
/// The cached value is reused while every dependency reports the version it
/// had at the last evaluation. `derive` must be pure: it runs under the
/// reactor's read gate, and writes attempted from it are rejected.
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("deps", &self.inner.deps.len())
            .field("evaluations", &self.inner.evaluations.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Computed<T> {
    pub fn new(
        reactor: &Reactor,
        deps: impl IntoIterator<Item = Dep>,
        derive: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(ComputedInner {
                reactor: reactor.clone(),
                deps: deps.into_iter().collect(),
                derive: Box::new(derive),
                cache: Mutex::new(None),
                evaluations: AtomicU64::new(0),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.reactor.read(|| {
            let stamp = self.stamp();
            let mut cache = lock(&self.inner.cache);
            if let Some((cached_stamp, value)) = cache.as_ref() {
                if *cached_stamp == stamp {
                    return value.clone();
                }
            }
            let value = (self.inner.derive)();
            self.inner.evaluations.fetch_add(1, Ordering::Relaxed);
            *cache = Some((stamp, value.clone()));
            value
        })
    }

    pub fn evaluations(&self) -> u64 {
        self.inner.evaluations.load(Ordering::Relaxed)
    }

    pub fn dep(&self) -> Dep {
        Arc::new(self.clone())
    }

    fn stamp(&self) -> Vec<u64> {
        self.inner.deps.iter().map(|dep| dep.version()).collect()
    }
}

impl<T: Clone + Send + Sync + 'static> Tracked for Computed<T> {
    // Each dependency version only grows, so the sum moves whenever any of them does.
    fn version(&self) -> u64 {
        self.inner
            .deps
            .iter()
            .fold(0u64, |acc, dep| acc.wrapping_add(dep.version()))
    }

    fn watch(&self, watcher: WatcherId) {
        for dep in &self.inner.deps {
            dep.watch(watcher);
        }
    }

    fn unwatch(&self, watcher: WatcherId) {
        for dep in &self.inner.deps {
            dep.unwatch(watcher);
        }
    }
}
