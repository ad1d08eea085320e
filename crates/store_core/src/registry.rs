use std::{
    any::type_name,
    collections::{hash_map::Entry, HashMap},
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use shared::domain::ScopeId;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::{
    coordinator::RootCoordinator,
    deps::{DepsSnapshot, Environment},
    error::AccessError,
    store::{Store, StoreSet},
};

/// Scope-keyed access layer: at most one live root coordinator per scope.
pub struct Registry<S: StoreSet> {
    services: Arc<S::Services>,
    scopes: RwLock<HashMap<ScopeId, RootCoordinator<S>>>,
}

impl<S: StoreSet> fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("set", &type_name::<S>())
            .field("scopes", &self.len())
            .finish()
    }
}

impl<S: StoreSet> Registry<S> {
    pub fn new(services: Arc<S::Services>) -> Self {
        Self {
            services,
            scopes: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ScopeId, RootCoordinator<S>>> {
        self.scopes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ScopeId, RootCoordinator<S>>> {
        self.scopes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the coordinator for `scope`, creating it if absent.
    ///
    /// A newly created coordinator has its `init` spawned on the current
    /// tokio runtime exactly once; an existing one is returned untouched.
    pub fn provide(
        &self,
        scope: ScopeId,
        env: &dyn Environment,
    ) -> Result<RootCoordinator<S>, AccessError> {
        if let Some(existing) = self.read().get(&scope) {
            debug!(scope = %scope, "scope already provided");
            return Ok(existing.clone());
        }
        let runtime = Handle::try_current().map_err(|_| AccessError::NoRuntime(scope))?;

        // Store constructors run outside the map lock.
        let built = RootCoordinator::with_scope(
            scope,
            DepsSnapshot::capture(env),
            Arc::clone(&self.services),
        )?;
        let root = match self.write().entry(scope) {
            Entry::Occupied(existing) => {
                debug!(scope = %scope, "scope provided concurrently; discarding duplicate");
                return Ok(existing.get().clone());
            }
            Entry::Vacant(slot) => slot.insert(built).clone(),
        };
        info!(scope = %scope, stores = ?root.store_names(), "scope mounted");

        let pending = root.clone();
        runtime.spawn(async move {
            if let Err(err) = pending.init().await {
                warn!(scope = %scope, error = %err, "scope init failed; waiting for retry");
            }
        });
        Ok(root)
    }

    pub fn mount(&self, env: &dyn Environment) -> Result<ScopeGuard<'_, S>, AccessError> {
        let scope = ScopeId::new();
        let root = self.provide(scope, env)?;
        Ok(ScopeGuard {
            registry: self,
            scope,
            root,
        })
    }

    pub fn use_scoped(&self, scope: ScopeId) -> Result<RootCoordinator<S>, AccessError> {
        self.read()
            .get(&scope)
            .cloned()
            .ok_or(AccessError::ScopeNotFound(scope))
    }

    pub fn use_child(&self, scope: ScopeId, name: &str) -> Result<Arc<dyn Store>, AccessError> {
        self.use_scoped(scope)?
            .child(name)
            .ok_or_else(|| AccessError::ChildNotFound {
                scope,
                name: name.to_string(),
            })
    }

    pub fn child<T: Store>(&self, scope: ScopeId, name: &str) -> Result<Arc<T>, AccessError> {
        let root = self.use_scoped(scope)?;
        if root.child(name).is_none() {
            return Err(AccessError::ChildNotFound {
                scope,
                name: name.to_string(),
            });
        }
        root.child_as::<T>(name).ok_or_else(|| AccessError::ChildType {
            scope,
            name: name.to_string(),
            expected: type_name::<T>(),
        })
    }

    pub fn refresh_deps(&self, scope: ScopeId, env: &dyn Environment) -> Result<bool, AccessError> {
        let root = self.use_scoped(scope)?;
        Ok(root.replace_deps(DepsSnapshot::capture(env)))
    }

    /// Unmounts `scope`. An in-flight init keeps running but its writes are dropped.
    pub fn release(&self, scope: ScopeId) -> bool {
        let removed = self.write().remove(&scope);
        match removed {
            Some(root) => {
                root.dispose();
                info!(scope = %scope, "scope released");
                true
            }
            None => false,
        }
    }

    pub fn scopes(&self) -> Vec<ScopeId> {
        self.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

pub struct ScopeGuard<'a, S: StoreSet> {
    registry: &'a Registry<S>,
    scope: ScopeId,
    root: RootCoordinator<S>,
}

impl<S: StoreSet> ScopeGuard<'_, S> {
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn root(&self) -> &RootCoordinator<S> {
        &self.root
    }
}

impl<S: StoreSet> fmt::Debug for ScopeGuard<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl<S: StoreSet> Drop for ScopeGuard<'_, S> {
    fn drop(&mut self) {
        self.registry.release(self.scope);
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
