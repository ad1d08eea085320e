use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use store_core::{
    run_action, Computed, DepsSnapshot, Observable, Reactor, RootRef, Store, StoreContext,
    StoreEntry, StoreSet,
};

use crate::backend::DemoBackend;

/// Every store mounted for the admin page.
pub struct AdminPage {
    pub users: Arc<UsersStore>,
    pub permissions: Arc<PermissionsStore>,
    pub roles: Arc<RolesStore>,
    pub selection: Arc<SelectionStore>,
}

impl StoreSet for AdminPage {
    type Services = DemoBackend;

    fn build(ctx: &StoreContext<Self>) -> Self {
        Self {
            users: UsersStore::new(ctx),
            permissions: PermissionsStore::new(ctx),
            roles: RolesStore::new(ctx),
            selection: SelectionStore::new(ctx),
        }
    }

    fn entries(&self) -> Vec<StoreEntry> {
        vec![
            StoreEntry::parallel("users", &self.users),
            StoreEntry::parallel("permissions", &self.permissions),
            StoreEntry::after("roles", "permissions", &self.roles),
            StoreEntry::parallel("selection", &self.selection),
        ]
    }
}

pub struct UsersStore {
    backend: Arc<DemoBackend>,
    reactor: Reactor,
    deps: Observable<Arc<DepsSnapshot>>,
    pub users: Observable<Vec<String>>,
    pub loaded: Observable<bool>,
    pub summary: Computed<String>,
}

impl UsersStore {
    fn new(ctx: &StoreContext<AdminPage>) -> Arc<Self> {
        let users = ctx.observable(Vec::<String>::new());
        let loaded = ctx.observable(false);
        let summary = {
            let (users, loaded) = (users.clone(), loaded.clone());
            Computed::new(ctx.reactor(), [users.dep(), loaded.dep()], move || {
                if loaded.get() {
                    format!("{} users", users.with(Vec::len))
                } else {
                    "loading users".to_string()
                }
            })
        };
        Arc::new(Self {
            backend: Arc::clone(ctx.services()),
            reactor: ctx.reactor().clone(),
            deps: ctx.deps(),
            users,
            loaded,
            summary,
        })
    }

    pub async fn invite(&self, name: &str) -> bool {
        let notifier = Arc::clone(self.deps.get().notifier());
        run_action(notifier.as_ref(), "invite_user", async {
            self.backend.invite(name).await?;
            self.users.update(|users| users.push(name.to_string()));
            Ok(())
        })
        .await
        .is_some()
    }
}

#[async_trait]
impl Store for UsersStore {
    async fn init(&self) -> Result<()> {
        let users = self.backend.list_users().await?;
        self.reactor.batch(|| {
            self.users.set(users);
            self.loaded.set(true);
        });
        Ok(())
    }
}

pub struct PermissionsStore {
    backend: Arc<DemoBackend>,
    pub granted: Observable<Vec<String>>,
}

impl PermissionsStore {
    fn new(ctx: &StoreContext<AdminPage>) -> Arc<Self> {
        Arc::new(Self {
            backend: Arc::clone(ctx.services()),
            granted: ctx.observable(Vec::new()),
        })
    }
}

#[async_trait]
impl Store for PermissionsStore {
    async fn init(&self) -> Result<()> {
        let granted = self.backend.list_permissions().await?;
        self.granted.set(granted);
        Ok(())
    }
}

/// Derived from the permissions sibling, so it initializes after it.
pub struct RolesStore {
    root: RootRef<AdminPage>,
    backend: Arc<DemoBackend>,
    pub roles: Observable<Vec<String>>,
}

impl RolesStore {
    fn new(ctx: &StoreContext<AdminPage>) -> Arc<Self> {
        Arc::new(Self {
            root: ctx.root(),
            backend: Arc::clone(ctx.services()),
            roles: ctx.observable(Vec::new()),
        })
    }
}

#[async_trait]
impl Store for RolesStore {
    async fn init(&self) -> Result<()> {
        let granted = self.root.upgrade()?.stores().permissions.granted.get();
        let roles = self.backend.roles_for(&granted).await?;
        self.roles.set(roles);
        Ok(())
    }
}

/// Page UI state. Navigating away clears the selection.
pub struct SelectionStore {
    pub selected: Observable<Option<String>>,
}

impl SelectionStore {
    fn new(ctx: &StoreContext<AdminPage>) -> Arc<Self> {
        let selected = ctx.observable(None::<String>);
        let clear = {
            let selected = selected.clone();
            ctx.deps().subscribe(move || {
                selected.set(None);
            })
        };
        ctx.reactor().keep(clear);
        Arc::new(Self { selected })
    }

    pub fn select(&self, user: &str) {
        self.selected.set(Some(user.to_string()));
    }
}

#[async_trait]
impl Store for SelectionStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/stores_tests.rs"]
mod tests;
