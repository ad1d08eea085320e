//! Scripted backend and store sets shared by the crate's tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, OnceLock, Weak,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::{
    action::{run_action, Notice, Notifier},
    deps::{DepsSnapshot, Environment, Location, RouteParams},
    reactive::{Computed, Observable, Reactor},
    registry::Registry,
    store::{RootRef, Store, StoreContext, StoreEntry, StoreSet},
};

#[derive(Debug, Clone)]
pub(crate) enum Script {
    Items(Vec<&'static str>),
    Fail(&'static str),
    Panic(&'static str),
}

/// Fake data-fetch collaborator. Each store pops its scripts in order; the
/// last one repeats.
#[derive(Default)]
pub(crate) struct Backend {
    scripts: Mutex<HashMap<&'static str, Vec<Script>>>,
    fetches: Mutex<HashMap<&'static str, usize>>,
    events: Mutex<Vec<String>>,
    latency: Duration,
    reject_writes: AtomicBool,
}

impl Backend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn script(self, store: &'static str, scripts: impl IntoIterator<Item = Script>) -> Self {
        self.scripts
            .lock()
            .expect("scripts")
            .insert(store, scripts.into_iter().collect());
        self
    }

    pub(crate) fn items(self, store: &'static str, items: &[&'static str]) -> Self {
        self.script(store, [Script::Items(items.to_vec())])
    }

    pub(crate) fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub(crate) fn fetches(&self, store: &str) -> usize {
        self.fetches
            .lock()
            .expect("fetches")
            .get(store)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().expect("events").clone()
    }

    fn next_script(&self, store: &'static str) -> Script {
        let mut scripts = self.scripts.lock().expect("scripts");
        match scripts.get_mut(store) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) => queue.first().cloned().unwrap_or(Script::Items(Vec::new())),
            None => Script::Items(Vec::new()),
        }
    }

    pub(crate) async fn fetch(&self, store: &'static str) -> Result<Vec<String>> {
        let script = self.next_script(store);
        *self.fetches.lock().expect("fetches").entry(store).or_default() += 1;
        self.events.lock().expect("events").push(format!("start:{store}"));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.events.lock().expect("events").push(format!("end:{store}"));

        match script {
            Script::Items(items) => Ok(items.into_iter().map(String::from).collect()),
            Script::Fail(message) => Err(anyhow!(message)),
            Script::Panic(message) => panic!("{message}"),
        }
    }

    pub(crate) async fn create(&self, store: &'static str, item: &str) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("cannot add `{item}` to {store}: backend is read-only"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub(crate) fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notices").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().expect("notices").push(notice);
    }
}

/// Environment whose notices are recorded for assertions.
pub(crate) struct TestEnv {
    pub(crate) params: RouteParams,
    pub(crate) location: Location,
    pub(crate) notifier: Arc<RecordingNotifier>,
}

impl TestEnv {
    pub(crate) fn at(path: &str) -> Self {
        Self {
            params: RouteParams::new(),
            location: Location::new(path),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub(crate) fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }
}

impl Environment for TestEnv {
    fn route_params(&self) -> RouteParams {
        self.params.clone()
    }

    fn location(&self) -> Location {
        self.location.clone()
    }

    fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }
}

/// Domain store holding one fetched list.
pub(crate) struct ListStore {
    name: &'static str,
    backend: Arc<Backend>,
    reactor: Reactor,
    deps: Observable<Arc<DepsSnapshot>>,
    pub(crate) items: Observable<Vec<String>>,
    pub(crate) loaded: Observable<bool>,
    pub(crate) count: Computed<usize>,
}

impl ListStore {
    pub(crate) fn new<S>(name: &'static str, ctx: &StoreContext<S>) -> Arc<Self>
    where
        S: StoreSet<Services = Backend>,
    {
        let items = ctx.observable(Vec::<String>::new());
        let count = {
            let items = items.clone();
            Computed::new(ctx.reactor(), [items.dep()], move || items.with(Vec::len))
        };
        Arc::new(Self {
            name,
            backend: Arc::clone(ctx.services()),
            reactor: ctx.reactor().clone(),
            deps: ctx.deps(),
            items,
            loaded: ctx.observable(false),
            count,
        })
    }

    /// Action: persists then appends; failures go to the notifier.
    pub(crate) async fn add(&self, item: &str) -> bool {
        let notifier = Arc::clone(self.deps.get().notifier());
        run_action(notifier.as_ref(), "add_item", async {
            self.backend.create(self.name, item).await?;
            self.items.update(|items| items.push(item.to_string()));
            Ok(())
        })
        .await
        .is_some()
    }
}

#[async_trait]
impl Store for ListStore {
    async fn init(&self) -> Result<()> {
        let items = self.backend.fetch(self.name).await?;
        self.reactor.batch(|| {
            self.items.set(items);
            self.loaded.set(true);
        });
        Ok(())
    }
}

/// UI store: selection is cleared whenever the route changes.
pub(crate) struct SelectionStore {
    pub(crate) selected: Observable<Option<String>>,
    pub(crate) modal_open: Observable<bool>,
}

impl SelectionStore {
    pub(crate) fn new<S: StoreSet>(ctx: &StoreContext<S>) -> Arc<Self> {
        let selected = ctx.observable(None::<String>);
        let on_navigate = {
            let selected = selected.clone();
            ctx.deps().subscribe(move || {
                selected.set(None);
            })
        };
        ctx.reactor().keep(on_navigate);
        Arc::new(Self {
            selected,
            modal_open: ctx.observable(false),
        })
    }

    pub(crate) fn select(&self, item: &str) {
        self.selected.reactor().batch(|| {
            self.selected.set(Some(item.to_string()));
            self.modal_open.set(true);
        });
    }
}

#[async_trait]
impl Store for SelectionStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }
}

/// Three parallel domain stores plus a UI store.
pub(crate) struct PageStores {
    pub(crate) users: Arc<ListStore>,
    pub(crate) permissions: Arc<ListStore>,
    pub(crate) teams: Arc<ListStore>,
    pub(crate) selection: Arc<SelectionStore>,
}

impl StoreSet for PageStores {
    type Services = Backend;

    fn build(ctx: &StoreContext<Self>) -> Self {
        Self {
            users: ListStore::new("users", ctx),
            permissions: ListStore::new("permissions", ctx),
            teams: ListStore::new("teams", ctx),
            selection: SelectionStore::new(ctx),
        }
    }

    fn entries(&self) -> Vec<StoreEntry> {
        vec![
            StoreEntry::parallel("users", &self.users),
            StoreEntry::parallel("permissions", &self.permissions),
            StoreEntry::parallel("teams", &self.teams),
            StoreEntry::parallel("selection", &self.selection),
        ]
    }
}

/// Derives roles from the permissions sibling once it has initialized.
pub(crate) struct RolesStore {
    root: RootRef<ChainStores>,
    backend: Arc<Backend>,
    pub(crate) roles: Observable<Vec<String>>,
    pub(crate) root_reachable_at_build: bool,
}

#[async_trait]
impl Store for RolesStore {
    async fn init(&self) -> Result<()> {
        self.backend.fetch("roles").await?;
        let root = self.root.upgrade()?;
        let granted = root.stores().permissions.items.get();
        self.roles
            .set(granted.iter().map(|permission| format!("role:{permission}")).collect());
        Ok(())
    }
}

pub(crate) struct ChainStores {
    pub(crate) permissions: Arc<ListStore>,
    pub(crate) roles: Arc<RolesStore>,
    pub(crate) audit: Arc<ListStore>,
}

impl StoreSet for ChainStores {
    type Services = Backend;

    fn build(ctx: &StoreContext<Self>) -> Self {
        let root = ctx.root();
        let root_reachable_at_build = root.upgrade().is_ok();
        Self {
            permissions: ListStore::new("permissions", ctx),
            roles: Arc::new(RolesStore {
                root,
                backend: Arc::clone(ctx.services()),
                roles: ctx.observable(Vec::new()),
                root_reachable_at_build,
            }),
            audit: ListStore::new("audit", ctx),
        }
    }

    fn entries(&self) -> Vec<StoreEntry> {
        vec![
            StoreEntry::parallel("permissions", &self.permissions),
            StoreEntry::after("roles", "permissions", &self.roles),
            StoreEntry::parallel("audit", &self.audit),
        ]
    }
}

/// Declares a dependency on a store listed after it.
pub(crate) struct ForwardRefStores {
    a: Arc<ListStore>,
    b: Arc<ListStore>,
}

impl StoreSet for ForwardRefStores {
    type Services = Backend;

    fn build(ctx: &StoreContext<Self>) -> Self {
        Self {
            a: ListStore::new("a", ctx),
            b: ListStore::new("b", ctx),
        }
    }

    fn entries(&self) -> Vec<StoreEntry> {
        vec![
            StoreEntry::after("a", "b", &self.a),
            StoreEntry::parallel("b", &self.b),
        ]
    }
}

pub(crate) struct DuplicateStores {
    a: Arc<ListStore>,
}

impl StoreSet for DuplicateStores {
    type Services = Backend;

    fn build(ctx: &StoreContext<Self>) -> Self {
        Self {
            a: ListStore::new("a", ctx),
        }
    }

    fn entries(&self) -> Vec<StoreEntry> {
        vec![
            StoreEntry::parallel("a", &self.a),
            StoreEntry::parallel("a", &self.a),
        ]
    }
}

/// Its constructor looks at the registry that is building it.
pub(crate) struct ReentrantStores {
    pub(crate) scopes_seen_at_build: Option<usize>,
    selection: Arc<SelectionStore>,
}

impl StoreSet for ReentrantStores {
    type Services = OnceLock<Weak<Registry<ReentrantStores>>>;

    fn build(ctx: &StoreContext<Self>) -> Self {
        Self {
            scopes_seen_at_build: ctx
                .services()
                .get()
                .and_then(Weak::upgrade)
                .map(|registry| registry.len()),
            selection: SelectionStore::new(ctx),
        }
    }

    fn entries(&self) -> Vec<StoreEntry> {
        vec![StoreEntry::parallel("selection", &self.selection)]
    }
}
