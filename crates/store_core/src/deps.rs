//! Ambient inputs captured when a scope's stores are created.

use std::{collections::BTreeMap, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::action::{Notifier, TracingNotifier};

pub type RouteParams = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: BTreeMap::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, to: &str);
}

pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, to: &str) {
        debug!(to, "navigation requested without a navigator");
    }
}

/// Source of the raw ambient values (router, window location, ...).
pub trait Environment: Send + Sync {
    fn route_params(&self) -> RouteParams;
    fn location(&self) -> Location;

    fn navigator(&self) -> Arc<dyn Navigator> {
        Arc::new(NoopNavigator)
    }

    fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::new(TracingNotifier)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    pub params: RouteParams,
    pub location: Location,
}

impl StaticEnvironment {
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            params: RouteParams::new(),
            location: Location::new(path),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl Environment for StaticEnvironment {
    fn route_params(&self) -> RouteParams {
        self.params.clone()
    }

    fn location(&self) -> Location {
        self.location.clone()
    }
}

/// Read-only capture of the ambient inputs.
///
/// Stores read it through the root coordinator; only the access layer swaps
/// it, and only when the captured inputs differ.
#[derive(Clone)]
pub struct DepsSnapshot {
    params: RouteParams,
    location: Location,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    captured_at: DateTime<Utc>,
}

impl DepsSnapshot {
    pub fn capture(env: &dyn Environment) -> Self {
        Self {
            params: env.route_params(),
            location: env.location(),
            navigator: env.navigator(),
            notifier: env.notifier(),
            captured_at: Utc::now(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Compares the captured values; handles and capture time are ignored.
    pub fn same_inputs(&self, other: &DepsSnapshot) -> bool {
        self.params == other.params && self.location == other.location
    }
}

impl Default for DepsSnapshot {
    fn default() -> Self {
        Self::capture(&StaticEnvironment::default())
    }
}

impl fmt::Debug for DepsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepsSnapshot")
            .field("params", &self.params)
            .field("location", &self.location)
            .field("captured_at", &self.captured_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_reads_route_and_location() {
        let env = StaticEnvironment::at("/users")
            .with_param("org", "acme");
        let snapshot = DepsSnapshot::capture(&env);

        assert_eq!(snapshot.param("org"), Some("acme"));
        assert_eq!(snapshot.param("missing"), None);
        assert_eq!(snapshot.location().path, "/users");
    }

    #[test]
    fn same_inputs_ignores_capture_time() {
        let env = StaticEnvironment::at("/users").with_param("org", "acme");
        let first = DepsSnapshot::capture(&env);
        let second = DepsSnapshot::capture(&env);
        assert!(first.same_inputs(&second));

        let moved = DepsSnapshot::capture(&StaticEnvironment::at("/roles").with_param("org", "acme"));
        assert!(!first.same_inputs(&moved));

        let queried = DepsSnapshot::capture(&StaticEnvironment {
            params: env.params.clone(),
            location: Location::new("/users").with_query("page", "2"),
        });
        assert!(!first.same_inputs(&queried));
    }
}
