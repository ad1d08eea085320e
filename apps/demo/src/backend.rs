//! In-process stand-in for the admin API the demo stores fetch from.

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use tracing::debug;

pub struct DemoBackend {
    latency: Duration,
    permission_failures: AtomicU32,
    users: Mutex<Vec<String>>,
}

impl DemoBackend {
    pub fn new(latency: Duration, permission_failures: u32) -> Self {
        Self {
            latency,
            permission_failures: AtomicU32::new(permission_failures),
            users: Mutex::new(vec!["ada".into(), "grace".into(), "linus".into()]),
        }
    }

    async fn round_trip(&self, call: &'static str) {
        debug!(call, latency_ms = self.latency.as_millis() as u64, "backend call");
        tokio::time::sleep(self.latency).await;
    }

    pub async fn list_users(&self) -> Result<Vec<String>> {
        self.round_trip("list_users").await;
        Ok(self.users.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// Rejects while the configured number of failures has not been used up.
    pub async fn list_permissions(&self) -> Result<Vec<String>> {
        self.round_trip("list_permissions").await;
        let rejected = self
            .permission_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
            .is_ok();
        if rejected {
            bail!("permissions service unavailable");
        }
        Ok(vec!["users.read".into(), "users.write".into(), "audit.read".into()])
    }

    pub async fn roles_for(&self, permissions: &[String]) -> Result<Vec<String>> {
        self.round_trip("roles_for").await;
        let mut roles = vec!["viewer".to_string()];
        if permissions.iter().any(|p| p.ends_with(".write")) {
            roles.push("editor".into());
        }
        Ok(roles)
    }

    pub async fn invite(&self, name: &str) -> Result<()> {
        self.round_trip("invite").await;
        let name = name.trim();
        if name.is_empty() {
            bail!("a user name is required");
        }
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if users.iter().any(|user| user == name) {
            bail!("user `{name}` already exists");
        }
        users.push(name.to_string());
        Ok(())
    }
}
