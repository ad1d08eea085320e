use std::{fs, io::ErrorKind, path::Path};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "demo.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    pub log_filter: String,
    pub fetch_latency_ms: u64,
    /// How many initial permission fetches the simulated backend rejects.
    pub fail_permissions_attempts: u32,
    pub initial_path: String,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
            fetch_latency_ms: 150,
            fail_permissions_attempts: 0,
            initial_path: "/users".into(),
        }
    }
}

/// Defaults, then the toml file, then `APP__*` environment overrides.
///
/// A missing file is only an error when `path` was given explicitly.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<DemoSettings> {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    let mut settings = match fs::read_to_string(file) {
        Ok(raw) => parse_settings(&raw)
            .with_context(|| format!("invalid settings in '{}'", file.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound && path.is_none() => DemoSettings::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", file.display()))
        }
    };

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn parse_settings(raw: &str) -> anyhow::Result<DemoSettings> {
    Ok(toml::from_str(raw)?)
}

pub fn apply_env(settings: &mut DemoSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
    if let Some(v) = var("APP__FETCH_LATENCY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.fetch_latency_ms = parsed;
        }
    }
    if let Some(v) = var("APP__FAIL_PERMISSIONS_ATTEMPTS") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.fail_permissions_attempts = parsed;
        }
    }
    if let Some(v) = var("APP__INITIAL_PATH") {
        settings.initial_path = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
