use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

use super::*;

fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn partial_file_keeps_defaults_for_missing_keys() {
    let settings = parse_settings("fetch_latency_ms = 10\n").expect("parse");
    assert_eq!(settings.fetch_latency_ms, 10);
    assert_eq!(settings.log_filter, "info");
    assert_eq!(settings.initial_path, "/users");
}

#[test]
fn env_overrides_file_values() {
    let mut settings = parse_settings(
        "log_filter = \"debug\"\nfail_permissions_attempts = 1\n",
    )
    .expect("parse");

    apply_env(
        &mut settings,
        vars(&[
            ("APP__LOG_FILTER", "store_core=trace"),
            ("APP__FAIL_PERMISSIONS_ATTEMPTS", "3"),
            ("APP__INITIAL_PATH", "/teams"),
        ]),
    );

    assert_eq!(settings.log_filter, "store_core=trace");
    assert_eq!(settings.fail_permissions_attempts, 3);
    assert_eq!(settings.initial_path, "/teams");
}

#[test]
fn unparsable_numbers_in_env_are_ignored() {
    let mut settings = DemoSettings::default();
    apply_env(&mut settings, vars(&[("APP__FETCH_LATENCY_MS", "soon")]));
    assert_eq!(settings.fetch_latency_ms, DemoSettings::default().fetch_latency_ms);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let missing = env::temp_dir().join(format!("store_demo_missing_{suffix}.toml"));

    assert!(load_settings(Some(&missing)).is_err());
}

#[test]
fn explicit_file_is_loaded() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("store_demo_{suffix}.toml"));
    fs::write(&path, "initial_path = \"/roles\"\nfetch_latency_ms = 5\n").expect("write");

    let settings = load_settings(Some(&path)).expect("load");
    assert_eq!(settings.fetch_latency_ms, 5);

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn malformed_file_is_reported() {
    assert!(parse_settings("fetch_latency_ms = \"fast\"").is_err());
}
