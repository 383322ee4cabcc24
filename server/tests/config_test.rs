use std::collections::HashMap;
use std::time::Duration;

use sundash_server::config::{DEFAULT_HOST, DEFAULT_PORT};
use sundash_server::{ServerConfig, ServerError};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn test_defaults() {
    let config = ServerConfig::from_lookup(lookup(&[]));
    assert_eq!(config, ServerConfig::default());
    assert_eq!(config.addr(), format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT));
    assert_eq!(config.tick_period(), Duration::from_secs(1));
}

#[test]
fn test_env_overrides() {
    let config = ServerConfig::from_lookup(lookup(&[
        ("SUNDASH_HOST", "0.0.0.0"),
        ("SUNDASH_PORT", "8080"),
        ("SUNDASH_TICK_MS", "250"),
        ("SUNDASH_LOG", "debug"),
    ]));
    assert_eq!(config.addr(), "0.0.0.0:8080");
    assert_eq!(config.tick_period(), Duration::from_millis(250));
    assert_eq!(config.log_filter, "debug");
}

#[test]
fn test_bad_env_values_fall_back() {
    let config = ServerConfig::from_lookup(lookup(&[
        ("SUNDASH_PORT", "not-a-port"),
        ("SUNDASH_TICK_MS", "0"),
        ("SUNDASH_HOST", "  "),
    ]));
    assert_eq!(config, ServerConfig::default());
}

#[test]
fn test_toml_overlay_keeps_unset_keys() {
    let base = ServerConfig::from_lookup(lookup(&[("SUNDASH_HOST", "0.0.0.0")]));
    let config = base.overlay_toml("port = 9000\ntick_interval_ms = 500\n").unwrap();
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 9000);
    assert_eq!(config.tick_interval_ms, 500);
}

#[test]
fn test_toml_rejects_unknown_keys_and_zero_tick() {
    let unknown = ServerConfig::default().overlay_toml("colour = \"blue\"");
    assert!(matches!(unknown, Err(ServerError::Config(_))));

    let zero = ServerConfig::default().overlay_toml("tick_interval_ms = 0");
    assert!(matches!(zero, Err(ServerError::Config(_))));
}
