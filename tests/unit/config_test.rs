//! Tests for configuration validation

use std::collections::HashMap;
use std::time::Duration;

use prometheus_scheduled_executor::config::{ExecutorConfig, ENV_PREFIX};

#[test]
fn test_defaults_are_valid() {
    let cfg = ExecutorConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.keep_alive(), Duration::from_secs(60));
    assert_eq!(cfg.max_idle_workers, 256);
    assert_eq!(cfg.thread_name_prefix, "scheduled-worker");
    assert_eq!(cfg.dispatcher_thread_name, "scheduled-dispatcher");
    assert_eq!(cfg.thread_stack_size, None);
    assert!(!cfg.continue_periodic_after_shutdown);
}

#[test]
fn test_builder_methods() {
    let cfg = ExecutorConfig::new()
        .with_keep_alive(Duration::from_millis(1500))
        .with_max_idle_workers(8)
        .with_thread_name_prefix("io-worker")
        .with_thread_stack_size(512 * 1024)
        .with_continue_periodic_after_shutdown(true);

    assert_eq!(cfg.keep_alive_ms, 1500);
    assert_eq!(cfg.max_idle_workers, 8);
    assert_eq!(cfg.thread_name_prefix, "io-worker");
    assert_eq!(cfg.thread_stack_size, Some(512 * 1024));
    assert!(cfg.continue_periodic_after_shutdown);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_invalid_keep_alive() {
    let cfg = ExecutorConfig::new().with_keep_alive(Duration::ZERO);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_thread_names() {
    let cfg = ExecutorConfig::new().with_thread_name_prefix("  ");
    assert!(cfg.validate().is_err());

    let cfg = ExecutorConfig {
        dispatcher_thread_name: String::new(),
        ..ExecutorConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_stack_size() {
    let cfg = ExecutorConfig::new().with_thread_stack_size(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_json_partial_document_keeps_defaults() {
    let json = r#"{ "keep_alive_ms": 250, "max_idle_workers": 2 }"#;
    let cfg = ExecutorConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.keep_alive_ms, 250);
    assert_eq!(cfg.max_idle_workers, 2);
    assert_eq!(cfg.thread_name_prefix, "scheduled-worker");
}

#[test]
fn test_json_roundtrip() {
    let cfg = ExecutorConfig::new().with_max_idle_workers(3);
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(ExecutorConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_json_rejects_invalid() {
    assert!(ExecutorConfig::from_json_str("not json").is_err());
    assert!(ExecutorConfig::from_json_str(r#"{ "keep_alive_ms": 0 }"#).is_err());
}

#[test]
fn test_lookup_rejects_unparsable_value() {
    let vars: HashMap<String, String> =
        [(format!("{ENV_PREFIX}MAX_IDLE_WORKERS"), "many".to_string())]
            .into_iter()
            .collect();
    let err = ExecutorConfig::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
    assert!(err.contains("SCHEDULER_MAX_IDLE_WORKERS"));
}

#[test]
fn test_lookup_without_variables_is_default() {
    let cfg = ExecutorConfig::from_lookup(|_| None).unwrap();
    assert_eq!(cfg, ExecutorConfig::default());
}
