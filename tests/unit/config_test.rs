//! Tests for configuration validation

use std::collections::HashMap;
use std::time::Duration;

use resume_parse_pool::config::{default_pool_size, WorkerPoolConfig};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_default_config_is_valid() {
    let cfg = WorkerPoolConfig::new();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.pool_size, default_pool_size());
    assert_eq!(cfg.max_queue_depth, None);
    assert_eq!(cfg.task_timeout(), None);
}

#[test]
fn test_invalid_pool_size() {
    assert!(WorkerPoolConfig::new().with_pool_size(0).validate().is_err());
}

#[test]
fn test_invalid_queue_depth() {
    assert!(WorkerPoolConfig::new().with_max_queue_depth(0).validate().is_err());
}

#[test]
fn test_invalid_timeout() {
    assert!(WorkerPoolConfig::new()
        .with_task_timeout(Duration::ZERO)
        .validate()
        .is_err());
}

#[test]
fn test_invalid_stack_size() {
    assert!(WorkerPoolConfig::new()
        .with_thread_stack_size(1024)
        .validate()
        .is_err());
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "pool_size": 3,
        "max_queue_depth": 64,
        "task_timeout_ms": 30000
    }"#;

    let cfg = WorkerPoolConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.pool_size, 3);
    assert_eq!(cfg.max_queue_depth, Some(64));
    assert_eq!(cfg.task_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(cfg.thread_name_prefix, "parse-unit");
}

#[test]
fn test_config_from_json_rejects_invalid() {
    assert!(WorkerPoolConfig::from_json_str(r#"{"pool_size": 0}"#).is_err());
    assert!(WorkerPoolConfig::from_json_str("not json").is_err());
}

#[test]
fn test_config_from_lookup() {
    let cfg = WorkerPoolConfig::from_lookup(lookup(&[
        ("PARSE_POOL_SIZE", "5"),
        ("PARSE_POOL_MAX_QUEUE_DEPTH", "100"),
        ("PARSE_POOL_TASK_TIMEOUT_MS", " 250 "),
        ("PARSE_POOL_THREAD_PREFIX", "resume"),
    ]))
    .unwrap();

    assert_eq!(cfg.pool_size, 5);
    assert_eq!(cfg.max_queue_depth, Some(100));
    assert_eq!(cfg.task_timeout(), Some(Duration::from_millis(250)));
    assert_eq!(cfg.thread_name_prefix, "resume");
}

#[test]
fn test_config_from_lookup_defaults_and_errors() {
    let cfg = WorkerPoolConfig::from_lookup(lookup(&[])).unwrap();
    assert_eq!(cfg, WorkerPoolConfig::default());

    let err = WorkerPoolConfig::from_lookup(lookup(&[("PARSE_POOL_SIZE", "many")])).unwrap_err();
    assert!(err.contains("PARSE_POOL_SIZE"));
}
