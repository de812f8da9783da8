//! Tests for builder modules

use std::sync::Arc;
use std::time::Duration;

use prometheus_scheduled_executor::core::PoolError;
use prometheus_scheduled_executor::{
    ExecutorBuilder, ExecutorConfig, ExecutorError, VirtualTimeSource,
};

#[test]
fn test_builder_defaults_to_system_clock() {
    let executor = ExecutorBuilder::new().build().unwrap();
    let handle = executor.submit_callable(|| Ok(21 * 2)).unwrap();
    assert_eq!(handle.get_timeout(Duration::from_secs(5)).unwrap(), 42);
    executor.shutdown();
    assert!(executor.await_termination(Duration::from_secs(5)));
}

#[test]
fn test_builder_uses_given_time_source() {
    let clock = Arc::new(VirtualTimeSource::new());
    clock.advance(Duration::from_secs(7));
    let executor = ExecutorBuilder::new().time_source(clock.clone()).build().unwrap();
    assert_eq!(executor.time_source().now(), Duration::from_secs(7));
    executor.shutdown_now();
}

#[test]
fn test_builder_rejects_invalid_config() {
    let result = ExecutorBuilder::new()
        .config(ExecutorConfig::new().with_keep_alive(Duration::ZERO))
        .build();
    assert!(matches!(
        result,
        Err(ExecutorError::Pool(PoolError::InvalidConfig(_)))
    ));
}

#[test]
fn test_builder_from_config_json() {
    let builder =
        ExecutorBuilder::from_config_json(r#"{ "thread_name_prefix": "json-worker" }"#).unwrap();
    let executor = builder.build().unwrap();
    let name = executor
        .submit_callable(|| Ok(std::thread::current().name().map(str::to_owned)))
        .unwrap()
        .get_timeout(Duration::from_secs(5))
        .unwrap();
    assert!(name.unwrap().starts_with("json-worker"));
    executor.shutdown();

    assert!(matches!(
        ExecutorBuilder::from_config_json("{"),
        Err(ExecutorError::Pool(PoolError::InvalidConfig(_)))
    ));
}
