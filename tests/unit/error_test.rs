//! Tests for error types

use std::sync::Arc;

use anyhow::anyhow;
use prometheus_scheduled_executor::core::PoolError;
use prometheus_scheduled_executor::ExecutorError;

#[test]
fn test_rejected_error() {
    let err = ExecutorError::Rejected;
    assert_eq!(format!("{}", err), "task rejected: executor is shut down");
    assert!(!err.is_execution_failure());
}

#[test]
fn test_invalid_argument_error() {
    let err = ExecutorError::InvalidArgument("period must be greater than zero".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid argument: period must be greater than zero"
    );
}

#[test]
fn test_cancelled_and_timeout_errors() {
    assert_eq!(format!("{}", ExecutorError::Cancelled), "task was cancelled");
    assert_eq!(format!("{}", ExecutorError::Timeout), "timed out waiting for task");
}

#[test]
fn test_execution_error_carries_cause() {
    let err = ExecutorError::Execution(Arc::new(anyhow!("disk full")));
    assert_eq!(format!("{}", err), "task execution failed: disk full");
    assert!(err.is_execution_failure());

    // Clones share the same underlying failure
    let clone = err.clone();
    assert_eq!(clone.to_string(), err.to_string());
}

#[test]
fn test_all_failed_error() {
    let err = ExecutorError::AllFailed(Arc::new(anyhow!("last one")));
    assert_eq!(format!("{}", err), "all tasks failed, last failure: last one");
    assert!(err.is_execution_failure());
}

#[test]
fn test_pool_error_is_transparent() {
    let err: ExecutorError = PoolError::PoolShutdown.into();
    assert_eq!(format!("{}", err), "pool has been shut down");

    let err: ExecutorError = PoolError::Spawn("out of threads".to_string()).into();
    assert_eq!(format!("{}", err), "failed to spawn worker thread: out of threads");

    let err: ExecutorError = PoolError::InvalidConfig("bad".to_string()).into();
    assert_eq!(format!("{}", err), "invalid configuration: bad");
}
