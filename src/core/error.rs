//! Error types for executor operations.

use std::sync::Arc;

use thiserror::Error;

use super::worker_pool::PoolError;

/// Errors produced by the executor facade and task handles.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// An argument failed validation; no task was created.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The executor is shut down and accepts no new work.
    #[error("task rejected: executor is shut down")]
    Rejected,
    /// The action itself failed (returned an error or panicked).
    #[error("task execution failed: {0}")]
    Execution(Arc<anyhow::Error>),
    /// The task was cancelled before it produced a result.
    #[error("task was cancelled")]
    Cancelled,
    /// A deadline elapsed before the awaited work completed.
    #[error("timed out waiting for task")]
    Timeout,
    /// Every candidate of an `invoke_any` failed; carries the last failure seen.
    #[error("all tasks failed, last failure: {0}")]
    AllFailed(Arc<anyhow::Error>),
    /// The worker pool could not run the task.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl ExecutorError {
    /// Whether this error carries a failure raised by the action.
    #[must_use]
    pub const fn is_execution_failure(&self) -> bool {
        matches!(self, Self::Execution(_) | Self::AllFailed(_))
    }
}

/// Result type for action bodies; any error becomes an execution failure.
pub type AppResult<T> = Result<T, anyhow::Error>;
