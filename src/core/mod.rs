//! Core scheduling: tasks, the ready queue, the dispatcher and the worker pool.

pub mod error;
pub mod executor;
pub mod task;
pub mod worker_pool;

mod dispatcher;
mod queue;

pub use dispatcher::Lifecycle;
pub use error::{AppResult, ExecutorError};
pub use executor::{ExecutorStats, ScheduledExecutor};
pub use task::{
    current_interrupt, is_interrupted, Callable, InterruptToken, TaskHandle, TaskId, TaskKind,
    TaskState, UnstartedTask,
};
pub use worker_pool::{Job, PoolError, PoolStats, WorkerPool};
