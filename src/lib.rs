//! # Prometheus Scheduled Executor
//!
//! An unbounded scheduled executor: delayed, fixed-rate and fixed-delay tasks on an
//! elastic pool of OS threads, driven by a single dispatcher and a pluggable clock.
//!
//! Classic scheduled thread pools bound their worker count, so a handful of slow or
//! blocking tasks can starve everything queued behind them. Here the pool grows on
//! demand instead, and idle workers retire after a keep-alive.
//!
//! ## Core Design
//!
//! - **One dispatcher**: a single thread owns every timing decision and never runs user code
//! - **Ready queue**: ordered by `(next run time, sequence)`; equal times run in submission order
//! - **Elastic pool**: a due task rendezvouses with an idle worker or gets a new thread
//! - **Pluggable time**: [`SystemTimeSource`] in production, [`VirtualTimeSource`] in tests
//!
//! ## Key Features
//!
//! - **Futures**: every submission returns a [`TaskHandle`] with `get`, `get_timeout` and `cancel`
//! - **Periodic tasks**: fixed-rate anchors on schedule, fixed-delay on completion
//! - **Aggregates**: `invoke_all` and `invoke_any`, with or without a timeout
//! - **Cooperative interruption**: task bodies poll [`is_interrupted`]
//! - **Graceful and abrupt shutdown**: `shutdown` drains, `shutdown_now` cancels and interrupts
//! - **Async bridge**: `TaskHandle::get_async` under the `tokio-runtime` feature
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use prometheus_scheduled_executor::{ExecutorBuilder, ExecutorConfig};
//!
//! let executor = ExecutorBuilder::new()
//!     .config(ExecutorConfig::new().with_keep_alive(Duration::from_secs(30)))
//!     .build()?;
//!
//! let report = executor.schedule_callable(|| Ok("report ready"), Duration::from_millis(100))?;
//! let heartbeat = executor.schedule_with_fixed_delay(
//!     || tracing::info!("heartbeat"),
//!     Duration::ZERO,
//!     Duration::from_secs(5),
//! )?;
//!
//! assert_eq!(report.get()?, "report ready");
//! heartbeat.cancel(false);
//!
//! executor.shutdown();
//! executor.await_termination(Duration::from_secs(10));
//! ```
//!
//! ## Deterministic Tests
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use prometheus_scheduled_executor::{ScheduledExecutor, VirtualTimeSource};
//!
//! let clock = Arc::new(VirtualTimeSource::new());
//! let executor = ScheduledExecutor::with_time_source(clock.clone())?;
//! let handle = executor.schedule(|| {}, Duration::from_millis(100))?;
//!
//! clock.advance(Duration::from_millis(100));
//! handle.get()?;
//! ```
//!
//! For complete examples, see `tests/executor_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling: tasks, queue, dispatcher, worker pool and the executor facade.
pub mod core;
/// Configuration models for the executor.
pub mod config;
/// Builders to construct executors from configuration.
pub mod builders;
/// Async runtime adapters.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Shared utilities: time sources and tracing setup.
pub mod util;

pub use builders::ExecutorBuilder;
pub use config::ExecutorConfig;
pub use crate::core::{
    current_interrupt, is_interrupted, AppResult, Callable, ExecutorError, ExecutorStats,
    InterruptToken, Lifecycle, PoolStats, ScheduledExecutor, TaskHandle, TaskId, TaskKind,
    TaskState, UnstartedTask,
};
pub use util::clock::{SystemTimeSource, TimeSource, VirtualTimeSource};
