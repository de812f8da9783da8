//! Elastic worker pool that executes dispatched tasks on dedicated OS threads.
//!
//! The pool never queues work in front of its threads. A handed-off job either
//! rendezvouses with a parked idle worker or gets a freshly spawned thread, so
//! the dispatcher is never blocked by execution capacity.
//!
//! # Key Features
//!
//! - **Unbounded growth**: a new worker is spawned whenever no idle worker is parked
//! - **Idle retirement**: parked workers exit after the keep-alive elapses
//! - **Bounded idle cache**: at most `max_idle_workers` park at once
//! - **Panic isolation**: a panicking job is counted and the worker keeps running
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_scheduled_executor::config::ExecutorConfig;
//! use prometheus_scheduled_executor::core::WorkerPool;
//!
//! let pool = WorkerPool::new(&ExecutorConfig::new())?;
//! pool.execute(Box::new(|| println!("hello from a worker")))?;
//! pool.shutdown();
//! ```

mod native;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Unit of work accepted by the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors that can occur when using a `WorkerPool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been shut down.
    PoolShutdown,

    /// A worker thread could not be spawned.
    Spawn(String),

    /// Configuration validation failed.
    InvalidConfig(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::Spawn(msg) => write!(f, "failed to spawn worker thread: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Worker threads currently alive (busy or idle).
    pub live_workers: usize,

    /// Worker threads parked waiting for a handoff.
    pub idle_workers: usize,

    /// Highest number of simultaneously live workers observed.
    pub largest_pool_size: usize,

    /// Total worker threads spawned over the pool's lifetime.
    pub spawned_workers: u64,

    /// Jobs handed directly to an already-idle worker.
    pub handoffs: u64,

    /// Jobs that ran to completion.
    pub completed_jobs: u64,

    /// Jobs that panicked.
    pub panicked_jobs: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub live_workers: AtomicUsize,
    pub idle_workers: AtomicUsize,
    pub largest_pool_size: AtomicUsize,
    pub spawned_workers: AtomicU64,
    pub handoffs: AtomicU64,
    pub completed_jobs: AtomicU64,
    pub panicked_jobs: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            live_workers: self.live_workers.load(Ordering::Relaxed),
            idle_workers: self.idle_workers.load(Ordering::Relaxed),
            largest_pool_size: self.largest_pool_size.load(Ordering::Relaxed),
            spawned_workers: self.spawned_workers.load(Ordering::Relaxed),
            handoffs: self.handoffs.load(Ordering::Relaxed),
            completed_jobs: self.completed_jobs.load(Ordering::Relaxed),
            panicked_jobs: self.panicked_jobs.load(Ordering::Relaxed),
        }
    }

    /// Record a worker coming alive and track the high-water mark.
    pub fn worker_started(&self) {
        let live = self.live_workers.fetch_add(1, Ordering::AcqRel) + 1;
        self.largest_pool_size.fetch_max(live, Ordering::AcqRel);
    }
}

pub use native::WorkerPool;
