//! Native implementation of `WorkerPool` using OS threads.
//!
//! # Design Principles
//!
//! - **No queueing**: handoff is a zero-capacity rendezvous channel
//! - **No polling**: idle workers block in `recv_timeout`; waiters use a Condvar
//! - **Clean shutdown**: dropping the sender unblocks every parked worker

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::ExecutorConfig;

use super::{Job, PoolCounters, PoolError, PoolStats};

/// Live worker count paired with a Condvar for exit notification.
#[derive(Debug, Default)]
struct LiveWorkers {
    count: Mutex<usize>,
    exited: Condvar,
}

impl LiveWorkers {
    fn enter(&self) {
        *self.count.lock() += 1;
    }

    fn leave(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.exited.notify_all();
        }
    }
}

/// Elastic pool of worker threads.
///
/// # Design
///
/// - **Rendezvous handoff**: `try_send` only succeeds when a worker is parked in `recv`
/// - **Spawn on miss**: otherwise the job travels with a newly spawned thread
/// - **Detached threads**: workers are tracked by count, not by `JoinHandle`
pub struct WorkerPool {
    /// Idle worker keep-alive.
    keep_alive: Duration,

    /// Maximum number of workers parked at once.
    max_idle: usize,

    /// Worker thread name prefix.
    name_prefix: String,

    /// Optional worker stack size.
    stack_size: Option<usize>,

    /// Handoff sender. Option allows clean shutdown by dropping.
    handoff_tx: Mutex<Option<Sender<Job>>>,

    /// Handoff receiver, cloned into each new worker.
    handoff_rx: Receiver<Job>,

    /// Pool statistics counters (lock-free atomics).
    counters: Arc<PoolCounters>,

    /// Live worker tracking for `await_exit`.
    live: Arc<LiveWorkers>,

    /// Shutdown flag (lock-free atomic).
    shutdown: Arc<AtomicBool>,

    /// Worker ID counter, used for thread names.
    worker_seq: AtomicU64,
}

impl WorkerPool {
    /// Create an empty pool. Threads are only spawned when work arrives.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: &ExecutorConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let (handoff_tx, handoff_rx) = bounded::<Job>(0);

        info!(
            keep_alive_ms = config.keep_alive_ms,
            max_idle_workers = config.max_idle_workers,
            "WorkerPool initialized (elastic, rendezvous handoff)"
        );

        Ok(Self {
            keep_alive: config.keep_alive(),
            max_idle: config.max_idle_workers,
            name_prefix: config.thread_name_prefix.clone(),
            stack_size: config.thread_stack_size,
            handoff_tx: Mutex::new(Some(handoff_tx)),
            handoff_rx,
            counters: Arc::new(PoolCounters::default()),
            live: Arc::new(LiveWorkers::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker_seq: AtomicU64::new(0),
        })
    }

    /// Hand a job to an idle worker, or spawn a new worker to run it.
    ///
    /// Never blocks waiting for capacity.
    ///
    /// # Errors
    ///
    /// - `PoolError::PoolShutdown` if the pool has been shut down
    /// - `PoolError::Spawn` if no idle worker exists and a thread could not be created
    pub fn execute(&self, job: Job) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }

        let job = {
            let guard = self.handoff_tx.lock();
            let Some(tx) = guard.as_ref() else {
                return Err(PoolError::PoolShutdown);
            };
            match tx.try_send(job) {
                Ok(()) => {
                    self.counters.handoffs.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(TrySendError::Full(job)) => job,
                Err(TrySendError::Disconnected(_)) => return Err(PoolError::PoolShutdown),
            }
        };

        self.spawn_worker(job)
    }

    fn spawn_worker(&self, first: Job) -> Result<(), PoolError> {
        let worker_id = self.worker_seq.fetch_add(1, Ordering::Relaxed);
        let mut builder = thread::Builder::new().name(format!("{}-{worker_id}", self.name_prefix));
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }

        let worker = Worker {
            id: worker_id,
            rx: self.handoff_rx.clone(),
            counters: Arc::clone(&self.counters),
            live: Arc::clone(&self.live),
            shutdown: Arc::clone(&self.shutdown),
            keep_alive: self.keep_alive,
            max_idle: self.max_idle,
        };

        self.live.enter();
        self.counters.worker_started();

        match builder.spawn(move || worker.run(first)) {
            Ok(_detached) => {
                self.counters.spawned_workers.fetch_add(1, Ordering::Relaxed);
                debug!(worker_id = worker_id, "Spawned worker thread");
                Ok(())
            }
            Err(e) => {
                self.counters.live_workers.fetch_sub(1, Ordering::AcqRel);
                self.live.leave();
                error!(worker_id = worker_id, error = %e, "Failed to spawn worker thread");
                Err(PoolError::Spawn(e.to_string()))
            }
        }
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop accepting jobs and release parked workers.
    ///
    /// Busy workers finish their current job and then exit. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        // Drop the sender to unblock all workers waiting on recv()
        self.handoff_tx.lock().take();

        info!(
            live_workers = self.counters.live_workers.load(Ordering::Relaxed),
            "Worker pool shutting down"
        );
    }

    /// Block until every worker thread has exited, or the timeout elapses.
    ///
    /// Returns `true` if no workers remain. `None` waits without a bound.
    pub fn await_exit(&self, timeout: Option<Duration>) -> bool {
        let mut count = self.live.count.lock();
        match timeout {
            None => {
                while *count > 0 {
                    self.live.exited.wait(&mut count);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while *count > 0 {
                    if self.live.exited.wait_until(&mut count, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        *count == 0
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Signal shutdown but DON'T wait; busy workers finish on their own
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.handoff_tx.lock().take();
            debug!("WorkerPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

/// State moved into a worker thread.
struct Worker {
    id: u64,
    rx: Receiver<Job>,
    counters: Arc<PoolCounters>,
    live: Arc<LiveWorkers>,
    shutdown: Arc<AtomicBool>,
    keep_alive: Duration,
    max_idle: usize,
}

impl Worker {
    fn run(self, first: Job) {
        debug!(worker_id = self.id, "Worker thread started");
        self.run_job(first);

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            let idle = self.counters.idle_workers.fetch_add(1, Ordering::AcqRel);
            if idle >= self.max_idle {
                self.counters.idle_workers.fetch_sub(1, Ordering::AcqRel);
                debug!(worker_id = self.id, "Idle cache full, retiring worker");
                break;
            }

            let next = self.rx.recv_timeout(self.keep_alive);
            self.counters.idle_workers.fetch_sub(1, Ordering::AcqRel);

            match next {
                Ok(job) => self.run_job(job),
                Err(RecvTimeoutError::Timeout) => {
                    debug!(worker_id = self.id, "Keep-alive elapsed, retiring idle worker");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!(worker_id = self.id, "Handoff channel closed, exiting");
                    break;
                }
            }
        }

        self.counters.live_workers.fetch_sub(1, Ordering::AcqRel);
        self.live.leave();
        debug!(worker_id = self.id, "Worker thread exiting");
    }

    fn run_job(&self, job: Job) {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_ok() {
            self.counters.completed_jobs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.panicked_jobs.fetch_add(1, Ordering::Relaxed);
            warn!(worker_id = self.id, "Job panicked; worker continues");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_execute_runs_job() {
        let pool = WorkerPool::new(&ExecutorConfig::new()).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);

        pool.execute(Box::new(move || tx.send(42).unwrap())).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        let stats = pool.stats();
        assert_eq!(stats.spawned_workers, 1);
        pool.shutdown();
        assert!(pool.await_exit(Some(Duration::from_secs(5))));
    }

    #[test]
    fn test_grows_when_all_workers_busy() {
        let pool = WorkerPool::new(&ExecutorConfig::new()).unwrap();
        let barrier = Arc::new(Barrier::new(4));

        // Three jobs that only finish together: requires three threads
        for _ in 0..3 {
            let barrier = Arc::clone(&barrier);
            pool.execute(Box::new(move || {
                barrier.wait();
            }))
            .unwrap();
        }
        barrier.wait();

        assert!(pool.stats().largest_pool_size >= 3);
        pool.shutdown();
        assert!(pool.await_exit(Some(Duration::from_secs(5))));
    }

    #[test]
    fn test_idle_worker_is_reused() {
        let pool = WorkerPool::new(&ExecutorConfig::new()).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        pool.execute(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        wait_for(|| pool.stats().idle_workers == 1);
        thread::sleep(Duration::from_millis(20));

        let counter = Arc::clone(&ran);
        pool.execute(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        wait_for(|| ran.load(Ordering::SeqCst) == 2);

        let stats = pool.stats();
        assert_eq!(stats.spawned_workers, 1);
        assert_eq!(stats.handoffs, 1);
        pool.shutdown();
    }

    #[test]
    fn test_idle_worker_retires_after_keep_alive() {
        let config = ExecutorConfig::new().with_keep_alive(Duration::from_millis(20));
        let pool = WorkerPool::new(&config).unwrap();

        pool.execute(Box::new(|| {})).unwrap();
        assert!(pool.await_exit(Some(Duration::from_secs(5))));
        assert_eq!(pool.stats().live_workers, 0);
    }

    #[test]
    fn test_panicking_job_is_isolated() {
        let pool = WorkerPool::new(&ExecutorConfig::new()).unwrap();
        pool.execute(Box::new(|| panic!("boom"))).unwrap();
        wait_for(|| pool.stats().panicked_jobs == 1);

        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.execute(Box::new(move || tx.send(()).unwrap())).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pool.shutdown();
    }

    #[test]
    fn test_shutdown_rejects_new_jobs() {
        let pool = WorkerPool::new(&ExecutorConfig::new()).unwrap();
        pool.shutdown();
        pool.shutdown();
        assert!(pool.is_shutdown());
        assert_eq!(pool.execute(Box::new(|| {})), Err(PoolError::PoolShutdown));
        assert!(pool.await_exit(None));
    }

    #[test]
    fn test_invalid_config() {
        let config = ExecutorConfig {
            keep_alive_ms: 0,
            ..ExecutorConfig::default()
        };
        assert!(matches!(WorkerPool::new(&config), Err(PoolError::InvalidConfig(_))));
    }
}
