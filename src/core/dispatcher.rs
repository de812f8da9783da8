//! The dispatcher: the single thread that decides when tasks become runnable.
//!
//! It parks on the queue Condvar until the earliest task is due (or until an
//! insert, cancel, shutdown or clock jump signals it), moves every due task to
//! `Running`, and hands them to the worker pool outside the lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info};

use crate::config::ExecutorConfig;
use crate::util::clock::TimeSource;

use super::queue::ReadyQueue;
use super::task::{Schedulable, TaskId};
use super::worker_pool::WorkerPool;

/// Executor lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting new work.
    Running,
    /// Rejecting new work; draining what is queued or running.
    ShuttingDown,
    /// Nothing pending, nothing running, no live workers.
    Terminated,
}

/// Everything guarded by the queue lock.
pub(crate) struct QueueState {
    pub ready: ReadyQueue<Arc<dyn Schedulable>>,
    pub running: HashMap<TaskId, Arc<dyn Schedulable>>,
    pub lifecycle: Lifecycle,
    /// Set by `shutdown_now`; nothing reschedules afterwards.
    pub stopped: bool,
}

impl QueueState {
    fn new() -> Self {
        Self {
            ready: ReadyQueue::new(),
            running: HashMap::new(),
            lifecycle: Lifecycle::Running,
            stopped: false,
        }
    }

    /// Whether a periodic task that just finished may be queued again.
    pub(crate) fn accepts_periodic(&self, config: &ExecutorConfig) -> bool {
        match self.lifecycle {
            Lifecycle::Running => true,
            Lifecycle::ShuttingDown => config.continue_periodic_after_shutdown && !self.stopped,
            Lifecycle::Terminated => false,
        }
    }

    fn drained(&self) -> bool {
        self.lifecycle != Lifecycle::Running && self.ready.is_empty() && self.running.is_empty()
    }

    /// Pop every due task and mark it running.
    fn take_due(&mut self, now: std::time::Duration) -> Vec<Arc<dyn Schedulable>> {
        let mut due = Vec::new();
        while let Some(task) = self.ready.pop_due(now) {
            if task.begin_run() {
                self.running.insert(task.id(), Arc::clone(&task));
                due.push(task);
            }
        }
        due
    }
}

/// Outcome counters (lock-free atomics).
#[derive(Debug, Default)]
pub(crate) struct ExecutorCounters {
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
}

/// State shared by the facade, the dispatcher, worker jobs and task handles.
pub(crate) struct Shared {
    pub state: Mutex<QueueState>,
    /// Wakes the dispatcher.
    pub wakeup: Condvar,
    /// Wakes `await_termination` callers.
    pub terminated: Condvar,
    pub clock: Arc<dyn TimeSource>,
    pub pool: WorkerPool,
    pub config: ExecutorConfig,
    pub counters: ExecutorCounters,
    sequence: AtomicU64,
}

impl Shared {
    pub(crate) fn new(
        config: ExecutorConfig,
        clock: Arc<dyn TimeSource>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState::new()),
            wakeup: Condvar::new(),
            terminated: Condvar::new(),
            clock,
            pool,
            config,
            counters: ExecutorCounters::default(),
            sequence: AtomicU64::new(0),
        }
    }

    pub(crate) fn next_id(&self) -> TaskId {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Wake the dispatcher so it re-reads the clock and the queue head.
    pub(crate) fn signal(&self) {
        let _state = self.state.lock();
        self.wakeup.notify_all();
    }
}

/// Dispatcher thread body. Returns once the executor has terminated.
pub(crate) fn run(shared: &Arc<Shared>) {
    info!("Dispatcher started");
    let mut state = shared.state.lock();

    loop {
        if state.drained() {
            break;
        }

        let due = state.take_due(shared.clock.now());
        if !due.is_empty() {
            debug!(count = due.len(), "Dispatching due tasks");
            MutexGuard::unlocked(&mut state, || hand_off(shared, due));
            continue;
        }

        match state.ready.peek_key() {
            None => shared.wakeup.wait(&mut state),
            Some(head) => match shared.clock.park_timeout(head.at) {
                Some(timeout) => {
                    let _ = shared.wakeup.wait_for(&mut state, timeout);
                }
                None => shared.wakeup.wait(&mut state),
            },
        }
    }
    drop(state);

    shared.pool.shutdown();
    shared.pool.await_exit(None);

    shared.state.lock().lifecycle = Lifecycle::Terminated;
    shared.terminated.notify_all();
    info!("Dispatcher stopped, executor terminated");
}

fn hand_off(shared: &Arc<Shared>, due: Vec<Arc<dyn Schedulable>>) {
    for task in due {
        let job_task = Arc::clone(&task);
        let job_shared = Arc::clone(shared);
        if let Err(err) = shared
            .pool
            .execute(Box::new(move || job_task.execute(&job_shared)))
        {
            error!(task_id = task.id(), error = %err, "Failed to hand task to worker pool");
            task.abort(shared, anyhow!(err));
        }
    }
}
