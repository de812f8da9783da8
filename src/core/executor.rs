//! Executor facade: submission, scheduling, aggregate operations and lifecycle.
//!
//! All submissions end up in the ready queue, even immediate ones; the
//! dispatcher is the only component that moves work onto worker threads.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::builders::ExecutorBuilder;
use crate::config::ExecutorConfig;
use crate::util::clock::TimeSource;

use super::dispatcher::{self, Lifecycle, Shared};
use super::error::{AppResult, ExecutorError};
use super::queue::QueueKey;
use super::task::{
    guarded, Action, Callable, Schedulable, ScheduledTask, TaskHandle, TaskKind, UnstartedTask,
};
use super::worker_pool::{PoolError, PoolStats, WorkerPool};

/// Point-in-time executor statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Tasks waiting in the ready queue.
    pub pending: usize,
    /// Tasks currently executing.
    pub running: usize,
    /// Successful runs (every run of a periodic task counts).
    pub completed: u64,
    /// Tasks that ended with an execution failure.
    pub failed: u64,
    /// Tasks that were cancelled.
    pub cancelled: u64,
    /// Worker pool statistics.
    pub pool: PoolStats,
}

/// Scheduled executor with an unbounded, elastic worker pool.
///
/// One dispatcher thread owns every timing decision; worker threads are created
/// on demand so slow or blocking tasks never delay timer delivery for others.
///
/// ```rust,ignore
/// use std::time::Duration;
/// use prometheus_scheduled_executor::ScheduledExecutor;
///
/// let executor = ScheduledExecutor::new()?;
/// let ticker = executor.schedule_at_fixed_rate(
///     || println!("tick"),
///     Duration::ZERO,
///     Duration::from_secs(1),
/// )?;
/// let answer = executor.submit_callable(|| Ok(42))?;
/// assert_eq!(answer.get()?, 42);
/// ticker.cancel(false);
/// executor.shutdown();
/// ```
pub struct ScheduledExecutor {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledExecutor {
    /// Create an executor with default configuration and the system clock.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Pool` if the dispatcher thread cannot be spawned.
    pub fn new() -> Result<Self, ExecutorError> {
        ExecutorBuilder::new().build()
    }

    /// Create an executor with default configuration and the given time source.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Pool` if the dispatcher thread cannot be spawned.
    pub fn with_time_source(clock: Arc<dyn TimeSource>) -> Result<Self, ExecutorError> {
        ExecutorBuilder::new().time_source(clock).build()
    }

    /// Create an executor from explicit parts. Prefer [`ExecutorBuilder`].
    ///
    /// # Errors
    ///
    /// - `ExecutorError::Pool(PoolError::InvalidConfig)` for an invalid configuration
    /// - `ExecutorError::Pool(PoolError::Spawn)` if the dispatcher thread cannot be spawned
    pub fn with_config(
        config: ExecutorConfig,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, ExecutorError> {
        let pool = WorkerPool::new(&config)?;
        let dispatcher_name = config.dispatcher_thread_name.clone();
        let shared = Arc::new(Shared::new(config, Arc::clone(&clock), pool));

        let weak = Arc::downgrade(&shared);
        clock.subscribe(Arc::new(move || {
            weak.upgrade().map(|shared| shared.signal()).is_some()
        }));

        let dispatcher_shared = Arc::clone(&shared);
        let dispatcher = thread::Builder::new()
            .name(dispatcher_name)
            .spawn(move || dispatcher::run(&dispatcher_shared))
            .map_err(|e| PoolError::Spawn(e.to_string()))?;

        info!(clock = ?clock, "ScheduledExecutor started");

        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    fn enqueue<T: Send + 'static>(
        &self,
        action: Action<T>,
        kind: TaskKind,
        delay: Duration,
    ) -> Result<TaskHandle<T>, ExecutorError> {
        let mut state = self.shared.state.lock();
        if state.lifecycle != Lifecycle::Running {
            return Err(ExecutorError::Rejected);
        }

        let id = self.shared.next_id();
        let first_run = self.shared.clock.now().saturating_add(delay);
        let task = Arc::new(ScheduledTask::new(id, kind, first_run, action, &self.shared));
        let entry: Arc<dyn Schedulable> = Arc::clone(&task) as Arc<dyn Schedulable>;

        if state.ready.insert(QueueKey::new(first_run, id), entry) {
            self.shared.wakeup.notify_all();
        }
        drop(state);

        debug!(task_id = id, kind = ?kind, delay_ms = delay.as_millis(), "Task queued");
        Ok(TaskHandle::new(task))
    }

    fn validate_period(period: Duration) -> Result<(), ExecutorError> {
        if period.is_zero() {
            return Err(ExecutorError::InvalidArgument("period must be greater than zero".into()));
        }
        Ok(())
    }

    /// Run an action as soon as possible, discarding its outcome.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Rejected` if the executor is shut down.
    pub fn execute<F>(&self, action: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(action).map(drop)
    }

    /// Run an action as soon as possible.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Rejected` if the executor is shut down.
    pub fn submit<F>(&self, action: F) -> Result<TaskHandle<()>, ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(action, Duration::ZERO)
    }

    /// Run an action as soon as possible; the handle yields `result` on success.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Rejected` if the executor is shut down.
    pub fn submit_with_result<F, T>(
        &self,
        action: F,
        result: T,
    ) -> Result<TaskHandle<T>, ExecutorError>
    where
        F: FnOnce() + Send + 'static,
        T: Send + 'static,
    {
        self.submit_callable(move || {
            action();
            Ok(result)
        })
    }

    /// Run a result-producing action as soon as possible.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Rejected` if the executor is shut down.
    pub fn submit_callable<F, T>(&self, action: F) -> Result<TaskHandle<T>, ExecutorError>
    where
        F: FnOnce() -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.schedule_callable(action, Duration::ZERO)
    }

    /// Run an action once after `delay`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Rejected` if the executor is shut down.
    pub fn schedule<F>(&self, action: F, delay: Duration) -> Result<TaskHandle<()>, ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_callable(
            move || {
                action();
                Ok(())
            },
            delay,
        )
    }

    /// Run a result-producing action once after `delay`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Rejected` if the executor is shut down.
    pub fn schedule_callable<F, T>(
        &self,
        action: F,
        delay: Duration,
    ) -> Result<TaskHandle<T>, ExecutorError>
    where
        F: FnOnce() -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(Action::Once(Box::new(action)), TaskKind::OneShot, delay)
    }

    /// Run an action first after `initial_delay`, then every `period` measured
    /// from each run's scheduled time.
    ///
    /// Runs never overlap. If a run starts late, the next anchor is used as-is, so the
    /// task is immediately eligible again. A failing or panicking run stops the task.
    ///
    /// # Errors
    ///
    /// - `ExecutorError::InvalidArgument` if `period` is zero
    /// - `ExecutorError::Rejected` if the executor is shut down
    pub fn schedule_at_fixed_rate<F>(
        &self,
        mut action: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle<()>, ExecutorError>
    where
        F: FnMut() + Send + 'static,
    {
        Self::validate_period(period)?;
        let repeat = Action::Repeat(Box::new(move || {
            action();
            Ok(())
        }));
        self.enqueue(repeat, TaskKind::FixedRate(period), initial_delay)
    }

    /// Run an action first after `initial_delay`, then `period` after each run completes.
    ///
    /// # Errors
    ///
    /// - `ExecutorError::InvalidArgument` if `period` is zero
    /// - `ExecutorError::Rejected` if the executor is shut down
    pub fn schedule_with_fixed_delay<F>(
        &self,
        mut action: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle<()>, ExecutorError>
    where
        F: FnMut() + Send + 'static,
    {
        Self::validate_period(period)?;
        let repeat = Action::Repeat(Box::new(move || {
            action();
            Ok(())
        }));
        self.enqueue(repeat, TaskKind::FixedDelay(period), initial_delay)
    }

    /// Submit every action, or none: a rejection part-way cancels what was queued.
    fn submit_batch<T: Send + 'static>(
        &self,
        actions: Vec<Callable<T>>,
    ) -> Result<Vec<TaskHandle<T>>, ExecutorError> {
        if self.is_shutdown() {
            return Err(ExecutorError::Rejected);
        }
        let mut handles = Vec::with_capacity(actions.len());
        for action in actions {
            match self.submit_callable(action) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    for handle in &handles {
                        handle.cancel(true);
                    }
                    return Err(err);
                }
            }
        }
        Ok(handles)
    }

    fn invoke_all_until<T: Send + 'static>(
        &self,
        actions: Vec<Callable<T>>,
        deadline: Option<Instant>,
    ) -> Result<Vec<TaskHandle<T>>, ExecutorError> {
        let handles = self.submit_batch(actions)?;
        for (idx, handle) in handles.iter().enumerate() {
            if !handle.wait(deadline) {
                debug!(remaining = handles.len() - idx, "invoke_all deadline passed, cancelling");
                for late in &handles[idx..] {
                    late.cancel(true);
                }
                break;
            }
        }
        Ok(handles)
    }

    /// Run every action and wait for all of them.
    ///
    /// Handles are returned in input order, each completed, failed or cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Rejected` if the executor is shut down.
    pub fn invoke_all<T: Send + 'static>(
        &self,
        actions: Vec<Callable<T>>,
    ) -> Result<Vec<TaskHandle<T>>, ExecutorError> {
        self.invoke_all_until(actions, None)
    }

    /// Like [`invoke_all`](Self::invoke_all), but cancels (with interrupt) whatever has
    /// not finished when `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Rejected` if the executor is shut down.
    pub fn invoke_all_timeout<T: Send + 'static>(
        &self,
        actions: Vec<Callable<T>>,
        timeout: Duration,
    ) -> Result<Vec<TaskHandle<T>>, ExecutorError> {
        self.invoke_all_until(actions, Instant::now().checked_add(timeout))
    }

    fn invoke_any_until<T: Send + 'static>(
        &self,
        actions: Vec<Callable<T>>,
        deadline: Option<Instant>,
    ) -> Result<T, ExecutorError> {
        if actions.is_empty() {
            return Err(ExecutorError::InvalidArgument(
                "invoke_any requires at least one action".into(),
            ));
        }

        // Each wrapper owns a sender; once every action has run or been dropped the
        // channel disconnects, which ends the wait below.
        let (tx, rx) = crossbeam_channel::unbounded::<AppResult<T>>();
        let wrapped: Vec<Callable<()>> = actions
            .into_iter()
            .map(|action| {
                let tx = tx.clone();
                Box::new(move || {
                    let _ = tx.send(guarded(action));
                    Ok(())
                }) as Callable<()>
            })
            .collect();
        drop(tx);

        let handles = self.submit_batch(wrapped)?;
        let mut last_failure = None;

        let outcome = loop {
            let received = match deadline {
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                Some(deadline) => rx.recv_deadline(deadline),
            };
            match received {
                Ok(Ok(value)) => break Ok(value),
                Ok(Err(err)) => last_failure = Some(err),
                Err(RecvTimeoutError::Timeout) => break Err(ExecutorError::Timeout),
                Err(RecvTimeoutError::Disconnected) => {
                    break Err(last_failure.take().map_or(ExecutorError::Cancelled, |err| {
                        ExecutorError::AllFailed(Arc::new(err))
                    }));
                }
            }
        };

        for handle in &handles {
            handle.cancel(true);
        }
        outcome
    }

    /// Run every action and return the first successful result; the rest are cancelled.
    ///
    /// # Errors
    ///
    /// - `ExecutorError::InvalidArgument` if `actions` is empty
    /// - `ExecutorError::Rejected` if the executor is shut down
    /// - `ExecutorError::AllFailed` if every action failed
    /// - `ExecutorError::Cancelled` if every action was cancelled without a failure
    pub fn invoke_any<T: Send + 'static>(
        &self,
        actions: Vec<Callable<T>>,
    ) -> Result<T, ExecutorError> {
        self.invoke_any_until(actions, None)
    }

    /// Like [`invoke_any`](Self::invoke_any) with an overall timeout.
    ///
    /// # Errors
    ///
    /// As [`invoke_any`](Self::invoke_any), plus `ExecutorError::Timeout` when no action
    /// succeeds in time; outstanding actions are cancelled first.
    pub fn invoke_any_timeout<T: Send + 'static>(
        &self,
        actions: Vec<Callable<T>>,
        timeout: Duration,
    ) -> Result<T, ExecutorError> {
        self.invoke_any_until(actions, Instant::now().checked_add(timeout))
    }

    /// Stop accepting work and let queued one-shot tasks drain.
    ///
    /// Pending periodic tasks are cancelled unless the executor was configured with
    /// `continue_periodic_after_shutdown`. Idempotent.
    pub fn shutdown(&self) {
        let dropped = {
            let mut state = self.shared.state.lock();
            if state.lifecycle != Lifecycle::Running {
                return;
            }
            state.lifecycle = Lifecycle::ShuttingDown;

            let mut dropped = Vec::new();
            if !self.shared.config.continue_periodic_after_shutdown {
                for task in state.ready.remove_where(|task| task.kind().is_periodic()) {
                    if let Some(action) = task.cancel_unstarted() {
                        self.shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                        dropped.push(action);
                    }
                }
            }
            self.shared.wakeup.notify_all();
            info!(
                pending = state.ready.len(),
                running = state.running.len(),
                cancelled_periodic = dropped.len(),
                "Executor shutting down"
            );
            dropped
        };
        drop(dropped);
    }

    /// Stop accepting work, cancel every pending task and interrupt running ones.
    ///
    /// Returns the tasks that never started. Order among tasks with equal run
    /// times is unspecified. A second call returns an empty list.
    pub fn shutdown_now(&self) -> Vec<UnstartedTask> {
        let (unstarted, dropped) = {
            let mut state = self.shared.state.lock();
            if state.lifecycle == Lifecycle::Running {
                state.lifecycle = Lifecycle::ShuttingDown;
            }
            state.stopped = true;

            let mut unstarted = Vec::new();
            let mut dropped = Vec::new();
            for task in state.ready.drain() {
                if let Some(action) = task.cancel_unstarted() {
                    self.shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                    unstarted.push(UnstartedTask::new(task.id(), task.kind()));
                    dropped.push(action);
                }
            }
            for task in state.running.values() {
                task.interrupt();
            }
            self.shared.wakeup.notify_all();
            info!(
                unstarted = unstarted.len(),
                interrupted = state.running.len(),
                "Executor shutting down now"
            );
            (unstarted, dropped)
        };
        drop(dropped);
        unstarted
    }

    /// Whether `shutdown` or `shutdown_now` has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.lifecycle() != Lifecycle::Running
    }

    /// Whether the executor has fully terminated.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.lifecycle() == Lifecycle::Terminated
    }

    /// Current lifecycle stage.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.state.lock().lifecycle
    }

    /// Block until terminated or until `timeout` elapses. Returns whether terminated.
    ///
    /// A timeout too large to express as a deadline (such as `Duration::MAX`) waits
    /// without one.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();
        while state.lifecycle != Lifecycle::Terminated {
            match deadline {
                None => self.shared.terminated.wait(&mut state),
                Some(deadline) => {
                    if self.shared.terminated.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        let terminated = state.lifecycle == Lifecycle::Terminated;
        drop(state);

        if terminated {
            if let Some(dispatcher) = self.dispatcher.lock().take() {
                let _ = dispatcher.join();
            }
        }
        terminated
    }

    /// Delay until the earliest pending task becomes eligible, if any is queued.
    #[must_use]
    pub fn next_delay(&self) -> Option<Duration> {
        let head = self.shared.state.lock().ready.peek_key()?;
        Some(head.at.saturating_sub(self.shared.clock.now()))
    }

    /// Snapshot of queue, outcome and pool statistics.
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        let (pending, running) = {
            let state = self.shared.state.lock();
            (state.ready.len(), state.running.len())
        };
        ExecutorStats {
            pending,
            running,
            completed: self.shared.counters.completed.load(Ordering::Relaxed),
            failed: self.shared.counters.failed.load(Ordering::Relaxed),
            cancelled: self.shared.counters.cancelled.load(Ordering::Relaxed),
            pool: self.shared.pool.stats(),
        }
    }

    /// Time source driving this executor.
    #[must_use]
    pub fn time_source(&self) -> &Arc<dyn TimeSource> {
        &self.shared.clock
    }
}

impl Drop for ScheduledExecutor {
    fn drop(&mut self) {
        // Graceful shutdown, but DON'T join: queued one-shot tasks still run
        if !self.is_shutdown() {
            debug!("ScheduledExecutor dropped without explicit shutdown");
            self.shutdown();
        }
    }
}
