//! Scheduled tasks, their caller-facing handles, and cooperative interruption.
//!
//! A task is a single tagged variant: its [`TaskKind`] decides how it reschedules,
//! and its phase (`Pending → Running → Pending | Completed | Failed`, with
//! `Cancelled` reachable from any non-terminal phase) lives behind one mutex
//! paired with a Condvar that result waiters block on.
//!
//! Lock order: queue state → task slot → task action.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::util::clock::TimeSource;

use super::dispatcher::Shared;
use super::error::{AppResult, ExecutorError};
use super::queue::QueueKey;

/// Sequence number assigned at creation; also the tie-break for equal run times.
pub type TaskId = u64;

/// Boxed result-producing action, as accepted by `invoke_all` / `invoke_any`.
pub type Callable<T> = Box<dyn FnOnce() -> AppResult<T> + Send + 'static>;

/// How a task is (re)scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Runs once.
    OneShot,
    /// Next run = previous scheduled time + period.
    FixedRate(Duration),
    /// Next run = completion time + period.
    FixedDelay(Duration),
}

impl TaskKind {
    /// True for fixed-rate and fixed-delay tasks.
    #[must_use]
    pub const fn is_periodic(self) -> bool {
        !matches!(self, Self::OneShot)
    }

    /// Period of a periodic task.
    #[must_use]
    pub const fn period(self) -> Option<Duration> {
        match self {
            Self::OneShot => None,
            Self::FixedRate(period) | Self::FixedDelay(period) => Some(period),
        }
    }

    /// Next eligibility time after a successful run.
    pub(crate) fn next_run(self, scheduled: Duration, completed: Duration) -> Option<Duration> {
        match self {
            Self::OneShot => None,
            Self::FixedRate(period) => Some(scheduled.saturating_add(period)),
            Self::FixedDelay(period) => Some(completed.saturating_add(period)),
        }
    }
}

/// Observable task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting in the ready queue.
    Pending,
    /// Executing on a worker thread.
    Running,
    /// One-shot task finished with a value.
    Completed,
    /// The action failed; the task will not run again.
    Failed,
    /// Cancelled; the task will not run again.
    Cancelled,
}

impl TaskState {
    /// Completed, failed or cancelled.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Cooperative stop signal shared between a task and the thread running it.
#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    flag: Arc<AtomicBool>,
}

impl InterruptToken {
    /// Whether an interrupt has been requested.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

thread_local! {
    static CURRENT_INTERRUPT: RefCell<Option<InterruptToken>> = const { RefCell::new(None) };
}

/// Whether the task running on this thread has been asked to stop.
///
/// Always `false` outside of a task body.
#[must_use]
pub fn is_interrupted() -> bool {
    CURRENT_INTERRUPT.with(|current| {
        current
            .borrow()
            .as_ref()
            .is_some_and(InterruptToken::is_interrupted)
    })
}

/// Interrupt token of the task running on this thread, for handing to helpers.
#[must_use]
pub fn current_interrupt() -> Option<InterruptToken> {
    CURRENT_INTERRUPT.with(|current| current.borrow().clone())
}

/// Installs a token for the duration of an action and restores the previous one.
struct InterruptScope {
    previous: Option<InterruptToken>,
}

impl InterruptScope {
    fn enter(token: InterruptToken) -> Self {
        let previous = CURRENT_INTERRUPT.with(|current| current.replace(Some(token)));
        Self { previous }
    }
}

impl Drop for InterruptScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_INTERRUPT.with(|current| *current.borrow_mut() = previous);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run an action, converting a panic into an execution failure.
pub(crate) fn guarded<T>(action: impl FnOnce() -> AppResult<T>) -> AppResult<T> {
    panic::catch_unwind(AssertUnwindSafe(action)).unwrap_or_else(|payload| {
        Err(anyhow!("task panicked: {}", panic_message(payload.as_ref())))
    })
}

/// The work a task performs.
pub(crate) enum Action<T> {
    Once(Box<dyn FnOnce() -> AppResult<T> + Send>),
    Repeat(Box<dyn FnMut() -> AppResult<T> + Send>),
}

enum Phase<T> {
    Pending,
    Running,
    Completed(T),
    Failed(Arc<anyhow::Error>),
    Cancelled,
}

impl<T> Phase<T> {
    const fn state(&self) -> TaskState {
        match self {
            Self::Pending => TaskState::Pending,
            Self::Running => TaskState::Running,
            Self::Completed(_) => TaskState::Completed,
            Self::Failed(_) => TaskState::Failed,
            Self::Cancelled => TaskState::Cancelled,
        }
    }

    const fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    fn outcome(&self) -> Result<T, ExecutorError>
    where
        T: Clone,
    {
        match self {
            Self::Completed(value) => Ok(value.clone()),
            Self::Failed(err) => Err(ExecutorError::Execution(Arc::clone(err))),
            Self::Cancelled => Err(ExecutorError::Cancelled),
            Self::Pending | Self::Running => Err(ExecutorError::Timeout),
        }
    }
}

struct Slot<T> {
    phase: Phase<T>,
    next_run: Duration,
    runs: u64,
    /// Value of the most recent successful run of a periodic task.
    latest: Option<T>,
}

impl<T> Slot<T> {
    /// Terminal, or a periodic task with at least one finished run.
    const fn settled(&self) -> bool {
        self.phase.is_terminal() || self.latest.is_some()
    }

    fn outcome(&self) -> Result<T, ExecutorError>
    where
        T: Clone,
    {
        match (&self.phase, &self.latest) {
            (Phase::Pending | Phase::Running, Some(value)) => Ok(value.clone()),
            (phase, _) => phase.outcome(),
        }
    }
}

/// Type-erased view of a task used by the ready queue, dispatcher and shutdown.
pub(crate) trait Schedulable: Send + Sync {
    fn id(&self) -> TaskId;

    fn kind(&self) -> TaskKind;

    /// `Pending → Running`. Called by the dispatcher with the queue lock held.
    fn begin_run(&self) -> bool;

    /// Run the action on the current (worker) thread and settle the outcome.
    fn execute(self: Arc<Self>, shared: &Shared);

    /// Cancel a task the executor already removed from the ready queue.
    ///
    /// Called with the queue lock held; returns the dropped action so the caller
    /// can release it after unlocking, or `None` if the task was not pending.
    fn cancel_unstarted(&self) -> Option<Box<dyn Send>>;

    fn interrupt(&self);

    /// Fail a running task that could not be handed to a worker.
    fn abort(&self, shared: &Shared, err: anyhow::Error);
}

pub(crate) struct ScheduledTask<T> {
    id: TaskId,
    kind: TaskKind,
    slot: Mutex<Slot<T>>,
    done: Condvar,
    action: Mutex<Option<Action<T>>>,
    interrupt: InterruptToken,
    clock: Arc<dyn TimeSource>,
    shared: Weak<Shared>,
}

impl<T: Send + 'static> ScheduledTask<T> {
    pub(crate) fn new(
        id: TaskId,
        kind: TaskKind,
        first_run: Duration,
        action: Action<T>,
        shared: &Arc<Shared>,
    ) -> Self {
        Self {
            id,
            kind,
            slot: Mutex::new(Slot {
                phase: Phase::Pending,
                next_run: first_run,
                runs: 0,
                latest: None,
            }),
            done: Condvar::new(),
            action: Mutex::new(Some(action)),
            interrupt: InterruptToken::default(),
            clock: Arc::clone(&shared.clock),
            shared: Arc::downgrade(shared),
        }
    }

    fn cancel(&self, may_interrupt: bool) -> bool {
        let shared = self.shared.upgrade();
        let mut state = shared.as_ref().map(|s| s.state.lock());
        let mut slot = self.slot.lock();

        let dropped = match slot.phase {
            Phase::Pending => {
                if let Some(state) = state.as_mut() {
                    state.ready.remove(&QueueKey::new(slot.next_run, self.id));
                }
                self.action.lock().take()
            }
            Phase::Running => {
                if may_interrupt {
                    self.interrupt.interrupt();
                }
                None
            }
            Phase::Completed(_) | Phase::Failed(_) | Phase::Cancelled => return false,
        };

        slot.phase = Phase::Cancelled;
        self.done.notify_all();
        drop(slot);
        drop(state);

        if let Some(shared) = shared {
            shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            shared.wakeup.notify_all();
        }
        debug!(task_id = self.id, may_interrupt, "Task cancelled");
        drop(dropped);
        true
    }

    /// Block until settled or until `deadline`. Returns whether the task is settled.
    fn wait(&self, deadline: Option<Instant>) -> bool {
        let mut slot = self.slot.lock();
        while !slot.settled() {
            match deadline {
                None => self.done.wait(&mut slot),
                Some(deadline) => {
                    if self.done.wait_until(&mut slot, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        slot.settled()
    }
}

impl<T: Send + 'static> Schedulable for ScheduledTask<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn begin_run(&self) -> bool {
        let mut slot = self.slot.lock();
        if matches!(slot.phase, Phase::Pending) {
            slot.phase = Phase::Running;
            true
        } else {
            false
        }
    }

    fn execute(self: Arc<Self>, shared: &Shared) {
        let action = self.action.lock().take();
        let Some(action) = action else {
            warn!(task_id = self.id, "Dispatched task has no action");
            shared.state.lock().running.remove(&self.id);
            shared.wakeup.notify_all();
            return;
        };

        let (outcome, mut leftover) = {
            let _scope = InterruptScope::enter(self.interrupt.clone());
            match action {
                Action::Once(run) => (guarded(run), None),
                Action::Repeat(mut run) => {
                    let outcome = guarded(&mut run);
                    (outcome, Some(Action::Repeat(run)))
                }
            }
        };
        let finished_at = self.clock.now();

        let mut state = shared.state.lock();
        state.running.remove(&self.id);
        let mut slot = self.slot.lock();
        slot.runs += 1;

        if matches!(slot.phase, Phase::Running) {
            match outcome {
                Ok(value) => {
                    shared.counters.completed.fetch_add(1, Ordering::Relaxed);
                    match self.kind.next_run(slot.next_run, finished_at) {
                        None => slot.phase = Phase::Completed(value),
                        Some(next_run) if state.accepts_periodic(&shared.config) => {
                            slot.next_run = next_run;
                            slot.phase = Phase::Pending;
                            slot.latest = Some(value);
                            *self.action.lock() = leftover.take();
                            let key = QueueKey::new(next_run, self.id);
                            let entry = Arc::clone(&self) as Arc<dyn Schedulable>;
                            state.ready.insert(key, entry);
                            self.done.notify_all();
                        }
                        Some(_) => {
                            shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                            slot.phase = Phase::Cancelled;
                            debug!(task_id = self.id, "Periodic task stopped by shutdown");
                        }
                    }
                }
                Err(err) => {
                    shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(task_id = self.id, error = %err, "Task failed");
                    slot.phase = Phase::Failed(Arc::new(err));
                }
            }
        }

        if slot.phase.is_terminal() {
            self.done.notify_all();
        }
        drop(slot);
        drop(state);
        shared.wakeup.notify_all();
        drop(leftover);
    }

    fn cancel_unstarted(&self) -> Option<Box<dyn Send>> {
        let mut slot = self.slot.lock();
        if !matches!(slot.phase, Phase::Pending) {
            return None;
        }
        slot.phase = Phase::Cancelled;
        self.done.notify_all();
        let action = self.action.lock().take();
        Some(Box::new(action))
    }

    fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    fn abort(&self, shared: &Shared, err: anyhow::Error) {
        let mut state = shared.state.lock();
        state.running.remove(&self.id);
        let mut slot = self.slot.lock();
        if matches!(slot.phase, Phase::Running) {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            slot.phase = Phase::Failed(Arc::new(err));
            self.done.notify_all();
        }
        let dropped = self.action.lock().take();
        drop(slot);
        drop(state);
        shared.wakeup.notify_all();
        drop(dropped);
    }
}

/// Caller-side handle to a scheduled task.
///
/// Handles are cheap to clone; every clone observes the same task.
pub struct TaskHandle<T> {
    task: Arc<ScheduledTask<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
        }
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    pub(crate) const fn new(task: Arc<ScheduledTask<T>>) -> Self {
        Self { task }
    }

    /// Sequence number of the task.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.task.id
    }

    /// Scheduling kind, fixed at creation.
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        self.task.kind
    }

    /// True only for fixed-rate and fixed-delay tasks.
    #[must_use]
    pub fn is_periodic(&self) -> bool {
        self.task.kind.is_periodic()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.task.slot.lock().phase.state()
    }

    /// Whether the task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// Whether the task reached a terminal state.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Number of times the action has finished running.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.task.slot.lock().runs
    }

    /// Remaining time until the task is next eligible, saturating at zero.
    #[must_use]
    pub fn delay(&self) -> Duration {
        let next_run = self.task.slot.lock().next_run;
        next_run.saturating_sub(self.task.clock.now())
    }

    /// Request cancellation.
    ///
    /// A pending task is removed from the ready queue and never runs. A running task
    /// is flagged as cancelled and, if `may_interrupt` is set, its interrupt token is
    /// raised. Returns `false` if the task had already finished or been cancelled.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.task.cancel(may_interrupt)
    }

    /// Block until the task is terminal or the deadline passes.
    pub(crate) fn wait(&self, deadline: Option<Instant>) -> bool {
        self.task.wait(deadline)
    }

    /// Block until the task is done and return its outcome.
    ///
    /// A periodic task waits for its first run at most: once a run has finished,
    /// this returns the latest successful value until the task fails or is cancelled.
    ///
    /// # Errors
    ///
    /// - `ExecutorError::Execution` if the action failed
    /// - `ExecutorError::Cancelled` if the task was cancelled
    pub fn get(&self) -> Result<T, ExecutorError>
    where
        T: Clone,
    {
        self.task.wait(None);
        self.task.slot.lock().outcome()
    }

    /// Like [`get`](Self::get) but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get), plus `ExecutorError::Timeout` if the task has not
    /// settled when the timeout elapses.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, ExecutorError>
    where
        T: Clone,
    {
        // An unrepresentable deadline means no deadline
        self.task.wait(Instant::now().checked_add(timeout));
        self.task.slot.lock().outcome()
    }
}

impl<T: Send + 'static> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish()
    }
}

/// A task `shutdown_now` removed from the ready queue before it ever ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnstartedTask {
    id: TaskId,
    kind: TaskKind,
}

impl UnstartedTask {
    pub(crate) const fn new(id: TaskId, kind: TaskKind) -> Self {
        Self { id, kind }
    }

    /// Sequence number of the task; matches [`TaskHandle::id`].
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Scheduling kind of the task.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        self.kind
    }
}
