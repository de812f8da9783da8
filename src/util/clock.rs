//! Time sources consumed by the dispatcher.
//!
//! The dispatcher never reads the wall clock directly. It asks a [`TimeSource`]
//! for "now" and for how long it may park before re-checking the ready queue.
//! [`SystemTimeSource`] is backed by `std::time::Instant`; [`VirtualTimeSource`]
//! is advanced by hand so scheduling tests are deterministic.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Callback fired by a time source when its notion of "now" jumps.
///
/// Returns `false` once its target is gone; the source then drops it.
pub type Waker = Arc<dyn Fn() -> bool + Send + Sync>;

/// Monotonic clock plus the parking policy the dispatcher should use.
///
/// Instants are expressed as a `Duration` measured from the source's own origin.
pub trait TimeSource: Send + Sync + fmt::Debug {
    /// Current monotonic instant.
    fn now(&self) -> Duration;

    /// How long the dispatcher may block before re-checking a task due at `deadline`.
    ///
    /// `None` means "block until signaled".
    fn park_timeout(&self, deadline: Duration) -> Option<Duration>;

    /// Register a callback to be fired whenever time moves outside of real elapsed time.
    fn subscribe(&self, _waker: Waker) {}
}

/// Real monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    /// Create a clock whose origin is the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn park_timeout(&self, deadline: Duration) -> Option<Duration> {
        Some(deadline.saturating_sub(self.now()))
    }
}

struct VirtualState {
    now: Duration,
    wakers: Vec<Waker>,
}

/// Manually advanced clock for deterministic tests.
///
/// The dispatcher parks indefinitely against a virtual clock and is woken by
/// [`advance`](Self::advance) / [`set`](Self::set).
///
/// ```rust,ignore
/// let clock = Arc::new(VirtualTimeSource::new());
/// let executor = ScheduledExecutor::with_time_source(clock.clone())?;
/// let handle = executor.schedule(|| {}, Duration::from_millis(100))?;
/// clock.advance(Duration::from_millis(100));
/// handle.get()?;
/// ```
pub struct VirtualTimeSource {
    state: Mutex<VirtualState>,
}

impl VirtualTimeSource {
    /// Create a virtual clock starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VirtualState {
                now: Duration::ZERO,
                wakers: Vec::new(),
            }),
        }
    }

    /// Move time forward by `by` and signal subscribers.
    pub fn advance(&self, by: Duration) {
        let wakers = {
            let mut state = self.state.lock();
            state.now = state.now.saturating_add(by);
            state.wakers.clone()
        };
        self.fire(&wakers);
    }

    /// Jump to an absolute instant. Time never moves backwards; earlier values are ignored.
    pub fn set(&self, now: Duration) {
        let wakers = {
            let mut state = self.state.lock();
            if now <= state.now {
                return;
            }
            state.now = now;
            state.wakers.clone()
        };
        self.fire(&wakers);
    }

    /// Call each waker outside the lock, then forget the ones that reported a dead target.
    fn fire(&self, wakers: &[Waker]) {
        let mut dead = Vec::new();
        for waker in wakers {
            if !waker() {
                dead.push(waker);
            }
        }
        if dead.is_empty() {
            return;
        }
        self.state
            .lock()
            .wakers
            .retain(|waker| !dead.iter().any(|gone| Arc::ptr_eq(waker, gone)));
    }
}

impl Default for VirtualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VirtualTimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("VirtualTimeSource")
            .field("now", &state.now)
            .field("subscribers", &state.wakers.len())
            .finish()
    }
}

impl TimeSource for VirtualTimeSource {
    fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn park_timeout(&self, _deadline: Duration) -> Option<Duration> {
        None
    }

    fn subscribe(&self, waker: Waker) {
        self.state.lock().wakers.push(waker);
    }
}
