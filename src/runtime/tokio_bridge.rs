//! Tokio bridge: await task results and executor termination from async code.
//!
//! Blocking waits are moved onto tokio's blocking pool so they never stall a
//! runtime worker thread.

use std::time::Duration;

use tracing::warn;

use crate::core::{ExecutorError, ScheduledExecutor, TaskHandle};

impl<T: Clone + Send + 'static> TaskHandle<T> {
    /// Async counterpart of [`get_timeout`](Self::get_timeout).
    ///
    /// # Errors
    ///
    /// - `ExecutorError::Execution` if the action failed
    /// - `ExecutorError::Cancelled` if the task was cancelled
    /// - `ExecutorError::Timeout` if the task is not done within `timeout`
    pub async fn get_async(&self, timeout: Duration) -> Result<T, ExecutorError> {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || handle.get_timeout(timeout))
            .await
            .unwrap_or_else(|join_err| {
                warn!(error = %join_err, "Blocking wait for task result did not complete");
                Err(ExecutorError::Execution(std::sync::Arc::new(anyhow::anyhow!(
                    "blocking wait failed: {join_err}"
                ))))
            })
    }
}

impl ScheduledExecutor {
    /// Async counterpart of [`await_termination`](Self::await_termination).
    ///
    /// Polls the lifecycle with `tokio::time::sleep` between checks, so the executor
    /// can be borrowed across the await.
    pub async fn await_termination_async(&self, timeout: Duration) -> bool {
        const POLL: Duration = Duration::from_millis(10);

        // `None` when the timeout overflows the clock: poll until terminated
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        loop {
            let now = tokio::time::Instant::now();
            if self.is_terminated() || deadline.is_some_and(|deadline| now >= deadline) {
                return self.await_termination(Duration::ZERO);
            }
            let pause = deadline.map_or(POLL, |deadline| POLL.min(deadline - now));
            tokio::time::sleep(pause).await;
        }
    }
}
