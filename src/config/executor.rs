//! Executor and worker pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable prefix read by [`ExecutorConfig::from_env`].
pub const ENV_PREFIX: &str = "SCHEDULER_";

/// Configuration for a [`ScheduledExecutor`](crate::core::ScheduledExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How long an idle worker waits for a new task before retiring (milliseconds).
    pub keep_alive_ms: u64,
    /// Maximum number of workers allowed to sit idle at once.
    pub max_idle_workers: usize,
    /// Name prefix for worker threads; a sequence number is appended.
    pub thread_name_prefix: String,
    /// Name of the dispatcher thread.
    pub dispatcher_thread_name: String,
    /// Optional stack size for worker threads, in bytes.
    pub thread_stack_size: Option<usize>,
    /// Keep periodic tasks running after a graceful shutdown.
    pub continue_periodic_after_shutdown: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            keep_alive_ms: 60_000,
            max_idle_workers: 256,
            thread_name_prefix: "scheduled-worker".into(),
            dispatcher_thread_name: "scheduled-dispatcher".into(),
            thread_stack_size: None,
            continue_periodic_after_shutdown: false,
        }
    }
}

impl ExecutorConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle worker keep-alive.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_ms = u64::try_from(keep_alive.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the idle worker cap.
    #[must_use]
    pub const fn with_max_idle_workers(mut self, max_idle_workers: usize) -> Self {
        self.max_idle_workers = max_idle_workers;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Keep (or stop) periodic tasks after a graceful shutdown.
    #[must_use]
    pub const fn with_continue_periodic_after_shutdown(mut self, keep: bool) -> Self {
        self.continue_periodic_after_shutdown = keep;
        self
    }

    /// Idle worker keep-alive as a `Duration`.
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.keep_alive_ms == 0 {
            return Err("keep_alive_ms must be greater than 0".into());
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.dispatcher_thread_name.trim().is_empty() {
            return Err("dispatcher_thread_name must not be empty".into());
        }
        if self.thread_stack_size == Some(0) {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `SCHEDULER_*` environment variables.
    ///
    /// A `.env` file is loaded first if present. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error message for unparsable values or an invalid result.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (used by [`from_env`](Self::from_env)).
    ///
    /// # Errors
    ///
    /// Returns an error message for unparsable values or an invalid result.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut cfg = Self::default();

        if let Some(v) = var("KEEP_ALIVE_MS") {
            cfg.keep_alive_ms = parse_field("KEEP_ALIVE_MS", &v)?;
        }
        if let Some(v) = var("MAX_IDLE_WORKERS") {
            cfg.max_idle_workers = parse_field("MAX_IDLE_WORKERS", &v)?;
        }
        if let Some(v) = var("THREAD_NAME_PREFIX") {
            cfg.thread_name_prefix = v;
        }
        if let Some(v) = var("DISPATCHER_THREAD_NAME") {
            cfg.dispatcher_thread_name = v;
        }
        if let Some(v) = var("THREAD_STACK_SIZE") {
            cfg.thread_stack_size = Some(parse_field("THREAD_STACK_SIZE", &v)?);
        }
        if let Some(v) = var("CONTINUE_PERIODIC_AFTER_SHUTDOWN") {
            cfg.continue_periodic_after_shutdown =
                parse_field("CONTINUE_PERIODIC_AFTER_SHUTDOWN", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_field<T>(name: &str, raw: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| format!("{ENV_PREFIX}{name} invalid: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("SCHEDULER_KEEP_ALIVE_MS", "250"),
            ("SCHEDULER_MAX_IDLE_WORKERS", "4"),
            ("SCHEDULER_CONTINUE_PERIODIC_AFTER_SHUTDOWN", "true"),
        ]
        .into_iter()
        .collect();

        let cfg = ExecutorConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(cfg.keep_alive(), Duration::from_millis(250));
        assert_eq!(cfg.max_idle_workers, 4);
        assert!(cfg.continue_periodic_after_shutdown);
        assert_eq!(cfg.thread_name_prefix, "scheduled-worker");
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err = ExecutorConfig::from_lookup(|k| {
            (k == "SCHEDULER_KEEP_ALIVE_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(err.contains("SCHEDULER_KEEP_ALIVE_MS"));
    }
}
