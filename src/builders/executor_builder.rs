//! Builder to construct a [`ScheduledExecutor`] from configuration and a time source.

use std::sync::Arc;

use crate::config::ExecutorConfig;
use crate::core::{ExecutorError, PoolError, ScheduledExecutor};
use crate::util::clock::{SystemTimeSource, TimeSource};

/// Assembles an executor. Defaults to [`ExecutorConfig::default`] and the system clock.
#[derive(Debug, Default)]
pub struct ExecutorBuilder {
    config: ExecutorConfig,
    time_source: Option<Arc<dyn TimeSource>>,
}

impl ExecutorBuilder {
    /// Start from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Pool(PoolError::InvalidConfig)` if the document does not
    /// parse or fails validation.
    pub fn from_config_json(input: &str) -> Result<Self, ExecutorError> {
        let config = ExecutorConfig::from_json_str(input).map_err(PoolError::InvalidConfig)?;
        Ok(Self::new().config(config))
    }

    /// Start from `SCHEDULER_*` environment variables (and `.env`, if present).
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Pool(PoolError::InvalidConfig)` for unparsable values.
    pub fn from_env() -> Result<Self, ExecutorError> {
        let config = ExecutorConfig::from_env().map_err(PoolError::InvalidConfig)?;
        Ok(Self::new().config(config))
    }

    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a specific time source, e.g. a shared
    /// [`VirtualTimeSource`](crate::util::clock::VirtualTimeSource).
    #[must_use]
    pub fn time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// Validate the configuration and start the executor.
    ///
    /// # Errors
    ///
    /// - `ExecutorError::Pool(PoolError::InvalidConfig)` for an invalid configuration
    /// - `ExecutorError::Pool(PoolError::Spawn)` if the dispatcher thread cannot be spawned
    pub fn build(self) -> Result<ScheduledExecutor, ExecutorError> {
        let time_source = self
            .time_source
            .unwrap_or_else(|| Arc::new(SystemTimeSource::new()));
        ScheduledExecutor::with_config(self.config, time_source)
    }
}
