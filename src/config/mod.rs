//! Configuration models for the executor and its worker pool.

pub mod executor;

pub use executor::{ExecutorConfig, ENV_PREFIX};
