//! Async runtime adapters.

pub mod tokio_bridge;
