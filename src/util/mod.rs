//! Shared utilities: time sources and telemetry.

pub mod clock;
pub mod telemetry;

pub use clock::*;
pub use telemetry::*;
