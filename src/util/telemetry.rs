//! Telemetry helpers for structured logging and tracing.

/// Initialize tracing for the executor's dispatcher and worker logs.
///
/// Installs a `tracing-subscriber` fmt subscriber driven by `RUST_LOG` unless the
/// host application already installed one.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
