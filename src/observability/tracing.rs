//! Tracing setup.
//!
//! Keyval only emits `tracing` events; installing a subscriber is left to
//! the host application. These helpers cover the common cases.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Initialize console tracing with the given service name.
///
/// This sets up:
/// - Console logging as text lines or JSON objects, per `format`
/// - Environment-based filter (via RUST_LOG)
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(service_name: &str, format: LogFormat) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,keyval=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt_layer).try_init()?,
        LogFormat::Json => registry.with(fmt_layer.json()).try_init()?,
    }

    tracing::info!(service = service_name, ?format, "Tracing initialized");
    Ok(())
}

/// Initialize tracing for tests (only logs errors).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}
