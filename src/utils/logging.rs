// ============================================================================
// Logging Setup
// Installs a fmt subscriber for the `tracing` output of the exchange
// ============================================================================

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Default filter when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "exchange_engine=info";

/// Install a global subscriber honoring `RUST_LOG`.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging() -> Result<(), String> {
    init_logging_with(DEFAULT_FILTER)
}

/// Same as [`init_logging`] with an explicit fallback filter directive.
pub fn init_logging_with(fallback: &str) -> Result<(), String> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| format!("failed to install subscriber: {}", e))
}
