//! Tracing setup
//!
//! Library code only emits `tracing` events; binaries and tests call
//! [`init_tracing`] once to print them.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset: statement logs are emitted at
/// `info`, so `log: true` environments get `info` and others `warn`.
pub fn default_filter(log_sql: bool) -> &'static str {
    if log_sql {
        "info"
    } else {
        "warn"
    }
}

/// Installs a `fmt` subscriber filtered by `RUST_LOG` or `default_level`.
///
/// Returns false when a global subscriber was already installed.
pub fn init_tracing(default_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .try_init()
        .is_ok()
}
