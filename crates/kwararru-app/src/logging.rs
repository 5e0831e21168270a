//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

const FALLBACK_LEVEL: &str = "info";

/// `RUST_LOG` when set, else `level`, else `info` if `level` does not parse.
fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL))
}

/// Install the global fmt subscriber at the configured `level`.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .try_init()
        .is_ok()
}
