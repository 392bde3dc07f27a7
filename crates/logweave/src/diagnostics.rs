//! Diagnostics output of the pipeline itself
//!
//! Internal events (enricher faults, sink failures, dropped events) are
//! emitted through `tracing` with target `logweave`. These helpers install
//! a fmt subscriber filtered by `RUST_LOG`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,logweave=warn";

/// Error returned when a global subscriber is already installed
pub type InitError = tracing_subscriber::util::TryInitError;

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the subscriber, failing if one is already set
pub fn try_init() -> Result<(), InitError> {
    try_init_with(DEFAULT_FILTER)
}

/// Like [`try_init`] with a custom fallback filter
pub fn try_init_with(default_filter: &str) -> Result<(), InitError> {
    tracing_subscriber::registry()
        .with(filter(default_filter))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

/// Install the subscriber; does nothing when one is already set
pub fn init() {
    let _ = try_init();
}
