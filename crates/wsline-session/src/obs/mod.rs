//! Observability: tracing setup and in-process metrics.
//!
//! Metrics are stored as atomics and rendered on demand in Prometheus text
//! format; exposing them over HTTP is left to the host.

pub mod metrics;

pub use metrics::EngineMetrics;

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`. Returns false if a subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt().with_env_filter(filter).try_init().is_ok()
}
