//! Logging, correlation, and metrics.

/// Correlation id carried through a single run for structured logging.
pub mod correlation;
/// Prometheus metrics and a tiny healthz/metrics HTTP surface.
pub mod metrics;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize console logging.
///
/// An `EnvFilter` seeded from `RUST_LOG` (default `tidewatch=info`),
/// written to stderr so stdout stays free for any piped output.
pub fn init_logging() {
    let env_filter =
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "tidewatch=info".into()));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .init();
}
