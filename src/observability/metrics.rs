//! Prometheus metrics and a minimal healthz/metrics HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::State, response::IntoResponse, routing::get};
use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, IntGauge, Opts, Registry, TextEncoder,
};

/// Process-wide metric handles.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Operations processed, labeled by action (`create`/`update`/`delete`)
    /// and lexicon collection.
    pub ops_processed: CounterVec,
    /// Wall-clock timestamp (unix seconds) of the most recently hydrated
    /// record's `CreatedAt`.
    pub last_event_created_at: IntGauge,
    /// Per-commit processing duration, seconds.
    pub event_processing_duration: Histogram,
}

impl Metrics {
    /// Register a fresh set of metrics against a new registry.
    ///
    /// # Panics
    ///
    /// Panics if metric registration fails, which only happens on a
    /// duplicate metric name within the same registry — a programming
    /// error, not a runtime condition.
    #[must_use]
    pub fn new() -> Self {
        let registry = Registry::new();

        let ops_processed = CounterVec::new(
            Opts::new(
                "tidewatch_ops_processed_total",
                "Repository operations processed, by action and collection",
            ),
            &["action", "collection"],
        )
        .expect("static metric descriptor is well-formed");
        registry
            .register(Box::new(ops_processed.clone()))
            .expect("metric name is unique within this registry");

        let last_event_created_at = IntGauge::new(
            "tidewatch_last_event_created_at",
            "Unix timestamp of the most recently hydrated record's CreatedAt",
        )
        .expect("static metric descriptor is well-formed");
        registry
            .register(Box::new(last_event_created_at.clone()))
            .expect("metric name is unique within this registry");

        let event_processing_duration = Histogram::with_opts(HistogramOpts::new(
            "tidewatch_event_processing_duration_seconds",
            "Per-commit hydration processing duration",
        ))
        .expect("static metric descriptor is well-formed");
        registry
            .register(Box::new(event_processing_duration.clone()))
            .expect("metric name is unique within this registry");

        Self {
            registry,
            ops_processed,
            last_event_created_at,
            event_processing_duration,
        }
    }

    fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .expect("text encoding of gathered metrics cannot fail");
        String::from_utf8(buffer).expect("prometheus text format is always valid UTF-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    metrics.render()
}

/// Build the `/healthz` + `/metrics` router.
#[must_use]
pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

/// Serve the observability router until the socket fails to bind or the
/// process is torn down. Errors are non-fatal: a run should proceed even
/// if the metrics endpoint can't bind (e.g. the port is already taken).
pub async fn serve(metrics: Arc<Metrics>, addr: SocketAddr) {
    let app = router(metrics);
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::warn!(%err, "observability server exited");
            }
        }
        Err(err) => {
            tracing::warn!(%err, %addr, "failed to bind observability server");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metric_names() {
        let metrics = Metrics::new();
        metrics
            .ops_processed
            .with_label_values(&["create", "app.bsky.feed.post"])
            .inc();
        let rendered = metrics.render();
        assert!(rendered.contains("tidewatch_ops_processed_total"));
    }
}
