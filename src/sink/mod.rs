//! Output sinks: append-only file and cloud column store.

/// BigQuery-backed column-store sink.
pub mod bigquery;
/// Append-only JSON-lines file sink.
pub mod file;
/// The exact expected column-store schema.
pub mod schema;

use async_trait::async_trait;

use crate::error::FatalError;
use crate::model::event::HydratedEvent;

/// Common contract for every output destination.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Prepare the destination (create file/table, verify schema).
    async fn setup(&self) -> Result<(), FatalError>;

    /// Probe the destination for a resume cursor. `Ok(None)` means "no
    /// cursor available" — a soft condition, not an error.
    async fn get_backfill_seqno(&self) -> Result<Option<i64>, FatalError>;

    /// Write one event. Implementations may buffer internally; callers
    /// are expected to call this from a single draining task per sink.
    async fn write(&self, event: &HydratedEvent) -> anyhow::Result<()>;

    /// Flush any buffered rows and release resources. Called once during
    /// orderly shutdown after the output channel has drained.
    async fn close(&self) -> anyhow::Result<()>;
}
