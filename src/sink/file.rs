//! Append-only JSON-lines file sink with tail-based resume.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::FatalError;
use crate::model::event::HydratedEvent;
use crate::sink::Sink;
use crate::utils::get_last_line;

/// Append-mode JSON-lines sink. A single writer task serializes access
/// via an internal mutex, so concurrent calls to [`Sink::write`] never
/// interleave partial lines.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    stringify_full: bool,
    writer: Mutex<Option<tokio::fs::File>>,
}

impl FileSink {
    /// Build a sink writing to `path`. `stringify_full` forces `Full` to
    /// be JSON-encoded as a string even in file output, matching the
    /// column-store sink's unconditional behavior when enabled.
    #[must_use]
    pub fn new(path: PathBuf, stringify_full: bool) -> Arc<Self> {
        Arc::new(Self {
            path,
            stringify_full,
            writer: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn setup(&self) -> Result<(), FatalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| FatalError::UnreadableInput {
                path: self.path.clone(),
                source,
            })?;
        *self.writer.lock().await = Some(file);
        Ok(())
    }

    async fn get_backfill_seqno(&self) -> Result<Option<i64>, FatalError> {
        let Some(last_line) = get_last_line(&self.path).await.unwrap_or(None) else {
            return Ok(None);
        };

        let Ok(parsed) = serde_json::from_str::<Value>(&last_line) else {
            tracing::warn!("resume line is not valid JSON; continuing without backfill");
            return Ok(None);
        };

        Ok(parse_resume_seq(&parsed))
    }

    async fn write(&self, event: &HydratedEvent) -> anyhow::Result<()> {
        let mut value = serde_json::to_value(event)?;
        if self.stringify_full {
            if let Some(full) = value.get_mut("Full") {
                let as_string = serde_json::to_string(full)?;
                *full = Value::String(as_string);
            }
        }
        let mut line = serde_json::to_vec(&value)?;
        line.push(b'\n');

        let mut guard = self.writer.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("file sink written to before setup()"))?;
        file.write_all(&line).await?;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        let mut guard = self.writer.lock().await;
        if let Some(file) = guard.as_mut() {
            file.flush().await?;
        }
        *guard = None;
        Ok(())
    }
}

/// Extract the resume sequence number from a decoded JSON-line. Accepts
/// either the canonical `Seq` field or the legacy `_Seq` spelling on
/// read; only the canonical name is ever written.
#[must_use]
pub fn parse_resume_seq(value: &Value) -> Option<i64> {
    value
        .get("Seq")
        .or_else(|| value.get("_Seq"))
        .and_then(serde_json::Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_canonical_seq_field() {
        let value = json!({"Seq": 42, "_Seq": 7});
        assert_eq!(parse_resume_seq(&value), Some(42));
    }

    #[test]
    fn falls_back_to_legacy_underscore_field() {
        let value = json!({"_Seq": 7});
        assert_eq!(parse_resume_seq(&value), Some(7));
    }

    #[test]
    fn missing_field_is_none() {
        let value = json!({"Type": "app.bsky.feed.post"});
        assert_eq!(parse_resume_seq(&value), None);
    }

    #[tokio::test]
    async fn setup_creates_file_and_get_backfill_seqno_reads_it_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        tokio::fs::write(&path, b"{\"Seq\": 5}\n").await.unwrap();

        let sink = FileSink::new(path, false);
        sink.setup().await.unwrap();
        assert_eq!(sink.get_backfill_seqno().await.unwrap(), Some(5));
    }
}
