//! Column-store sink: schema verify/create, row normalization, and
//! micro-batched append.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gcp_bigquery_client::Client;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::error::FatalError;
use crate::model::event::HydratedEvent;
use crate::sink::schema::{expected_schema, sort_fields};
use crate::sink::Sink;

const BATCH_SIZE: usize = 250;

/// `[project.]dataset.table` destination, split into its parts.
#[derive(Debug, Clone)]
pub struct TableRef {
    /// GCP project id, defaulted from the client's credentials if absent.
    pub project_id: Option<String>,
    /// Dataset id.
    pub dataset_id: String,
    /// Table id.
    pub table_id: String,
}

impl TableRef {
    /// Parse `[project.]dataset.table`.
    pub fn parse(raw: &str) -> Result<Self, FatalError> {
        let parts: Vec<&str> = raw.split('.').collect();
        match parts.as_slice() {
            [dataset_id, table_id] => Ok(Self {
                project_id: None,
                dataset_id: (*dataset_id).to_owned(),
                table_id: (*table_id).to_owned(),
            }),
            [project_id, dataset_id, table_id] => Ok(Self {
                project_id: Some((*project_id).to_owned()),
                dataset_id: (*dataset_id).to_owned(),
                table_id: (*table_id).to_owned(),
            }),
            _ => Err(FatalError::SinkSetupFailed(anyhow::anyhow!(
                "output-bq-table must be `dataset.table` or `project.dataset.table`, got {raw}"
            ))),
        }
    }
}

/// BigQuery-backed sink. Buffers rows and appends in batches of
/// [`BATCH_SIZE`].
#[derive(Debug)]
pub struct BigQuerySink {
    client: Client,
    table: TableRef,
    buffer: Mutex<Vec<Map<String, Value>>>,
}

impl BigQuerySink {
    /// Build a sink over an already-authenticated `gcp_bigquery_client`.
    #[must_use]
    pub fn new(client: Client, table: TableRef) -> Arc<Self> {
        Arc::new(Self {
            client,
            table,
            buffer: Mutex::new(Vec::with_capacity(BATCH_SIZE)),
        })
    }

    fn project_id(&self) -> &str {
        self.table.project_id.as_deref().unwrap_or("default")
    }

    async fn flush_locked(&self, buffer: &mut Vec<Map<String, Value>>) -> anyhow::Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }

        let rows = std::mem::take(buffer);
        self.client
            .tabledata()
            .insert_all_rows(
                self.project_id(),
                &self.table.dataset_id,
                &self.table.table_id,
                rows,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Sink for BigQuerySink {
    async fn setup(&self) -> Result<(), FatalError> {
        let expected = expected_schema();

        let existing = self
            .client
            .table()
            .get(
                self.project_id(),
                &self.table.dataset_id,
                &self.table.table_id,
                None,
            )
            .await;

        match existing {
            Ok(table) => {
                let mut found = table.schema.unwrap_or_default();
                let mut expected = expected;
                sort_fields(&mut found);
                sort_fields(&mut expected);
                if found != expected {
                    return Err(FatalError::SchemaIncompatible {
                        found: format!("{found:?}"),
                        desired: format!("{expected:?}"),
                    });
                }
                Ok(())
            }
            Err(_) => {
                self.client
                    .table()
                    .create(
                        gcp_bigquery_client::model::table::Table::new(
                            self.project_id(),
                            &self.table.dataset_id,
                            &self.table.table_id,
                            expected,
                        )
                        .time_partitioning(
                            gcp_bigquery_client::model::time_partitioning::TimePartitioning::per_month(),
                        ),
                    )
                    .await
                    .map_err(|err| FatalError::SinkSetupFailed(anyhow::anyhow!(err)))?;
                Ok(())
            }
        }
    }

    async fn get_backfill_seqno(&self) -> Result<Option<i64>, FatalError> {
        let query = format!(
            "SELECT MAX(Seq) AS max_seq FROM `{}.{}`",
            self.table.dataset_id, self.table.table_id
        );
        let mut result = self
            .client
            .job()
            .query(self.project_id(), gcp_bigquery_client::model::query_request::QueryRequest::new(query))
            .await
            .map_err(|err| FatalError::SinkSetupFailed(anyhow::anyhow!(err)))?;

        if result.next_row() {
            Ok(result.get_i64_by_name("max_seq").ok().flatten())
        } else {
            Ok(None)
        }
    }

    async fn write(&self, event: &HydratedEvent) -> anyhow::Result<()> {
        let row = normalize_row(event)?;
        let mut buffer = self.buffer.lock().await;
        buffer.push(row);
        if buffer.len() >= BATCH_SIZE {
            self.flush_locked(&mut buffer).await?;
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        let mut buffer = self.buffer.lock().await;
        self.flush_locked(&mut buffer).await
    }
}

/// Normalize one hydrated event into a BigQuery row object.
fn normalize_row(event: &HydratedEvent) -> anyhow::Result<Map<String, Value>> {
    let mut value = serde_json::to_value(event)?;

    // Full is typed STRING in the column store, never RECORD.
    if let Some(full) = value.get_mut("Full") {
        let as_string = serde_json::to_string(full)?;
        *full = Value::String(as_string);
    }

    rename_sigil_prefixes(&mut value);
    reparse_timestamps(&mut value);
    drop_known_duplicates(&mut value);

    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("normalized row is not an object: {other:?}"),
    }
}

/// Rename any key beginning with `$` to a leading `_`, recursively.
fn rename_sigil_prefixes(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let renamed: Map<String, Value> = std::mem::take(map)
                .into_iter()
                .map(|(key, mut val)| {
                    rename_sigil_prefixes(&mut val);
                    let key = key
                        .strip_prefix('$')
                        .map(|rest| format!("_{rest}"))
                        .unwrap_or(key);
                    (key, val)
                })
                .collect();
            *map = renamed;
        }
        Value::Array(items) => {
            for item in items {
                rename_sigil_prefixes(item);
            }
        }
        _ => {}
    }
}

const TIMESTAMP_FIELDS: [&str; 3] = ["CreatedAt", "PulledTimestamp", "IndexedAt"];

/// Reparse RFC3339 timestamp strings into epoch seconds at every
/// occurrence of `CreatedAt`/`PulledTimestamp`/`IndexedAt`, however deep.
fn reparse_timestamps(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if TIMESTAMP_FIELDS.contains(&key.as_str()) {
                    if let Some(epoch) = val.as_str().and_then(parse_rfc3339_to_epoch) {
                        *val = Value::Number(epoch.into());
                        continue;
                    }
                }
                reparse_timestamps(val);
            }
        }
        Value::Array(items) => {
            for item in items {
                reparse_timestamps(item);
            }
        }
        _ => {}
    }
}

fn parse_rfc3339_to_epoch(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp())
}

/// Drop `_Raw` at the root and known duplicate fields (`ReplyCount`
/// under `LikedPost`/`RepostedPost`) that the column-store schema
/// doesn't carry.
fn drop_known_duplicates(value: &mut Value) {
    if let Value::Object(root) = value {
        root.remove("_Raw");
        if let Some(Value::Object(projection)) = root.get_mut("Projection") {
            for key in ["LikedPost", "RepostedPost"] {
                if let Some(Value::Object(post)) = projection.get_mut(key) {
                    post.remove("ReplyCount");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_ref_parses_two_and_three_part_forms() {
        let two = TableRef::parse("dataset.table").unwrap();
        assert_eq!(two.project_id, None);
        assert_eq!(two.dataset_id, "dataset");

        let three = TableRef::parse("project.dataset.table").unwrap();
        assert_eq!(three.project_id.as_deref(), Some("project"));
    }

    #[test]
    fn table_ref_rejects_malformed_input() {
        assert!(TableRef::parse("just-a-table").is_err());
    }

    #[test]
    fn sigil_rename_is_recursive() {
        let mut value = json!({"$type": "x", "nested": {"$type": "y"}});
        rename_sigil_prefixes(&mut value);
        assert_eq!(value["_type"], "x");
        assert_eq!(value["nested"]["_type"], "y");
    }

    #[test]
    fn timestamp_reparse_converts_every_named_occurrence() {
        let mut value = json!({
            "CreatedAt": "2024-01-02T03:04:05Z",
            "Projection": {"BlockedProfile": {"IndexedAt": "2024-01-02T03:04:05Z"}}
        });
        reparse_timestamps(&mut value);
        assert!(value["CreatedAt"].is_number());
        assert!(value["Projection"]["BlockedProfile"]["IndexedAt"].is_number());
    }

    #[test]
    fn drop_known_duplicates_removes_reply_count() {
        let mut value = json!({
            "Projection": {"LikedPost": {"ReplyCount": 3, "Text": "hi"}}
        });
        drop_known_duplicates(&mut value);
        assert!(value["Projection"]["LikedPost"].get("ReplyCount").is_none());
        assert_eq!(value["Projection"]["LikedPost"]["Text"], "hi");
    }
}
