//! Census-driven resume arithmetic.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::FatalError;
use crate::model::cursor::CensusEntry;

/// Read a census file: one `{Did, Rev, Head}` JSON object per line. The
/// file is assumed immutable for the lifetime of a bulk pull, so it's
/// read fully into memory once at startup.
pub async fn read_census(path: &Path) -> Result<Vec<CensusEntry>, FatalError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| FatalError::UnreadableInput {
            path: path.to_owned(),
            source,
        })?;
    let mut lines = BufReader::new(file).lines();

    let mut entries = Vec::new();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|source| FatalError::UnreadableInput {
            path: path.to_owned(),
            source,
        })?
    {
        if line.trim().is_empty() {
            continue;
        }
        let entry: CensusEntry = serde_json::from_str(&line).map_err(|err| {
            FatalError::UnreadableInput {
                path: path.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
            }
        })?;
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_one_entry_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("census.jsonl");
        tokio::fs::write(
            &path,
            "{\"Did\":\"did:plc:a\",\"Rev\":\"1\",\"Head\":\"bafy1\"}\n{\"Did\":\"did:plc:b\",\"Rev\":\"2\",\"Head\":\"bafy2\"}\n",
        )
        .await
        .unwrap();

        let entries = read_census(&path).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].did, "did:plc:a");
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("census.jsonl");
        tokio::fs::write(
            &path,
            "{\"Did\":\"did:plc:a\",\"Rev\":\"1\",\"Head\":\"bafy1\"}\n\n",
        )
        .await
        .unwrap();

        let entries = read_census(&path).await.unwrap();
        assert_eq!(entries.len(), 1);
    }
}
