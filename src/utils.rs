//! Small shared helpers.

use std::io::SeekFrom;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Read the last non-empty line of a file, scanning backwards from the
/// end so arbitrarily large files don't need to be read in full. Used by
/// the file sink's tail-based resume.
pub async fn get_last_line(path: &std::path::Path) -> std::io::Result<Option<String>> {
    let mut file = File::open(path).await?;
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(None);
    }

    const CHUNK: u64 = 4096;
    let mut pos = len;
    let mut buffer = Vec::new();

    loop {
        let read_size = CHUNK.min(pos);
        pos -= read_size;
        file.seek(SeekFrom::Start(pos)).await?;

        let mut chunk = vec![0u8; usize::try_from(read_size).unwrap_or(0)];
        file.read_exact(&mut chunk).await?;
        chunk.extend_from_slice(&buffer);
        buffer = chunk;

        let text = String::from_utf8_lossy(&buffer);
        let trimmed = text.trim_end_matches('\n');
        let has_full_line = pos == 0 || trimmed.contains('\n');
        if has_full_line {
            return Ok(last_non_empty_line(&text).map(str::to_owned));
        }
    }
}

fn last_non_empty_line(text: &str) -> Option<&str> {
    text.lines().rev().find(|line| !line.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reads_last_line_of_a_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let mut file = File::create(&path).await.unwrap();
        file.write_all(b"{\"a\":1}\n{\"a\":2}\n").await.unwrap();
        file.flush().await.unwrap();

        let last = get_last_line(&path).await.unwrap();
        assert_eq!(last.as_deref(), Some("{\"a\":2}"));
    }

    #[tokio::test]
    async fn trailing_blank_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let mut file = File::create(&path).await.unwrap();
        file.write_all(b"{\"a\":1}\n\n").await.unwrap();
        file.flush().await.unwrap();

        let last = get_last_line(&path).await.unwrap();
        assert_eq!(last.as_deref(), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn empty_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        File::create(&path).await.unwrap();

        assert!(get_last_line(&path).await.unwrap().is_none());
    }
}
