//! CAR rehydration over a directory of previously captured repositories.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::FatalError;
use crate::hydrator::Hydrator;
use crate::model::event::HydratedEvent;
use crate::model::record::Record;
use crate::repo::RepoView;

/// Walk `root` recursively; every `*.car` file is fed through
/// `worker_count` workers that open, parse, iterate, and hydrate its
/// records, identically to the bulk puller's per-repository stage.
pub async fn run(
    root: &Path,
    hydrator: Arc<Hydrator>,
    worker_count: usize,
    output: mpsc::Sender<HydratedEvent>,
    shutdown: CancellationToken,
) -> Result<(), FatalError> {
    let paths: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "car"))
        .map(|entry| entry.into_path())
        .collect();

    if paths.is_empty() && !root.exists() {
        return Err(FatalError::UnreadableInput {
            path: root.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "input folder not found"),
        });
    }

    let semaphore = Arc::new(Semaphore::new(worker_count));
    let mut joins = Vec::with_capacity(paths.len());

    for path in paths {
        if shutdown.is_cancelled() {
            break;
        }
        let permit = Arc::clone(&semaphore).acquire_owned().await.unwrap();
        let hydrator = Arc::clone(&hydrator);
        let output = output.clone();

        joins.push(tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = rehydrate_file(&path, &hydrator, &output).await {
                warn!(%err, path = %path.display(), "CAR file failed to rehydrate; skipping");
            }
        }));
    }

    for join in joins {
        let _ = join.await;
    }
    Ok(())
}

async fn rehydrate_file(
    path: &Path,
    hydrator: &Arc<Hydrator>,
    output: &mpsc::Sender<HydratedEvent>,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path).await?;
    let repo = RepoView::open(&bytes)?;
    let did = repo.repo_did().to_string();

    for record in repo.for_each() {
        let lexicon_type = record.path.split('/').next().unwrap_or_default().to_owned();
        let decoded = Record::from_value(&lexicon_type, &record.value);
        let event = hydrator
            .hydrate(&lexicon_type, &decoded, &record.value, &did)
            .await;
        if output.send(event).await.is_err() {
            anyhow::bail!("output channel closed");
        }
    }

    Ok(())
}
