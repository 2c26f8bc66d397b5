//! Websocket subscription, commit decode, per-operation fan-out, and
//! sequence cursor.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use futures_util::StreamExt;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::hydrator::Hydrator;
use crate::model::commit::{OpAction, Operation};
use crate::model::event::HydratedEvent;
use crate::model::identity::Did;
use crate::model::record::Record;
use crate::observability::metrics::Metrics;
use crate::repo::RepoView;

/// Errors from a single `run()` invocation. Every variant is recoverable
/// from the pipeline's perspective — the caller decides whether to
/// restart.
#[derive(Debug, Error)]
pub enum FirehoseError {
    /// The websocket handshake failed.
    #[error("websocket connect failed: {0}")]
    Connect(String),
    /// The transport closed or errored mid-stream.
    #[error("transport error: {0}")]
    Transport(String),
}

/// One decoded commit frame off the wire. Operation decoding from the
/// raw CBOR envelope is handled at the transport boundary; this is the
/// shape handed to per-commit processing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitFrame {
    seq: i64,
    repo: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    time: chrono::DateTime<chrono::Utc>,
    ops: Vec<WireOp>,
    #[serde(default)]
    blocks: serde_bytes::ByteBuf,
}

#[derive(Debug, Deserialize)]
struct WireOp {
    action: String,
    path: String,
    cid: Option<String>,
}

/// Run the firehose consumer until the transport closes or `shutdown`
/// fires. `subscription_endpoint` is the websocket base URL (e.g.
/// `wss://bsky.network/xrpc/com.atproto.sync.subscribeRepos`);
/// `start_cursor`, if present, is appended as `?cursor=`.
///
/// The surrounding lifecycle (`pipeline`) may call this again with the
/// last observed `Seq` after a transport error, when auto-restart is
/// enabled.
pub async fn run(
    hydrator: Arc<Hydrator>,
    metrics: Arc<Metrics>,
    subscription_endpoint: &str,
    worker_count: usize,
    start_cursor: Option<i64>,
    shutdown: CancellationToken,
    output: mpsc::Sender<HydratedEvent>,
) -> Result<i64, FirehoseError> {
    let url = match start_cursor {
        Some(cursor) => format!("{subscription_endpoint}?cursor={cursor}"),
        None => subscription_endpoint.to_owned(),
    };

    let (ws_stream, _response) = connect_async(&url)
        .await
        .map_err(|err| FirehoseError::Connect(err.to_string()))?;
    info!(url, "firehose connected");

    let (mut write, mut read) = ws_stream.split();
    let _ = &mut write; // subscription is read-only beyond the initial handshake
    let semaphore = Arc::new(Semaphore::new(worker_count));
    let last_seq = Arc::new(AtomicI64::new(start_cursor.unwrap_or(0)));

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                break;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Binary(bytes))) => {
                        let hydrator = Arc::clone(&hydrator);
                        let metrics = Arc::clone(&metrics);
                        let output = output.clone();
                        let last_seq = Arc::clone(&last_seq);
                        let permit = Arc::clone(&semaphore)
                            .acquire_owned()
                            .await
                            .expect("semaphore is never closed while the loop runs");

                        tokio::spawn(async move {
                            let _permit = permit;
                            if let Err(err) = process_frame(&bytes, &hydrator, &metrics, &output, &last_seq).await {
                                warn!(%err, "failed to process firehose frame");
                            }
                        });
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_other)) => {}
                    Some(Err(err)) => {
                        return Err(FirehoseError::Transport(err.to_string()));
                    }
                }
            }
        }
    }

    Ok(last_seq.load(Ordering::SeqCst))
}

async fn process_frame(
    bytes: &[u8],
    hydrator: &Arc<Hydrator>,
    metrics: &Arc<Metrics>,
    output: &mpsc::Sender<HydratedEvent>,
    last_seq: &Arc<AtomicI64>,
) -> anyhow::Result<()> {
    let started = std::time::Instant::now();
    let frame: CommitFrame = serde_ipld_dagcbor::from_slice(bytes)?;
    last_seq.store(frame.seq, Ordering::SeqCst);

    let repo_did = Did::parse(frame.repo.clone())?;
    let repo = RepoView::open(&frame.blocks)?;

    for wire_op in frame.ops {
        let action = match wire_op.action.as_str() {
            "create" => OpAction::Create,
            "update" => OpAction::Update,
            "delete" => OpAction::Delete,
            other => {
                warn!(action = other, "unknown operation action, skipping");
                continue;
            }
        };
        let op = Operation {
            action,
            path: wire_op.path,
            cid: wire_op.cid,
        };

        let event = match op.action {
            OpAction::Create | OpAction::Update => {
                let Some(record) = repo.get_record(&op.path) else {
                    warn!(path = op.path, "operation references missing record, skipping");
                    continue;
                };
                if let Some(declared) = &op.cid {
                    let declared_cid: cid::Cid = match declared.parse() {
                        Ok(cid) => cid,
                        Err(err) => {
                            warn!(%err, path = op.path, "malformed declared CID, skipping op");
                            continue;
                        }
                    };
                    if !RepoView::verify_cid(record, &declared_cid) {
                        warn!(path = op.path, "CID mismatch, skipping op");
                        continue;
                    }
                }

                let lexicon_type = op.lexicon_type().to_owned();
                let decoded = Record::from_value(&lexicon_type, &record.value);
                let mut event = hydrator
                    .hydrate(&lexicon_type, &decoded, &record.value, repo_did.as_str())
                    .await;
                event.action = Some(op.action);
                event.seq = Some(frame.seq);
                event
            }
            OpAction::Delete => {
                let lexicon_type = op.lexicon_type().to_owned();
                let mut event = hydrator
                    .hydrate(
                        &lexicon_type,
                        &Record::Other(serde_json::Map::new()),
                        &serde_json::Value::Object(serde_json::Map::new()),
                        repo_did.as_str(),
                    )
                    .await;
                event.action = Some(OpAction::Delete);
                event.seq = Some(frame.seq);
                event
            }
        };

        metrics
            .ops_processed
            .with_label_values(&[&event.action.map(|a| a.to_string()).unwrap_or_default(), &event.event_type])
            .inc();
        metrics
            .last_event_created_at
            .set(event.created_at.timestamp());

        if output.send(event).await.is_err() {
            anyhow::bail!("output channel closed");
        }
    }

    metrics
        .event_processing_duration
        .observe(started.elapsed().as_secs_f64());
    Ok(())
}
