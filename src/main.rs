//! Thin CLI dispatch: parse flags, build the shared pipeline, hand off
//! to one of `stream`/`pull`/`rehydrate`. No pipeline logic lives here.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use tidewatch::bulk::BulkPuller;
use tidewatch::config::Config;
use tidewatch::error::FatalError;
use tidewatch::http::HttpClient;
use tidewatch::model::cursor::IntermediateState;
use tidewatch::observability;
use tidewatch::pipeline::Pipeline;
use tidewatch::ratelimit::RateLimit;
use tidewatch::sink::Sink;
use tidewatch::sink::bigquery::{BigQuerySink, TableRef};
use tidewatch::sink::file::FileSink;

#[derive(Debug, Parser)]
#[command(name = "tidewatch")]
#[command(version)]
#[command(about = "Hydrating ingest pipeline for a federated event stream")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Subscribe to the live firehose and hydrate every commit as it
    /// arrives.
    Stream {
        /// Websocket subscription endpoint.
        #[arg(long, default_value = "wss://bsky.network/xrpc/com.atproto.sync.subscribeRepos")]
        subscription_endpoint: String,
    },
    /// Enumerate and download repositories from a personal data server,
    /// optionally via a pre-built census file or DID-expansion discovery.
    Pull {
        /// Follow discovered identities' own PDS endpoints outward from
        /// the configured `pds_endpoint` seed, instead of a single
        /// enumeration or census pass.
        #[arg(long, default_value_t = false)]
        discover: bool,
    },
    /// Walk a directory of previously captured CAR files and hydrate
    /// every record found.
    Rehydrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    observability::init_logging();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "tidewatch exited with a fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), FatalError> {
    let config = cli.config;
    if !config.has_sink() {
        return Err(FatalError::NoSinkConfigured);
    }

    let sinks = build_sinks(&config).await?;
    let pipeline = Pipeline::new(&config, sinks).await?;
    pipeline.install_signal_handlers();
    pipeline.spawn_session_refresh(&config);
    pipeline.spawn_observability_server(SocketAddr::from(([0, 0, 0, 0], 9090)));

    match cli.command {
        Command::Stream {
            subscription_endpoint,
        } => run_stream(&pipeline, &config, &subscription_endpoint).await,
        Command::Pull { discover } => run_pull(&pipeline, &config, discover).await,
        Command::Rehydrate => run_rehydrate(&pipeline, &config).await,
    }
}

async fn build_sinks(config: &Config) -> Result<Vec<Arc<dyn Sink>>, FatalError> {
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();

    if let Some(path) = &config.output_file {
        sinks.push(FileSink::new(path.clone(), config.stringify_full));
    }

    if let Some(raw_table) = &config.output_bq_table {
        let table = TableRef::parse(raw_table)?;
        let client = gcp_bigquery_client::Client::from_application_default_credentials()
            .await
            .map_err(|err| FatalError::SinkSetupFailed(anyhow::anyhow!(err)))?;
        sinks.push(BigQuerySink::new(client, table));
    }

    Ok(sinks)
}

async fn resume_cursor(config: &Config, pipeline: &Pipeline) -> Result<Option<i64>, FatalError> {
    if config.backfill_seq != 0 {
        return Ok(Some(config.backfill_seq));
    }
    pipeline.backfill_seqno().await
}

async fn run_stream(
    pipeline: &Pipeline,
    config: &Config,
    subscription_endpoint: &str,
) -> Result<(), FatalError> {
    let cursor = resume_cursor(config, pipeline).await?;
    info!(?cursor, subscription_endpoint, "starting firehose stream");
    pipeline
        .run_firehose(subscription_endpoint, config.worker_count, cursor, config.autorestart)
        .await
}

async fn run_pull(pipeline: &Pipeline, config: &Config, discover: bool) -> Result<(), FatalError> {
    let http = Arc::new(HttpClient::new());
    let ratelimit = RateLimit::new(config.rate_limit_per_sec);
    let identity = Arc::new(tidewatch::identity_resolver::IdentityResolver::new(
        Arc::clone(&http),
        Arc::new(tidewatch::cache::Cache::new(
            config.cache_size,
            std::time::Duration::from_secs(config.cache_ttl_secs),
        )),
        ratelimit.clone(),
        config.pds_endpoint.clone(),
    ));
    let puller = BulkPuller::new(
        http,
        pipeline.hydrator(),
        identity,
        ratelimit,
        config.worker_count,
    );

    let (output, drain) = pipeline.wire_output();
    let shutdown = pipeline.shutdown_token();

    let result = if discover {
        puller
            .pull_with_discovery(config.pds_endpoint.clone(), output, shutdown)
            .await
    } else if let Some(census_path) = &config.census_file {
        let census = tidewatch::bulk::census::read_census(census_path).await?;
        let state = load_intermediate_state(config, census.len())?;
        let intermediate_path = config.intermediate_state.clone();
        puller
            .pull_census(
                &config.pds_endpoint,
                census,
                state,
                output,
                move |state| persist_intermediate_state(intermediate_path.as_deref(), state),
                shutdown,
            )
            .await
    } else {
        let start_cursor = load_pds_cursor(config)?;
        let intermediate_path = config.intermediate_state.clone();
        puller
            .pull_enumeration(
                &config.pds_endpoint,
                start_cursor,
                output,
                move |state| persist_intermediate_state(intermediate_path.as_deref(), &state),
                shutdown,
            )
            .await
    };

    pipeline.finish(drain).await?;
    result
}

async fn run_rehydrate(pipeline: &Pipeline, config: &Config) -> Result<(), FatalError> {
    let root = config
        .input
        .clone()
        .ok_or_else(|| FatalError::UnreadableInput {
            path: PathBuf::from("(unset)"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "--input is required for rehydrate"),
        })?;

    let (output, drain) = pipeline.wire_output();
    let shutdown = pipeline.shutdown_token();

    let result = tidewatch::rehydrate::run(&root, pipeline.hydrator(), config.worker_count, output, shutdown).await;
    pipeline.finish(drain).await?;
    result
}

fn load_pds_cursor(config: &Config) -> Result<Option<String>, FatalError> {
    let Some(path) = &config.intermediate_state else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(|source| FatalError::UnreadableInput {
        path: path.clone(),
        source,
    })?;
    let state: IntermediateState =
        serde_json::from_str(&raw).map_err(|err| FatalError::UnreadableInput {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        })?;
    match state {
        IntermediateState::PdsCursor(cursor) => Ok(Some(cursor)),
        IntermediateState::CensusProgress { .. } => Ok(None),
    }
}

fn load_intermediate_state(
    config: &Config,
    census_len: usize,
) -> Result<IntermediateState, FatalError> {
    if let Some(path) = &config.intermediate_state {
        if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| FatalError::UnreadableInput {
                path: path.clone(),
                source,
            })?;
            return serde_json::from_str(&raw).map_err(|err| FatalError::UnreadableInput {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
            });
        }
    }
    let _ = census_len;
    Ok(IntermediateState::CensusProgress {
        first_unpulled_index: 0,
        recently_completed_indices: std::collections::BTreeSet::new(),
    })
}

/// Persist intermediate state via write-to-temp-then-rename, so a reader
/// never observes a partially written file and no cross-process lock is
/// needed.
fn persist_intermediate_state(path: Option<&std::path::Path>, state: &IntermediateState) {
    let Some(path) = path else { return };
    let Ok(serialized) = serde_json::to_vec_pretty(state) else {
        return;
    };
    let tmp_path = path.with_extension("tmp");
    if std::fs::write(&tmp_path, serialized).is_ok() {
        let _ = std::fs::rename(&tmp_path, path);
    }
}
