//! CLI/env configuration surface.

use std::path::PathBuf;

use clap::Parser;

/// Default directory-listing (enumeration) endpoint: the well-known
/// aggregator used when `--pds-endpoint` is left unset.
pub const DEFAULT_PDS_ENDPOINT: &str = "https://bsky.network";

/// Configuration shared by every acquisition mode. Every field is a
/// flag/env var understood by every subcommand; `Config` is the contract
/// the CLI front end builds, not the parser itself.
#[derive(Parser, Debug, Clone)]
#[command(name = "tidewatch")]
#[command(version)]
#[command(about = "Hydrating ingest pipeline for a federated event stream")]
pub struct Config {
    /// Session handle, e.g. `alice.example.social`.
    #[arg(long, env = "BLUESKY_HANDLE")]
    pub handle: Option<String>,

    /// Session password.
    #[arg(long, env = "BLUESKY_PASSWORD")]
    pub password: Option<String>,

    /// Cache cost ceiling in bytes.
    #[arg(long, default_value_t = 1u64 << 32)]
    pub cache_size: u64,

    /// Worker pool size for the firehose, bulk puller, and CAR rehydrator.
    #[arg(long, default_value_t = 32)]
    pub worker_count: usize,

    /// Destination path for the append-only line file sink.
    #[arg(long, default_value = "output.jsonl")]
    pub output_file: Option<PathBuf>,

    /// Destination `[project.]dataset.table` for the column-store sink.
    #[arg(long)]
    pub output_bq_table: Option<String>,

    /// Emit `Full` as a JSON-encoded string even in file output. The
    /// column-store sink always does this regardless of this flag.
    #[arg(long, default_value_t = false)]
    pub stringify_full: bool,

    /// Explicit start cursor; 0 probes the configured sink for a resume
    /// point instead.
    #[arg(long, default_value_t = 0)]
    pub backfill_seq: i64,

    /// Restart the firehose consumer on transport error.
    #[arg(long, default_value_t = true)]
    pub autorestart: bool,

    /// Pre-enumerated identifier list for a census-driven bulk pull.
    #[arg(long)]
    pub census_file: Option<PathBuf>,

    /// Path used to persist and resume bulk-pull progress.
    #[arg(long)]
    pub intermediate_state: Option<PathBuf>,

    /// Input folder of captured CAR files, for CAR rehydration.
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Enumeration endpoint for the bulk puller.
    #[arg(long, default_value = DEFAULT_PDS_ENDPOINT)]
    pub pds_endpoint: String,

    /// Rate limiter throughput, tokens/sec.
    #[arg(long, default_value_t = 1000)]
    pub rate_limit_per_sec: u32,

    /// TTL, in seconds, for both positive and negative cache entries.
    /// Defaults to 24h, applied uniformly rather than giving negative
    /// entries a shorter lifetime.
    #[arg(long, default_value_t = 24 * 60 * 60)]
    pub cache_ttl_secs: u64,
}

impl Config {
    /// Whether at least one output sink is configured.
    #[must_use]
    pub fn has_sink(&self) -> bool {
        self.output_file.is_some() || self.output_bq_table.is_some()
    }
}
