//! Channel wiring, lifecycle, signal handling, and the firehose restart loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::Cache;
use crate::config::Config;
use crate::error::FatalError;
use crate::firehose;
use crate::http::{AuthSession, HttpClient};
use crate::hydrator::Hydrator;
use crate::identity_resolver::IdentityResolver;
use crate::model::event::HydratedEvent;
use crate::observability::metrics::Metrics;
use crate::ratelimit::RateLimit;
use crate::sink::Sink;

const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Everything a run needs, built once from [`Config`] and shared across
/// every acquisition mode.
pub struct Pipeline {
    hydrator: Arc<Hydrator>,
    metrics: Arc<Metrics>,
    sinks: Vec<Arc<dyn Sink>>,
    http: Arc<HttpClient>,
    session: Option<Arc<AuthSession>>,
    shutdown: CancellationToken,
}

impl Pipeline {
    /// Assemble the shared rate limiter, cache, HTTP client, identity
    /// resolver, hydrator, configured sinks, and (if credentials are
    /// configured) an authenticated session.
    pub async fn new(config: &Config, sinks: Vec<Arc<dyn Sink>>) -> Result<Self, FatalError> {
        if sinks.is_empty() {
            return Err(FatalError::NoSinkConfigured);
        }

        let ratelimit = RateLimit::new(config.rate_limit_per_sec);
        let cache = Arc::new(Cache::new(
            config.cache_size,
            Duration::from_secs(config.cache_ttl_secs),
        ));
        let http = Arc::new(HttpClient::new());
        let identity = Arc::new(IdentityResolver::new(
            Arc::clone(&http),
            Arc::clone(&cache),
            ratelimit.clone(),
            config.pds_endpoint.clone(),
        ));
        let hydrator = Arc::new(Hydrator::new(
            identity,
            Arc::clone(&http),
            cache,
            config.pds_endpoint.clone(),
        ));

        let session = Self::authenticate(config, &http).await?;

        for sink in &sinks {
            sink.setup().await?;
        }

        Ok(Self {
            hydrator,
            metrics: Arc::new(Metrics::new()),
            sinks,
            http,
            session,
            shutdown: CancellationToken::new(),
        })
    }

    /// Authenticate once if a handle is configured, failing fast on a
    /// missing password or rejected credentials. Returns `None` when no
    /// handle is configured; every current lookup hits a public endpoint,
    /// so running unauthenticated is a valid configuration.
    async fn authenticate(
        config: &Config,
        http: &HttpClient,
    ) -> Result<Option<Arc<AuthSession>>, FatalError> {
        let Some(handle) = &config.handle else {
            return Ok(None);
        };
        let password = config
            .password
            .as_ref()
            .ok_or_else(|| FatalError::CredentialFailure {
                identifier: handle.clone(),
                source: anyhow::anyhow!("--handle was given without a --password"),
            })?;

        let session =
            AuthSession::authenticate(http, &config.pds_endpoint, handle, password).await?;
        Ok(Some(Arc::new(session)))
    }

    /// Spawn the session refresh loop, if a session is configured. A
    /// no-op when running unauthenticated.
    pub fn spawn_session_refresh(&self, config: &Config) {
        let (Some(session), Some(handle), Some(password)) =
            (&self.session, &config.handle, &config.password)
        else {
            return;
        };
        let session = Arc::clone(session);
        let http = (*self.http).clone();
        let handle = handle.clone();
        let password = password.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            session.refresh_loop(http, handle, password, shutdown).await;
        });
    }

    /// Root cancellation token. Signal handling cancels this; every
    /// long-lived task observes it to begin orderly shutdown.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn the SIGINT/SIGTERM handler that cancels the root token on
    /// first signal.
    pub fn install_signal_handlers(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut term = signal(SignalKind::terminate())
                .expect("SIGTERM handler installs on a unix target");
            let mut interrupt = signal(SignalKind::interrupt())
                .expect("SIGINT handler installs on a unix target");
            tokio::select! {
                _ = term.recv() => info!("received SIGTERM"),
                _ = interrupt.recv() => info!("received SIGINT"),
            }
            shutdown.cancel();
        });
    }

    /// Run the live firehose subscription, auto-restarting on transport
    /// error with the last observed `Seq` until `shutdown` fires.
    pub async fn run_firehose(
        &self,
        subscription_endpoint: &str,
        worker_count: usize,
        mut cursor: Option<i64>,
        autorestart: bool,
    ) -> Result<(), FatalError> {
        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let drain = self.spawn_sink_drainer(rx);

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let result = firehose::run(
                Arc::clone(&self.hydrator),
                Arc::clone(&self.metrics),
                subscription_endpoint,
                worker_count,
                cursor,
                self.shutdown.clone(),
                tx.clone(),
            )
            .await;

            match result {
                Ok(last_seq) => {
                    cursor = Some(last_seq);
                    if self.shutdown.is_cancelled() || !autorestart {
                        break;
                    }
                    warn!("firehose closed cleanly, restarting from seq {last_seq}");
                }
                Err(err) => {
                    warn!(%err, "firehose transport error");
                    if !autorestart || self.shutdown.is_cancelled() {
                        break;
                    }
                }
            }
        }

        drop(tx);
        self.orderly_shutdown(drain).await
    }

    /// Spawn the single sink-drainer task: one writer per configured
    /// sink, fed from the shared output channel.
    fn spawn_sink_drainer(
        &self,
        mut rx: mpsc::Receiver<HydratedEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let sinks = self.sinks.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for sink in &sinks {
                    if let Err(err) = sink.write(&event).await {
                        warn!(%err, "sink write failed");
                    }
                }
            }
        })
    }

    /// Cancel, let the drainer finish flushing queued events, then close
    /// every sink.
    async fn orderly_shutdown(&self, drain: tokio::task::JoinHandle<()>) -> Result<(), FatalError> {
        self.shutdown.cancel();
        let _ = drain.await;
        for sink in &self.sinks {
            if let Err(err) = sink.close().await {
                warn!(%err, "sink close failed");
            }
        }
        Ok(())
    }

    /// Probe every configured sink for a resume point. `--backfill-seq 0`
    /// means "ask the sink" (`config.rs`'s documented default); the first
    /// sink to report a cursor wins.
    pub async fn backfill_seqno(&self) -> Result<Option<i64>, FatalError> {
        for sink in &self.sinks {
            if let Some(seq) = sink.get_backfill_seqno().await? {
                return Ok(Some(seq));
            }
        }
        Ok(None)
    }

    /// Shared hydrator, for acquisition modes other than the firehose
    /// (bulk pull, CAR rehydration) that this pipeline wires up
    /// separately from `run_firehose`.
    #[must_use]
    pub fn hydrator(&self) -> Arc<Hydrator> {
        Arc::clone(&self.hydrator)
    }

    /// Shared metrics handle.
    #[must_use]
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Spawn the `/healthz` + `/metrics` observability server.
    pub fn spawn_observability_server(&self, addr: std::net::SocketAddr) {
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            crate::observability::metrics::serve(metrics, addr).await;
        });
    }

    /// Build an output channel plus its sink-drainer task, for use by
    /// bulk pull and CAR rehydration callers that don't go through
    /// [`Pipeline::run_firehose`].
    #[must_use]
    pub fn wire_output(&self) -> (mpsc::Sender<HydratedEvent>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        (tx, self.spawn_sink_drainer(rx))
    }

    /// Drain and close sinks after a non-firehose run completes.
    pub async fn finish(&self, drain: tokio::task::JoinHandle<()>) -> Result<(), FatalError> {
        self.orderly_shutdown(drain).await
    }
}
