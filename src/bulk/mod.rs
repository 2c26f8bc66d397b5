//! Enumeration-driven and census-driven bulk pull, resumable cursor, and
//! optional DID-expansion discovery.

/// Census file reading and the prefix-draining resume algorithm's tests
/// live alongside [`crate::model::cursor::IntermediateState`].
pub mod census;

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{FatalError, LookupError};
use crate::hydrator::Hydrator;
use crate::hydrator::discover::extract_identities_in_repo;
use crate::http::HttpClient;
use crate::identity_resolver::IdentityResolver;
use crate::model::cursor::{CensusEntry, IntermediateState};
use crate::model::event::HydratedEvent;
use crate::model::record::Record;
use crate::ratelimit::RateLimit;
use crate::repo::RepoView;

/// Messages sent from download workers to the [`PdsDiscovery`] actor.
///
/// The queue/completed-set pair is owned by a single task rather than
/// shared behind a lock, so a worker can never mutate the queue while
/// the dispatcher is iterating it.
#[derive(Debug)]
enum DiscoveryMsg {
    Discovered(String),
    Completed(String),
    Frontier(tokio::sync::oneshot::Sender<Vec<String>>),
}

/// Handle to the discovery actor.
#[derive(Debug, Clone)]
pub struct PdsDiscovery {
    tx: mpsc::Sender<DiscoveryMsg>,
}

impl PdsDiscovery {
    /// Spawn the actor seeded with `seed_endpoint`, returning a handle
    /// plus the join handle of its task.
    pub fn spawn(seed_endpoint: String) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(1024);
        let handle = tokio::spawn(async move {
            let mut queue: Vec<String> = vec![seed_endpoint];
            let mut completed: HashSet<String> = HashSet::new();

            while let Some(msg) = rx.recv().await {
                match msg {
                    DiscoveryMsg::Discovered(endpoint) => {
                        if !completed.contains(&endpoint) && !queue.contains(&endpoint) {
                            queue.push(endpoint);
                        }
                    }
                    DiscoveryMsg::Completed(endpoint) => {
                        completed.insert(endpoint.clone());
                        queue.retain(|e| e != &endpoint);
                    }
                    DiscoveryMsg::Frontier(reply) => {
                        let _ = reply.send(queue.clone());
                    }
                }
            }
        });
        (Self { tx }, handle)
    }

    /// Record a newly discovered server endpoint.
    pub async fn discovered(&self, endpoint: String) {
        let _ = self.tx.send(DiscoveryMsg::Discovered(endpoint)).await;
    }

    /// Mark an endpoint as fully pulled.
    pub async fn completed(&self, endpoint: String) {
        let _ = self.tx.send(DiscoveryMsg::Completed(endpoint)).await;
    }

    /// Snapshot the current pending frontier.
    pub async fn frontier(&self) -> Vec<String> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        if self.tx.send(DiscoveryMsg::Frontier(reply_tx)).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ListReposPage {
    repos: Vec<ListReposEntry>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListReposEntry {
    did: String,
}

/// Shared collaborators every bulk-pull worker needs.
#[derive(Clone)]
pub struct BulkPuller {
    http: Arc<HttpClient>,
    hydrator: Arc<Hydrator>,
    identity: Arc<IdentityResolver>,
    ratelimit: RateLimit,
    worker_count: usize,
}

impl BulkPuller {
    /// Build a puller over the shared collaborators.
    #[must_use]
    pub fn new(
        http: Arc<HttpClient>,
        hydrator: Arc<Hydrator>,
        identity: Arc<IdentityResolver>,
        ratelimit: RateLimit,
        worker_count: usize,
    ) -> Self {
        Self {
            http,
            hydrator,
            identity,
            ratelimit,
            worker_count,
        }
    }

    /// Enumeration-driven pull: page through `pds_endpoint`'s
    /// list-repositories API (page size 1000), dispatching a bounded
    /// worker pool over each page's repositories.
    pub async fn pull_enumeration(
        &self,
        pds_endpoint: &str,
        mut cursor: Option<String>,
        output: mpsc::Sender<HydratedEvent>,
        persist_state: impl Fn(IntermediateState) + Send + Sync + 'static,
        shutdown: CancellationToken,
    ) -> Result<(), FatalError> {
        let persist_state = Arc::new(persist_state);
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let page = self
                .fetch_repos_page(pds_endpoint, cursor.as_deref())
                .await
                .map_err(|err| FatalError::SinkSetupFailed(anyhow::anyhow!(err)))?;

            let semaphore = Arc::new(Semaphore::new(self.worker_count));
            let mut joins = Vec::with_capacity(page.repos.len());
            for entry in page.repos {
                let permit = Arc::clone(&semaphore).acquire_owned().await.unwrap();
                let this = self.clone();
                let output = output.clone();
                let pds_endpoint = pds_endpoint.to_owned();
                joins.push(tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(err) = this.pull_one_repo(&pds_endpoint, &entry.did, &output, None).await {
                        warn!(%err, did = entry.did, "repository pull failed; marking complete anyway");
                    }
                }));
            }
            for join in joins {
                let _ = join.await;
            }

            cursor = page.cursor;
            if let Some(cursor) = &cursor {
                persist_state(IntermediateState::PdsCursor(cursor.clone()));
            } else {
                return Ok(());
            }
        }
    }

    /// Census-driven pull: dispatch every unpulled census index into the
    /// worker pool, advancing `first_unpulled_index` as indices complete.
    pub async fn pull_census(
        &self,
        pds_endpoint: &str,
        census: Vec<CensusEntry>,
        mut state: IntermediateState,
        output: mpsc::Sender<HydratedEvent>,
        persist_state: impl Fn(&IntermediateState) + Send + Sync + 'static,
        shutdown: CancellationToken,
    ) -> Result<(), FatalError> {
        let IntermediateState::CensusProgress {
            first_unpulled_index,
            ..
        } = &state
        else {
            return Err(FatalError::SinkSetupFailed(anyhow::anyhow!(
                "census pull requires CensusProgress intermediate state"
            )));
        };

        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let state = Arc::new(Mutex::new(std::mem::replace(
            &mut state,
            IntermediateState::CensusProgress {
                first_unpulled_index: *first_unpulled_index,
                recently_completed_indices: std::collections::BTreeSet::new(),
            },
        )));
        let persist_state = Arc::new(persist_state);

        let start = {
            let guard = state.lock().await;
            match &*guard {
                IntermediateState::CensusProgress {
                    first_unpulled_index,
                    ..
                } => *first_unpulled_index,
                IntermediateState::PdsCursor(_) => unreachable!(),
            }
        };

        let mut joins = Vec::new();
        for (index, entry) in census.iter().enumerate() {
            let index = u64::try_from(index).unwrap_or(u64::MAX);
            if index < start {
                continue;
            }
            if shutdown.is_cancelled() {
                break;
            }

            let permit = Arc::clone(&semaphore).acquire_owned().await.unwrap();
            let this = self.clone();
            let output = output.clone();
            let pds_endpoint = pds_endpoint.to_owned();
            let did = entry.did.clone();
            let state = Arc::clone(&state);
            let persist_state = Arc::clone(&persist_state);

            joins.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) = this.pull_one_repo(&pds_endpoint, &did, &output, None).await {
                    warn!(%err, did, "repository pull failed; marking complete anyway");
                }
                let mut guard = state.lock().await;
                guard.mark_complete(index);
                persist_state(&guard);
            }));
        }

        for join in joins {
            let _ = join.await;
        }
        Ok(())
    }

    /// Optional DID-expansion mode: seed the discovery actor from
    /// `seed_endpoint`, and as each repository is pulled, feed any
    /// discovered identities' PDS endpoints back into the frontier.
    pub async fn pull_with_discovery(
        &self,
        seed_endpoint: String,
        output: mpsc::Sender<HydratedEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), FatalError> {
        let (discovery, join) = PdsDiscovery::spawn(seed_endpoint);

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let frontier = discovery.frontier().await;
            let Some(endpoint) = frontier.into_iter().next() else {
                break;
            };

            let page = self
                .fetch_repos_page(&endpoint, None)
                .await
                .map_err(|err| FatalError::SinkSetupFailed(anyhow::anyhow!(err)))?;

            for entry in page.repos {
                if let Err(err) = self
                    .pull_one_repo(&endpoint, &entry.did, &output, Some(&discovery))
                    .await
                {
                    warn!(%err, did = entry.did, "repository pull failed; marking complete anyway");
                }
            }

            discovery.completed(endpoint).await;
        }

        join.abort();
        Ok(())
    }

    async fn fetch_repos_page(
        &self,
        pds_endpoint: &str,
        cursor: Option<&str>,
    ) -> Result<ListReposPage, LookupError> {
        self.ratelimit.acquire().await;
        let url = match cursor {
            Some(cursor) => format!(
                "{pds_endpoint}/xrpc/com.atproto.sync.listRepos?limit=1000&cursor={cursor}"
            ),
            None => format!("{pds_endpoint}/xrpc/com.atproto.sync.listRepos?limit=1000"),
        };
        self.http.get_json(&url).await
    }

    async fn pull_one_repo(
        &self,
        pds_endpoint: &str,
        did: &str,
        output: &mpsc::Sender<HydratedEvent>,
        discovery: Option<&PdsDiscovery>,
    ) -> anyhow::Result<()> {
        self.ratelimit.acquire().await;
        let url = format!("{pds_endpoint}/xrpc/com.atproto.sync.getRepo?did={did}");
        let car_bytes = self
            .http
            .get_bytes(&url)
            .await
            .map_err(|err| anyhow::anyhow!(err))?;

        let repo = RepoView::open(&car_bytes)?;

        if let Some(discovery) = discovery {
            for identity in extract_identities_in_repo(&repo, &self.identity).await {
                discovery.discovered(identity.pds).await;
            }
        }

        for record in repo.for_each() {
            let lexicon_type = record.path.split('/').next().unwrap_or_default().to_owned();
            let decoded = Record::from_value(&lexicon_type, &record.value);
            let event = self
                .hydrator
                .hydrate(&lexicon_type, &decoded, &record.value, did)
                .await;
            if output.send(event).await.is_err() {
                anyhow::bail!("output channel closed");
            }
        }

        Ok(())
    }
}
