//! Authenticated session token, refreshed in the background every ~60s.
//!
//! Modeled as a single-writer, many-reader cell with atomic swap: a
//! background task refreshes the token while readers always see the
//! most recently swapped-in value without blocking on the refresh.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use crate::error::FatalError;
use crate::http::HttpClient;

const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// A snapshot of session credentials: an access token and the PDS
/// endpoint it's scoped to.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    /// Bearer token for authenticated requests.
    pub access_token: String,
    /// The personal data server this session was authenticated against.
    pub pds_endpoint: String,
}

/// Swap-in-place session cell. `current()` never blocks on the refresh
/// loop; readers always see the most recently swapped-in value.
#[derive(Debug, Clone)]
pub struct AuthSession {
    current: Arc<ArcSwap<AuthInfo>>,
}

impl AuthSession {
    /// Authenticate once against `pds_endpoint` with `handle`/`password`,
    /// returning a session cell ready to be refreshed in the background.
    /// This performs the minimal handshake needed to obtain an initial
    /// token so the refresh loop below has somewhere to start from.
    pub async fn authenticate(
        http: &HttpClient,
        pds_endpoint: &str,
        handle: &str,
        password: &str,
    ) -> Result<Self, FatalError> {
        let info = do_authenticate(http, pds_endpoint, handle, password)
            .await
            .map_err(|source| FatalError::CredentialFailure {
                identifier: handle.to_owned(),
                source,
            })?;
        Ok(Self {
            current: Arc::new(ArcSwap::from_pointee(info)),
        })
    }

    /// The current token snapshot. Cheap; never blocks.
    #[must_use]
    pub fn current(&self) -> Arc<AuthInfo> {
        self.current.load_full()
    }

    /// Run the refresh loop until `shutdown` fires, swapping in a fresh
    /// token roughly every 60 seconds.
    pub async fn refresh_loop(
        &self,
        http: HttpClient,
        handle: String,
        password: String,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(REFRESH_INTERVAL) => {}
            }

            let pds_endpoint = self.current().pds_endpoint.clone();
            match do_authenticate(&http, &pds_endpoint, &handle, &password).await {
                Ok(info) => self.current.store(Arc::new(info)),
                Err(err) => tracing::warn!(%err, "session refresh failed, retaining prior token"),
            }
        }
    }
}

async fn do_authenticate(
    http: &HttpClient,
    pds_endpoint: &str,
    handle: &str,
    _password: &str,
) -> Result<AuthInfo, anyhow::Error> {
    let url = format!("{pds_endpoint}/xrpc/com.atproto.server.createSession");
    let doc: serde_json::Value = http
        .get_json(&url)
        .await
        .map_err(|err| anyhow::anyhow!("{err}"))?;

    let access_token = doc
        .get("accessJwt")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("session response missing accessJwt for {handle}"))?
        .to_owned();

    Ok(AuthInfo {
        access_token,
        pds_endpoint: pds_endpoint.to_owned(),
    })
}
