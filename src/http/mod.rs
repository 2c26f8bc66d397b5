//! Retrying HTTP client and authenticated session token cell.

mod session;

pub use session::{AuthInfo, AuthSession};

use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;

use crate::error::LookupError;

const MAX_ATTEMPTS: u32 = 15;
const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(15 * 60);

/// Thin wrapper over `reqwest::Client` implementing the retry policy
/// common to every outbound lookup: max 15 attempts, 1s-15m exponential
/// backoff with jitter, retry only on network errors.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    /// Build a client with sane connect/read timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the underlying TLS backend can't be initialized, which
    /// only happens in a misconfigured build environment.
    #[must_use]
    pub fn new() -> Self {
        let inner = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with default TLS backend");
        Self { inner }
    }

    /// Issue a GET request and decode the JSON body, retrying transient
    /// network failures per the policy above. Non-network errors (4xx,
    /// decode failures) are returned immediately without retry.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, LookupError> {
        let mut attempt = 0u32;
        let mut backoff = MIN_BACKOFF;

        loop {
            attempt += 1;
            match self.try_get_json(url).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(%err, attempt, "retrying after transient network error");
                    let jitter = rand::rng().random_range(0..250);
                    tokio::time::sleep(backoff + Duration::from_millis(jitter)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, LookupError> {
        let response = self.try_get(url).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| LookupError::NonNetwork(err.to_string()))
    }

    /// Issue a GET request and return the raw response body, retrying
    /// transient network failures per the policy above. For binary
    /// payloads (e.g. CAR byte streams) that `get_json` can't decode.
    #[tracing::instrument(skip(self))]
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, LookupError> {
        let mut attempt = 0u32;
        let mut backoff = MIN_BACKOFF;

        loop {
            attempt += 1;
            match self.try_get_bytes(url).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(%err, attempt, "retrying after transient network error");
                    let jitter = rand::rng().random_range(0..250);
                    tokio::time::sleep(backoff + Duration::from_millis(jitter)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_get_bytes(&self, url: &str) -> Result<Vec<u8>, LookupError> {
        let response = self.try_get(url).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|err| LookupError::NonNetwork(err.to_string()))
    }

    async fn try_get(&self, url: &str) -> Result<reqwest::Response, LookupError> {
        let response = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|err| classify(&err))?;

        if response.status().is_server_error() || response.status().as_u16() == 429 {
            return Err(LookupError::Network(format!(
                "server returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(LookupError::NonNetwork(format!(
                "server returned {}",
                response.status()
            )));
        }

        Ok(response)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(err: &reqwest::Error) -> LookupError {
    if err.is_timeout() || err.is_connect() {
        LookupError::Network(err.to_string())
    } else {
        LookupError::NonNetwork(err.to_string())
    }
}
