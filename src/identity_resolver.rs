//! Handle↔DID↔personal-data-server-endpoint lookups, cached.

use std::sync::Arc;

use serde_json::json;

use crate::cache::{Cache, CachedValue};
use crate::error::LookupError;
use crate::http::HttpClient;
use crate::model::identity::{Identifier, Identity};
use crate::ratelimit::RateLimit;

/// Resolves handles and DIDs to full [`Identity`] records, through the
/// shared cache and rate limiter.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    http: Arc<HttpClient>,
    cache: Arc<Cache>,
    ratelimit: RateLimit,
    directory_endpoint: String,
}

impl IdentityResolver {
    /// Build a resolver against a directory service endpoint (the
    /// well-known DID/handle directory, independent of any single PDS).
    #[must_use]
    pub fn new(
        http: Arc<HttpClient>,
        cache: Arc<Cache>,
        ratelimit: RateLimit,
        directory_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            http,
            cache,
            ratelimit,
            directory_endpoint: directory_endpoint.into(),
        }
    }

    /// `lookup(identifier) -> Identity | error`. Cache probe, then on
    /// miss: resolve via the directory service, then cache the outcome
    /// (success or error) for the configured TTL.
    #[tracing::instrument(skip(self), fields(identifier = %identifier))]
    pub async fn lookup(&self, identifier: &Identifier) -> Result<Identity, LookupError> {
        let key = identifier.cache_key();

        if let Some(cached) = self.cache.get(&key).await {
            return match cached {
                CachedValue::Ok(value) => serde_json::from_value(value)
                    .map_err(|err| LookupError::NonNetwork(err.to_string())),
                CachedValue::Err(message) => Err(LookupError::NonNetwork(message)),
            };
        }

        let result = self.resolve(identifier).await;
        let cached_value = match &result {
            Ok(identity) => CachedValue::Ok(
                serde_json::to_value(identity)
                    .unwrap_or_else(|_| json!({"did": identity.did.as_str()})),
            ),
            Err(err) => CachedValue::Err(err.to_string()),
        };
        self.cache.put(key, cached_value).await;

        result
    }

    async fn resolve(&self, identifier: &Identifier) -> Result<Identity, LookupError> {
        self.ratelimit.acquire().await;

        let url = format!(
            "{}/xrpc/com.atproto.identity.resolveIdentity?identifier={}",
            self.directory_endpoint, identifier
        );
        let doc: serde_json::Value = self.http.get_json(&url).await?;

        let did = doc
            .get("did")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LookupError::NonNetwork("directory response missing did".into()))?;
        let handle = doc
            .get("handle")
            .and_then(|v| v.as_str())
            .unwrap_or(identifier.to_string().as_str())
            .to_owned();
        let pds = doc
            .get("pds")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| {
                LookupError::NonNetwork("directory response missing pds endpoint".into())
            })?;
        // If public-key extraction fails, omit it and continue rather
        // than failing the whole lookup.
        let did_key = doc
            .get("didKey")
            .and_then(|v| v.as_str())
            .map(str::to_owned);

        Ok(Identity {
            did: crate::model::identity::Did::parse(did)?,
            handle: crate::model::identity::Handle::parse(handle)?,
            pds,
            did_key,
        })
    }
}
