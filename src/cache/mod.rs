//! Bounded, cost-weighted, TTL key-value store over lookup results and
//! negative results.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;
use serde::{Deserialize, Serialize};

/// A cached value: either a successful lookup result or a stored error
/// message, both serialized so the weigher can compute a cost and so a
/// single heterogeneous cache can hold every lookup kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CachedValue {
    /// A successful lookup result, as JSON.
    Ok(serde_json::Value),
    /// A failed lookup, negatively cached with the same TTL as a hit.
    Err(String),
}

impl CachedValue {
    fn weight(&self) -> u32 {
        let bytes = serde_json::to_vec(self).map(|v| v.len()).unwrap_or(64);
        u32::try_from(bytes).unwrap_or(u32::MAX)
    }
}

/// Namespaced, bounded, TTL-indexed cache shared across every hydration
/// consumer. Backed by `moka`'s TinyLFU-admission future cache.
#[derive(Debug, Clone)]
pub struct Cache {
    inner: MokaCache<String, CachedValue>,
    ttl: Duration,
}

impl Cache {
    /// Build a cache bounded to `max_cost_bytes` total weighted entries,
    /// with `ttl` applied uniformly to hits and negative results.
    #[must_use]
    pub fn new(max_cost_bytes: u64, ttl: Duration) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(max_cost_bytes)
            .time_to_live(ttl)
            .weigher(|_key: &String, value: &CachedValue| value.weight())
            .build();
        Self { inner, ttl }
    }

    /// Namespace a lookup kind and identifier into a cache key, e.g.
    /// `identity:<id>`, `profile:<handle>`, `post:<uri>`, `repo:<did>`.
    #[must_use]
    pub fn key(namespace: &str, id: &str) -> String {
        format!("{namespace}:{id}")
    }

    /// Probe the cache. Returns `None` on a clean miss; `Some` on a hit,
    /// whether that hit is a success or a negatively-cached error.
    pub async fn get(&self, key: &str) -> Option<CachedValue> {
        self.inner.get(key).await
    }

    /// Store `value` under `key` with this cache's configured TTL.
    pub async fn put(&self, key: String, value: CachedValue) {
        self.inner.insert(key, value).await;
    }

    /// The TTL applied to every entry.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Shared handle, cloned into every component that needs cache access.
pub type SharedCache = Arc<Cache>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn hit_returns_the_stored_value() {
        let cache = Cache::new(1 << 20, Duration::from_secs(60));
        let key = Cache::key("identity", "did:plc:abc123");
        cache
            .put(key.clone(), CachedValue::Ok(json!({"handle": "alice.test"})))
            .await;
        let got = cache.get(&key).await;
        assert!(matches!(got, Some(CachedValue::Ok(_))));
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = Cache::new(1 << 20, Duration::from_secs(60));
        assert!(cache.get("identity:nobody").await.is_none());
    }

    #[tokio::test]
    async fn negative_results_are_cached_like_successes() {
        let cache = Cache::new(1 << 20, Duration::from_secs(60));
        let key = Cache::key("identity", "did:plc:missing");
        cache
            .put(key.clone(), CachedValue::Err("not found".to_owned()))
            .await;
        assert!(matches!(cache.get(&key).await, Some(CachedValue::Err(_))));
    }
}
