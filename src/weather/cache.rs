use md5::{Digest, Md5};
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{FetchError, Query, RequestType};

/// Raw provider payloads keyed by query digest.
///
/// Entries expire passively after the configured TTL. Concurrent misses for the same
/// key share one fetch, and failed fetches are never stored.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Cache<String, Arc<str>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { entries }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<str>> {
        self.entries.get(key).await
    }

    /// Returns the cached payload for `(query, request_type)`, calling `fetch` on a miss.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        query: &Query,
        request_type: RequestType,
        fetch: F,
    ) -> Result<Arc<str>, Arc<FetchError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, FetchError>>,
    {
        let key = cache_key(query, request_type);

        if let Some(payload) = self.get(&key).await {
            tracing::debug!("Cache hit for {} ({})", request_type, key);
            return Ok(payload);
        }

        tracing::debug!("Cache miss for {} ({})", request_type, key);
        self.entries
            .try_get_with(key, async move { fetch().await.map(Arc::<str>::from) })
            .await
    }
}

/// Hex MD5 digest of the canonical JSON encoding of `(query, request_type)`.
pub fn cache_key(query: &Query, request_type: RequestType) -> String {
    // Serializing derived structs of strings and floats cannot fail.
    let canonical = serde_json::to_vec(&(query, request_type)).unwrap_or_default();
    hex::encode(Md5::digest(&canonical))
}
