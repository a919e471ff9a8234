//! Memory-aware fetch wrapper.
//!
//! Wraps arbitrary data fetches with the shared TTL cache and request
//! coordinator, so page code gets caching and supersession without
//! touching either directly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};
use warden_cache::TtlCache;
use warden_request::{RequestCoordinator, RequestOutcome};

/// Cache and coordinator front for data fetches.
///
/// Values are stored as JSON in the shared cache, so anything that
/// round-trips through serde can be cached. Errors from the fetch itself
/// pass through untouched and are never cached.
#[derive(Clone)]
pub struct MemoryAwareFetch {
    cache: Arc<TtlCache<Value>>,
    requests: Arc<RequestCoordinator>,
}

impl MemoryAwareFetch {
    pub fn new(cache: Arc<TtlCache<Value>>, requests: Arc<RequestCoordinator>) -> Self {
        Self { cache, requests }
    }

    /// Returns the cached value under `key`, or runs `fetch` and caches a
    /// successful result for `ttl` (the cache default when `None`).
    pub async fn with_cache<T, E, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        ttl: Option<Duration>,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.cached(key) {
            return Ok(hit);
        }
        let value = fetch().await?;
        self.store(key, &value, ttl);
        Ok(value)
    }

    /// Runs `fetch` as the coordinated request for `key`, superseding any
    /// request already running under it. `fetch` receives the request's
    /// cancellation token.
    pub async fn with_cancellation<T, E, F, Fut>(
        &self,
        key: &str,
        fetch: F,
    ) -> RequestOutcome<Result<T, E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.requests.run(key, fetch).await
    }

    /// [`with_cache`](Self::with_cache) and
    /// [`with_cancellation`](Self::with_cancellation) together: a cache hit
    /// makes no request; a miss runs a coordinated request and caches its
    /// successful result unless it was cancelled.
    pub async fn with_cache_and_cancellation<T, E, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        ttl: Option<Duration>,
    ) -> RequestOutcome<Result<T, E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.cached(key) {
            return RequestOutcome::Completed(Ok(hit));
        }
        let outcome = self.requests.run(key, fetch).await;
        if let RequestOutcome::Completed(Ok(value)) = &outcome {
            self.store(key, value, ttl);
        }
        outcome
    }

    fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.cache.get(key)?;
        match serde_json::from_value(value) {
            Ok(hit) => {
                trace!(key = %key, "fetch served from cache");
                Some(hit)
            }
            Err(e) => {
                // Same key reused for a different shape: treat as a miss.
                warn!(key = %key, error = %e, "cached value has the wrong shape, refetching");
                self.cache.delete(key);
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        match serde_json::to_value(value) {
            Ok(json) => {
                let ttl = ttl.unwrap_or(self.cache.config().default_ttl);
                self.cache.set_with_ttl(key, json, ttl);
            }
            Err(e) => warn!(key = %key, error = %e, "fetch result not cacheable"),
        }
    }
}
