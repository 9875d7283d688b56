//! Secret Resolver (§4.1): retrieves tenant MAC keys and other
//! path-referenced secrets from an external KV secret store, caching values
//! with a TTL so the hot path (signing a gateway request) doesn't round-trip
//! to the secret store on every call.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use pay_common::PayError;
use quick_cache::sync::Cache;
use tracing::debug;

pub mod http_backend;
pub use http_backend::HttpSecretBackend;

/// Backend abstraction over the external KV secret store, so tests can swap
/// in an in-memory backend without touching the resolver's caching logic.
#[async_trait]
pub trait SecretBackend: Send + Sync + 'static {
    async fn get_secret(&self, path: &str) -> Result<String, PayError>;
    async fn put_secret(&self, path: &str, value: &str) -> Result<(), PayError>;
}

#[derive(Clone)]
struct CachedSecret {
    value: String,
    expires_at: Instant,
}

/// Default cache TTL per §4.1.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Caches secrets by path with a configurable TTL in front of a
/// [`SecretBackend`]. The cache lock is released before any external fetch;
/// a writer replaces the entry atomically after the fetch completes, so two
/// concurrent misses for the same path both hit the backend rather than
/// blocking each other, and both end up writing the same (or a fresher)
/// value — last writer wins, which is fine since secret values returned for
/// the same path within a short window are expected to be identical.
pub struct SecretResolver<B: SecretBackend> {
    backend: Arc<B>,
    cache: Cache<String, CachedSecret>,
    ttl: Duration,
}

impl<B: SecretBackend> SecretResolver<B> {
    pub fn new(backend: B, cache_capacity: usize, ttl: Duration) -> Self {
        Self {
            backend: Arc::new(backend),
            cache: Cache::new(cache_capacity),
            ttl,
        }
    }

    pub fn with_default_ttl(backend: B, cache_capacity: usize) -> Self {
        Self::new(backend, cache_capacity, DEFAULT_TTL)
    }

    /// Return a fresh cached value for `path`, or fetch-and-cache it.
    ///
    /// On a backend failure, this does *not* populate the cache with a
    /// negative result — a transient secret-store outage should not poison
    /// subsequent lookups once the store recovers (§4.1).
    pub async fn get(&self, path: &str) -> Result<String, PayError> {
        if let Some(cached) = self.cache.get(path) {
            if cached.expires_at > Instant::now() {
                return Ok(cached.value);
            }
        }

        let value = self
            .backend
            .get_secret(path)
            .await
            .map_err(|e| PayError::SecretUnavailable(format!("{path}: {e}")))?;

        self.cache.insert(
            path.to_string(),
            CachedSecret {
                value: value.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        debug!(path, "secret cached");
        Ok(value)
    }

    /// Write a new secret version at `path` and refresh the cache entry
    /// in-place so a subsequent [`get`](Self::get) observes it immediately
    /// rather than serving a stale cached value until the TTL lapses.
    pub async fn put(&self, path: &str, value: &str) -> Result<(), PayError> {
        self.backend.put_secret(path, value).await?;
        self.cache.insert(
            path.to_string(),
            CachedSecret {
                value: value.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    /// Evict a path from the cache without touching the backend. Used when a
    /// tenant is deactivated and its secret should stop being served from a
    /// stale cache entry even though the backend copy is untouched.
    pub fn invalidate(&self, path: &str) {
        self.cache.remove(path);
    }
}

/// In-memory [`SecretBackend`] for tests and local development.
#[derive(Default)]
pub struct InMemoryBackend {
    store: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, path: &str, value: &str) {
        self.store
            .lock()
            .unwrap()
            .insert(path.to_string(), value.to_string());
    }
}

#[async_trait]
impl SecretBackend for InMemoryBackend {
    async fn get_secret(&self, path: &str) -> Result<String, PayError> {
        self.store
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PayError::not_found(format!("no secret at path {path}")))
    }

    async fn put_secret(&self, path: &str, value: &str) -> Result<(), PayError> {
        self.store
            .lock()
            .unwrap()
            .insert(path.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingBackend {
        inner: InMemoryBackend,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl SecretBackend for CountingBackend {
        async fn get_secret(&self, path: &str) -> Result<String, PayError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.get_secret(path).await
        }
        async fn put_secret(&self, path: &str, value: &str) -> Result<(), PayError> {
            self.inner.put_secret(path, value).await
        }
    }

    #[tokio::test]
    async fn caches_fresh_values() {
        let backend = CountingBackend {
            inner: InMemoryBackend::new(),
            fetches: AtomicUsize::new(0),
        };
        backend.inner.seed("tenants/t1/mac", "secret-value");
        let resolver = SecretResolver::new(backend, 100, Duration::from_secs(60));

        let v1 = resolver.get("tenants/t1/mac").await.unwrap();
        let v2 = resolver.get("tenants/t1/mac").await.unwrap();
        assert_eq!(v1, "secret-value");
        assert_eq!(v2, "secret-value");
        assert_eq!(resolver.backend.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let backend = CountingBackend {
            inner: InMemoryBackend::new(),
            fetches: AtomicUsize::new(0),
        };
        backend.inner.seed("tenants/t1/mac", "v1");
        let resolver = SecretResolver::new(backend, 100, Duration::from_millis(10));

        resolver.get("tenants/t1/mac").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        resolver.get("tenants/t1/mac").await.unwrap();
        assert_eq!(resolver.backend.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_secret_is_not_negatively_cached() {
        let backend = CountingBackend {
            inner: InMemoryBackend::new(),
            fetches: AtomicUsize::new(0),
        };
        let resolver = SecretResolver::new(backend, 100, Duration::from_secs(60));

        assert!(resolver.get("missing").await.is_err());
        resolver.backend.inner.seed("missing", "now-present");
        let value = resolver.get("missing").await.unwrap();
        assert_eq!(value, "now-present");
    }

    #[tokio::test]
    async fn put_refreshes_cache_immediately() {
        let backend = CountingBackend {
            inner: InMemoryBackend::new(),
            fetches: AtomicUsize::new(0),
        };
        backend.inner.seed("tenants/t1/mac", "old");
        let resolver = SecretResolver::new(backend, 100, Duration::from_secs(60));
        resolver.get("tenants/t1/mac").await.unwrap();

        resolver.put("tenants/t1/mac", "new").await.unwrap();
        let value = resolver.get("tenants/t1/mac").await.unwrap();
        assert_eq!(value, "new");
        // The get() after put() should be served from cache, not a refetch.
        assert_eq!(resolver.backend.fetches.load(Ordering::SeqCst), 1);
    }
}
