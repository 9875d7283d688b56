//! Per-entity rate limiting (§4.9): one bucket per (entity-type, entity-id,
//! minute-bucket), decremented atomically on each request. Storage failure
//! is fail-closed: deny. Aged buckets are reaped by a periodic task.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use pay_common::PayError;
use pay_tokio::task::LxTask;
use tracing::warn;

/// Persistence boundary for rate-limit buckets, so the limiter can be
/// backed by an external store (e.g. Redis) in production and an
/// in-process map in tests.
#[async_trait]
pub trait RateLimitBackend: Send + Sync + 'static {
    /// Atomically decrement the bucket for `key`, creating it with
    /// `capacity` tokens if absent. Returns `true` if a token was
    /// available and consumed, `false` if the bucket was already empty.
    async fn try_consume(&self, key: &str, capacity: u32) -> Result<bool, PayError>;

    /// Remove bucket entries older than `minute_bucket_cutoff` (an integer
    /// minutes-since-epoch value).
    async fn reap_older_than(&self, minute_bucket_cutoff: i64) -> Result<u64, PayError>;
}

pub struct RateLimiter<B: RateLimitBackend> {
    backend: B,
}

impl<B: RateLimitBackend> RateLimiter<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// `entity_type` is e.g. `"service"` or `"tenant"`; `entity_id` its
    /// identifier. The minute bucket is derived from the current wall
    /// clock, giving a fixed-window limiter.
    pub async fn check(&self, entity_type: &str, entity_id: &str, capacity: u32) -> bool {
        let minute_bucket = current_minute_bucket();
        let key = format!("{entity_type}:{entity_id}:{minute_bucket}");
        match self.backend.try_consume(&key, capacity).await {
            Ok(admitted) => admitted,
            Err(e) => {
                warn!(error = %e, entity_type, entity_id, "rate limit backend failure, denying");
                false
            }
        }
    }

    pub async fn reap_older_than_minutes(&self, max_age_minutes: i64) -> Result<u64, PayError> {
        let cutoff = current_minute_bucket() - max_age_minutes;
        self.backend.reap_older_than(cutoff).await
    }
}

impl<B: RateLimitBackend + 'static> RateLimiter<B> {
    /// Spawn the periodic reaping sweep. Register the returned [`LxTask`]
    /// with the process's static-task shutdown join (§5).
    pub fn spawn_reap_task(self: std::sync::Arc<Self>, interval: Duration, max_age_minutes: i64) -> LxTask<()> {
        LxTask::spawn("rate-limiter-reap", async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.reap_older_than_minutes(max_age_minutes).await {
                    warn!(error = %e, "rate limit bucket reap failed");
                }
            }
        })
    }
}

fn current_minute_bucket() -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch");
    (elapsed.as_secs() / 60) as i64
}

/// In-memory backend for tests: a single bucket per key, no cross-process
/// sharing.
#[derive(Default)]
pub struct InMemoryRateLimitBackend {
    buckets: Mutex<HashMap<String, u32>>,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    async fn try_consume(&self, key: &str, capacity: u32) -> Result<bool, PayError> {
        let mut buckets = self.buckets.lock().unwrap();
        let remaining = buckets.entry(key.to_string()).or_insert(capacity);
        if *remaining == 0 {
            return Ok(false);
        }
        *remaining -= 1;
        Ok(true)
    }

    async fn reap_older_than(&self, minute_bucket_cutoff: i64) -> Result<u64, PayError> {
        let mut buckets = self.buckets.lock().unwrap();
        let before = buckets.len();
        buckets.retain(|key, _| {
            key.rsplit(':')
                .next()
                .and_then(|s| s.parse::<i64>().ok())
                .is_none_or(|bucket| bucket >= minute_bucket_cutoff)
        });
        Ok((before - buckets.len()) as u64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn admits_exactly_capacity_requests_per_bucket() {
        let limiter = RateLimiter::new(InMemoryRateLimitBackend::new());
        let mut admitted = 0;
        for _ in 0..10 {
            if limiter.check("service", "svc-1", 5).await {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    struct FailingBackend;
    #[async_trait]
    impl RateLimitBackend for FailingBackend {
        async fn try_consume(&self, _key: &str, _capacity: u32) -> Result<bool, PayError> {
            Err(PayError::internal("store unavailable"))
        }
        async fn reap_older_than(&self, _cutoff: i64) -> Result<u64, PayError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn backend_failure_denies_the_request() {
        let limiter = RateLimiter::new(FailingBackend);
        assert!(!limiter.check("service", "svc-1", 100).await);
    }

    proptest::proptest! {
        /// A burst of K requests (K > capacity) admits exactly `capacity`
        /// successes in the current bucket and rejects the rest (§8).
        #[test]
        fn burst_admits_exactly_capacity(capacity in 1u32..50, extra in 1u32..50) {
            let k = capacity + extra;
            let rt = tokio::runtime::Runtime::new().unwrap();
            let admitted = rt.block_on(async {
                let limiter = RateLimiter::new(InMemoryRateLimitBackend::new());
                let mut admitted = 0;
                for _ in 0..k {
                    if limiter.check("service", "svc-burst", capacity).await {
                        admitted += 1;
                    }
                }
                admitted
            });
            proptest::prop_assert_eq!(admitted, capacity);
        }
    }
}
