//! Public-key store (§4.9): an `arc-swap`-backed read-mostly map of active
//! services' RSA public keys and grants, refreshed by a periodic
//! background task. Mirrors [`pay_gateway::credential_registry`]'s
//! snapshot-swap shape, generalized to two lookup tables (keys, grants)
//! instead of one.

use std::{collections::HashMap, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::DecodingKey;
use pay_common::{ids::TenantId, PayError};
use pay_tokio::task::LxTask;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default interval for the background key-refresh sweep (§4.9, §5).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// An active API client as known to the registry.
#[derive(Clone, Debug)]
pub struct ServiceRecord {
    pub id: Uuid,
    pub public_key_pem: String,
    pub requests_per_second: u32,
}

/// A (service, tenant) grant: the service is permitted to act on that
/// tenant's data until `expires_at`, if set.
#[derive(Clone, Debug)]
pub struct Grant {
    pub service_id: Uuid,
    pub tenant_id: TenantId,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Persistence boundary for the registry backing the public-key store.
#[async_trait]
pub trait ServiceRegistry: Send + Sync + 'static {
    async fn list_active_services(&self) -> Result<Vec<ServiceRecord>, PayError>;
    async fn list_grants(&self) -> Result<Vec<Grant>, PayError>;
}

struct Snapshot {
    keys: HashMap<Uuid, DecodingKey>,
    rps: HashMap<Uuid, u32>,
    grants: HashMap<(Uuid, TenantId), Grant>,
}

impl Snapshot {
    fn empty() -> Self {
        Self { keys: HashMap::new(), rps: HashMap::new(), grants: HashMap::new() }
    }
}

pub struct PublicKeyStore<R: ServiceRegistry> {
    registry: Arc<R>,
    snapshot: ArcSwap<Snapshot>,
}

impl<R: ServiceRegistry> PublicKeyStore<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry, snapshot: ArcSwap::from_pointee(Snapshot::empty()) }
    }

    pub async fn refresh(&self) -> Result<(), PayError> {
        let services = self.registry.list_active_services().await?;
        let grant_records = self.registry.list_grants().await?;

        let mut keys = HashMap::with_capacity(services.len());
        let mut rps = HashMap::with_capacity(services.len());
        for service in services {
            let key = DecodingKey::from_rsa_pem(service.public_key_pem.as_bytes())
                .map_err(|e| PayError::internal(format!("invalid RSA public key: {e}")))?;
            keys.insert(service.id, key);
            rps.insert(service.id, service.requests_per_second);
        }

        let mut grants = HashMap::with_capacity(grant_records.len());
        for grant in grant_records {
            grants.insert((grant.service_id, grant.tenant_id), grant);
        }

        debug!(services = keys.len(), grants = grants.len(), "public key store refreshed");
        self.snapshot.store(Arc::new(Snapshot { keys, rps, grants }));
        Ok(())
    }

    pub fn decoding_key(&self, service_id: Uuid) -> Option<DecodingKey> {
        self.snapshot.load().keys.get(&service_id).cloned()
    }

    pub fn requests_per_second(&self, service_id: Uuid) -> Option<u32> {
        self.snapshot.load().rps.get(&service_id).copied()
    }

    /// A (service, tenant) grant is usable iff it exists, is active, and
    /// (if it has an expiry) hasn't expired as of `now` (§4.9 grant check).
    pub fn has_active_grant(&self, service_id: Uuid, tenant_id: TenantId, now: DateTime<Utc>) -> bool {
        match self.snapshot.load().grants.get(&(service_id, tenant_id)) {
            Some(grant) => grant.active && grant.expires_at.is_none_or(|exp| exp > now),
            None => false,
        }
    }

    /// Spawn the periodic refresh task. The returned [`LxTask`] should be
    /// registered with the process's static-task shutdown join so it exits
    /// cleanly and within a bounded deadline (§5).
    pub fn spawn_refresh_task(self: Arc<Self>, interval: Duration) -> LxTask<()>
    where
        R: 'static,
    {
        LxTask::spawn("public-key-store-refresh", async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!(error = %e, "public key store refresh failed, keeping stale snapshot");
                }
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct StaticRegistry {
        services: Vec<ServiceRecord>,
        grants: Vec<Grant>,
    }

    #[async_trait]
    impl ServiceRegistry for StaticRegistry {
        async fn list_active_services(&self) -> Result<Vec<ServiceRecord>, PayError> {
            Ok(self.services.clone())
        }
        async fn list_grants(&self) -> Result<Vec<Grant>, PayError> {
            Ok(self.grants.clone())
        }
    }

    // A throwaway 2048-bit test RSA public key, not used for anything but
    // exercising PEM parsing.
    const TEST_PUBLIC_KEY_PEM: &str = include_str!("../testdata/test_rsa_public_key.pem");

    #[tokio::test]
    async fn refresh_populates_keys_and_grants() {
        let service_id = Uuid::new_v4();
        let tenant_id = TenantId::new_random();
        let registry = Arc::new(StaticRegistry {
            services: vec![ServiceRecord {
                id: service_id,
                public_key_pem: TEST_PUBLIC_KEY_PEM.to_string(),
                requests_per_second: 50,
            }],
            grants: vec![Grant { service_id, tenant_id, active: true, expires_at: None }],
        });
        let store = PublicKeyStore::new(registry);
        store.refresh().await.unwrap();

        assert!(store.decoding_key(service_id).is_some());
        assert_eq!(store.requests_per_second(service_id), Some(50));
        assert!(store.has_active_grant(service_id, tenant_id, Utc::now()));
        assert!(!store.has_active_grant(Uuid::new_v4(), tenant_id, Utc::now()));
    }
}
