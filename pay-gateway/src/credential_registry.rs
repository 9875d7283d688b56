//! In-process tenant lookup (§4.2). Backed by a `merchants` table through the
//! [`MerchantStore`] trait; a read-mostly [`arc-swap`](arc_swap) snapshot
//! shadows the backend so the hot signing path never waits on a database
//! round-trip, mirroring the teacher's choice of `arc-swap` for its
//! long-lived public-key map.

use std::{collections::HashMap, sync::Arc};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use pay_common::{PayError, TenantId};
use pay_secrets::{SecretBackend, SecretResolver};
use tracing::{debug, info};

/// Environment a tenant's traffic runs against. Also gates the callback
/// IP-allowlist bypass (§9 Open Question): `sandbox` admits private/loopback
/// source IPs, `production` never does.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    pub fn allows_private_ip_bypass(self) -> bool {
        matches!(self, Self::Sandbox)
    }
}

/// A merchant as known to the gateway adapter: acquirer identifiers and the
/// path (not value) of its MAC secret.
#[derive(Clone, Debug)]
pub struct Tenant {
    pub id: TenantId,
    pub slug: String,
    pub cust_nbr: String,
    pub merch_nbr: String,
    pub dba_nbr: String,
    pub terminal_nbr: String,
    pub environment: Environment,
    pub mac_secret_path: String,
    pub active: bool,
}

impl Tenant {
    fn validate(&self) -> Result<(), PayError> {
        if self.slug.trim().is_empty() {
            return Err(PayError::invalid_input("tenant slug must not be empty"));
        }
        if [
            &self.cust_nbr,
            &self.merch_nbr,
            &self.dba_nbr,
            &self.terminal_nbr,
        ]
        .iter()
        .any(|s| s.trim().is_empty())
        {
            return Err(PayError::invalid_input(
                "tenant acquirer identifiers must all be non-empty",
            ));
        }
        if self.mac_secret_path.trim().is_empty() {
            return Err(PayError::invalid_input(
                "tenant mac_secret_path must not be empty",
            ));
        }
        Ok(())
    }
}

/// Persistence boundary for the `merchants` table. Kept as a trait so the
/// registry can be exercised in tests without a real database pool; the real
/// implementation lives alongside the other stores.
#[async_trait]
pub trait MerchantStore: Send + Sync + 'static {
    async fn list_active_tenants(&self) -> Result<Vec<Tenant>, PayError>;
    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), PayError>;
    async fn set_active(&self, tenant_id: TenantId, active: bool) -> Result<(), PayError>;
}

struct Snapshot {
    by_id: HashMap<TenantId, Tenant>,
    by_slug: HashMap<String, TenantId>,
}

impl Snapshot {
    fn from_tenants(tenants: Vec<Tenant>) -> Self {
        let mut by_id = HashMap::with_capacity(tenants.len());
        let mut by_slug = HashMap::with_capacity(tenants.len());
        for tenant in tenants {
            by_slug.insert(tenant.slug.clone(), tenant.id);
            by_id.insert(tenant.id, tenant);
        }
        Self { by_id, by_slug }
    }

    fn empty() -> Self {
        Self {
            by_id: HashMap::new(),
            by_slug: HashMap::new(),
        }
    }
}

pub struct CredentialRegistry<M: MerchantStore, S: SecretBackend> {
    store: Arc<M>,
    secrets: Arc<SecretResolver<S>>,
    snapshot: ArcSwap<Snapshot>,
}

impl<M: MerchantStore, S: SecretBackend> CredentialRegistry<M, S> {
    pub fn new(store: M, secrets: Arc<SecretResolver<S>>) -> Self {
        Self {
            store: Arc::new(store),
            secrets,
            snapshot: ArcSwap::from_pointee(Snapshot::empty()),
        }
    }

    /// Reload the full active-tenant set from the backend. Called once at
    /// startup and by the periodic background sweep (§4.2, §4.9 lifecycle).
    pub async fn refresh(&self) -> Result<(), PayError> {
        let tenants = self.store.list_active_tenants().await?;
        debug!(count = tenants.len(), "credential registry refreshed");
        self.snapshot.store(Arc::new(Snapshot::from_tenants(tenants)));
        Ok(())
    }

    /// A deep-copied snapshot of the tenant, per §4.2's "read operations
    /// return a deep-copied snapshot" requirement.
    pub fn get(&self, tenant_id: TenantId) -> Option<Tenant> {
        self.snapshot.load().by_id.get(&tenant_id).cloned()
    }

    pub fn get_by_slug(&self, slug: &str) -> Option<Tenant> {
        let snapshot = self.snapshot.load();
        let id = *snapshot.by_slug.get(slug)?;
        snapshot.by_id.get(&id).cloned()
    }

    /// Register a new tenant (or overwrite an existing one's acquirer
    /// identifiers). `mac_secret` is the plaintext MAC key, written through
    /// the secret resolver's put path and never stored in the registry
    /// itself; only its path is.
    pub async fn register(&self, tenant: Tenant, mac_secret: &str) -> Result<(), PayError> {
        tenant.validate()?;
        self.secrets.put(&tenant.mac_secret_path, mac_secret).await?;
        self.store.upsert_tenant(&tenant).await?;
        self.refresh().await?;
        info!(tenant_id = %tenant.id, "tenant registered");
        Ok(())
    }

    /// Deactivate a tenant. Never hard-deletes; sets the active flag only.
    pub async fn deactivate(&self, tenant_id: TenantId) -> Result<(), PayError> {
        self.store.set_active(tenant_id, false).await?;
        self.refresh().await
    }

    /// Write a new MAC secret version at the tenant's existing path.
    pub async fn rotate_mac(&self, tenant_id: TenantId, new_secret: &str) -> Result<(), PayError> {
        let tenant = self
            .get(tenant_id)
            .ok_or_else(|| PayError::not_found(format!("tenant {tenant_id}")))?;
        self.secrets.put(&tenant.mac_secret_path, new_secret).await
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use pay_secrets::InMemoryBackend;

    use super::*;

    struct InMemoryMerchantStore {
        tenants: Mutex<HashMap<TenantId, Tenant>>,
    }

    impl InMemoryMerchantStore {
        fn new() -> Self {
            Self { tenants: Mutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl MerchantStore for InMemoryMerchantStore {
        async fn list_active_tenants(&self) -> Result<Vec<Tenant>, PayError> {
            Ok(self
                .tenants
                .lock()
                .unwrap()
                .values()
                .filter(|t| t.active)
                .cloned()
                .collect())
        }

        async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), PayError> {
            self.tenants.lock().unwrap().insert(tenant.id, tenant.clone());
            Ok(())
        }

        async fn set_active(&self, tenant_id: TenantId, active: bool) -> Result<(), PayError> {
            if let Some(t) = self.tenants.lock().unwrap().get_mut(&tenant_id) {
                t.active = active;
            }
            Ok(())
        }
    }

    fn sample_tenant() -> Tenant {
        Tenant {
            id: TenantId::new_random(),
            slug: "acme".to_string(),
            cust_nbr: "1".to_string(),
            merch_nbr: "2".to_string(),
            dba_nbr: "3".to_string(),
            terminal_nbr: "4".to_string(),
            environment: Environment::Sandbox,
            mac_secret_path: "tenants/acme/mac".to_string(),
            active: true,
        }
    }

    #[tokio::test]
    async fn register_then_lookup_by_id_and_slug() {
        let registry = CredentialRegistry::new(
            InMemoryMerchantStore::new(),
            Arc::new(SecretResolver::with_default_ttl(InMemoryBackend::new(), 10)),
        );
        let tenant = sample_tenant();
        registry.register(tenant.clone(), "mac-secret").await.unwrap();

        assert_eq!(registry.get(tenant.id).unwrap().slug, "acme");
        assert_eq!(registry.get_by_slug("acme").unwrap().id, tenant.id);
    }

    #[tokio::test]
    async fn rejects_empty_acquirer_identifier() {
        let registry = CredentialRegistry::new(
            InMemoryMerchantStore::new(),
            Arc::new(SecretResolver::with_default_ttl(InMemoryBackend::new(), 10)),
        );
        let mut tenant = sample_tenant();
        tenant.dba_nbr = String::new();
        assert!(registry.register(tenant, "mac-secret").await.is_err());
    }

    #[tokio::test]
    async fn deactivate_removes_tenant_from_active_snapshot() {
        let registry = CredentialRegistry::new(
            InMemoryMerchantStore::new(),
            Arc::new(SecretResolver::with_default_ttl(InMemoryBackend::new(), 10)),
        );
        let tenant = sample_tenant();
        registry.register(tenant.clone(), "mac-secret").await.unwrap();
        registry.deactivate(tenant.id).await.unwrap();
        assert!(registry.get(tenant.id).is_none());
    }
}
