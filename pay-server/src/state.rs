//! Shared router state: every stateless-construction dependency the
//! handlers need, wired once at startup in `main` and cloned (as `Arc`s)
//! into each request.

use std::sync::Arc;

use pay_auth::{JwtVerifier, PublicKeyStore, RateLimiter};
use pay_engine::{transaction_engine::TransactionEngine, AchVerifier, BrowserPostCoordinator};
use pay_gateway::{CredentialRegistry, GatewayAdapter};
use pay_secrets::{HttpSecretBackend, SecretResolver};
use pay_store::{
    AuditLogStore, IpWhitelistStore, PaymentMethodStore, SqlxJtiBlacklist, SqlxMerchantStore,
    SqlxRateLimitBackend, SqlxServiceRegistry, SubscriptionStore, TransactionStore,
};
use pay_tokio::worker_pool::WorkerPool;

pub type Engine = TransactionEngine<SqlxMerchantStore, HttpSecretBackend>;
pub type BrowserPost = BrowserPostCoordinator<SqlxMerchantStore, HttpSecretBackend>;
pub type Registry = CredentialRegistry<SqlxMerchantStore, HttpSecretBackend>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub browser_post: Arc<BrowserPost>,
    pub registry: Arc<Registry>,
    pub gateway: Arc<GatewayAdapter>,
    pub transactions: Arc<TransactionStore>,
    pub payment_methods: Arc<PaymentMethodStore>,
    pub subscriptions: Arc<SubscriptionStore>,
    pub ach_verifier: Arc<AchVerifier>,
    pub ip_whitelist: Arc<IpWhitelistStore>,
    pub audit_log: Arc<AuditLogStore>,
    pub worker_pool: Arc<WorkerPool>,
    pub jwt: Arc<JwtVerifier<SqlxServiceRegistry, SqlxJtiBlacklist>>,
    pub public_keys: Arc<PublicKeyStore<SqlxServiceRegistry>>,
    pub rate_limiter: Arc<RateLimiter<SqlxRateLimitBackend>>,
    pub secrets: Arc<Secrets>,
    pub callback_base_url: Arc<str>,
}

pub type Secrets = SecretResolver<HttpSecretBackend>;
