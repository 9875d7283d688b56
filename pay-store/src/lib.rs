//! Postgres-backed persistence for the core: connection pool/migrations,
//! the Transaction Store, Payment-Method Store, Subscription Store, and the
//! `merchants`-table-backed [`pay_gateway::credential_registry::MerchantStore`]
//! implementation.

pub mod auth_store;
pub mod merchant_store;
pub mod payment_method_store;
pub mod pool;
pub mod subscription_store;
pub mod transaction_store;

pub use auth_store::{AuditLogStore, IpWhitelistStore, SqlxJtiBlacklist, SqlxRateLimitBackend, SqlxServiceRegistry};
pub use merchant_store::SqlxMerchantStore;
pub use payment_method_store::PaymentMethodStore;
pub use subscription_store::SubscriptionStore;
pub use transaction_store::TransactionStore;
