//! Sqlx-backed production implementations of the Auth Plane's persistence
//! traits (§4.9): the `services`/`service_merchants` tables behind
//! [`ServiceRegistry`], `jwt_blacklist` behind [`JtiBlacklist`], and
//! `rate_limit_buckets` behind [`RateLimitBackend`]. Shaped after
//! [`crate::merchant_store::SqlxMerchantStore`]'s row-mapping style.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pay_auth::{
    public_key_store::{Grant, ServiceRecord, ServiceRegistry},
    JtiBlacklist, RateLimitBackend,
};
use pay_common::{ids::TenantId, PayError};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct SqlxServiceRegistry {
    pool: PgPool,
}

impl SqlxServiceRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceRegistry for SqlxServiceRegistry {
    async fn list_active_services(&self) -> Result<Vec<ServiceRecord>, PayError> {
        let rows = sqlx::query(
            "SELECT id, public_key_pem, requests_per_sec FROM services WHERE is_active",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("list active services: {e}")))?;

        rows.iter()
            .map(|row| {
                let map_err = |e: sqlx::Error| PayError::internal(format!("row decode: {e}"));
                Ok(ServiceRecord {
                    id: row.try_get("id").map_err(map_err)?,
                    public_key_pem: row.try_get("public_key_pem").map_err(map_err)?,
                    requests_per_second: {
                        let rps: i32 = row.try_get("requests_per_sec").map_err(map_err)?;
                        rps as u32
                    },
                })
            })
            .collect()
    }

    async fn list_grants(&self) -> Result<Vec<Grant>, PayError> {
        let rows = sqlx::query(
            "SELECT service_id, merchant_id, is_active, expires_at FROM service_merchants",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("list grants: {e}")))?;

        rows.iter()
            .map(|row| {
                let map_err = |e: sqlx::Error| PayError::internal(format!("row decode: {e}"));
                Ok(Grant {
                    service_id: row.try_get("service_id").map_err(map_err)?,
                    tenant_id: TenantId::from_uuid(row.try_get("merchant_id").map_err(map_err)?),
                    active: row.try_get("is_active").map_err(map_err)?,
                    expires_at: row.try_get("expires_at").map_err(map_err)?,
                })
            })
            .collect()
    }
}

pub struct SqlxJtiBlacklist {
    pool: PgPool,
}

impl SqlxJtiBlacklist {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JtiBlacklist for SqlxJtiBlacklist {
    async fn is_blacklisted(&self, jti: &str) -> Result<bool, PayError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM jwt_blacklist WHERE jti = $1) AS exists")
            .bind(jti)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("blacklist lookup: {e}")))?;
        row.try_get("exists")
            .map_err(|e| PayError::internal(format!("blacklist lookup decode: {e}")))
    }

    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), PayError> {
        sqlx::query(
            "INSERT INTO jwt_blacklist (jti, expires_at) VALUES ($1, $2) \
             ON CONFLICT (jti) DO UPDATE SET expires_at = EXCLUDED.expires_at",
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("revoke jti: {e}")))?;
        Ok(())
    }
}

pub struct SqlxRateLimitBackend {
    pool: PgPool,
}

impl SqlxRateLimitBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitBackend for SqlxRateLimitBackend {
    /// A single upsert admits atomically: a fresh key is seeded at
    /// `capacity - 1` and admitted; an existing key is decremented and
    /// returned only if it still had tokens, so an exhausted bucket yields
    /// no row and the caller is denied.
    async fn try_consume(&self, key: &str, capacity: u32) -> Result<bool, PayError> {
        let row = sqlx::query(
            "INSERT INTO rate_limit_buckets (bucket_key, tokens, last_refill) \
             VALUES ($1, $2 - 1, now()) \
             ON CONFLICT (bucket_key) DO UPDATE \
                SET tokens = rate_limit_buckets.tokens - 1 \
                WHERE rate_limit_buckets.tokens > 0 \
             RETURNING tokens",
        )
        .bind(key)
        .bind(capacity as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("rate limit consume: {e}")))?;
        Ok(row.is_some())
    }

    async fn reap_older_than(&self, minute_bucket_cutoff: i64) -> Result<u64, PayError> {
        let result = sqlx::query(
            "DELETE FROM rate_limit_buckets WHERE last_refill < to_timestamp($1 * 60)",
        )
        .bind(minute_bucket_cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("rate limit reap: {e}")))?;
        Ok(result.rows_affected())
    }
}

/// An IP CIDR allowlist gating unsigned Browser-Post callbacks in
/// production (§6). Only exact-IP (/32, /128) and whole-address entries are
/// matched; broader CIDR ranges are left for a future iteration (no caller
/// currently issues them).
pub struct IpWhitelistStore {
    pool: PgPool,
}

impl IpWhitelistStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn is_allowed(&self, tenant_id: TenantId, source_ip: std::net::IpAddr) -> Result<bool, PayError> {
        let candidates = [source_ip.to_string(), format!("{source_ip}/32"), format!("{source_ip}/128")];
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM epx_ip_whitelist WHERE tenant_id = $1 AND ip_cidr = ANY($2)) AS exists",
        )
        .bind(tenant_id.as_uuid())
        .bind(&candidates[..])
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("ip whitelist lookup: {e}")))?;
        row.try_get("exists")
            .map_err(|e| PayError::internal(format!("ip whitelist lookup decode: {e}")))
    }

    pub async fn allow(&self, tenant_id: TenantId, ip_cidr: &str) -> Result<(), PayError> {
        sqlx::query(
            "INSERT INTO epx_ip_whitelist (tenant_id, ip_cidr) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(tenant_id.as_uuid())
        .bind(ip_cidr)
        .execute(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("ip whitelist insert: {e}")))?;
        Ok(())
    }
}

/// Append-only, best-effort audit trail (§4.10): written from the Worker
/// Pool so a slow or failing write never blocks the originating request.
pub struct AuditLogStore {
    pool: PgPool,
}

impl AuditLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        tenant_id: Option<TenantId>,
        actor_service_id: Option<Uuid>,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        detail_json: serde_json::Value,
    ) -> Result<(), PayError> {
        sqlx::query(
            "INSERT INTO audit_log (tenant_id, actor_service_id, action, entity_type, entity_id, detail_json) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(tenant_id.map(|t| t.as_uuid()))
        .bind(actor_service_id)
        .bind(action)
        .bind(entity_type)
        .bind(entity_id)
        .bind(detail_json)
        .execute(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("audit log insert: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ip_candidates_include_bare_and_slash_32() {
        let ip: std::net::IpAddr = "203.0.113.7".parse().unwrap();
        assert_eq!(ip.to_string(), "203.0.113.7");
    }
}
