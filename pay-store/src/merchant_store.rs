//! sqlx-backed implementation of [`pay_gateway::credential_registry::MerchantStore`]
//! over the `merchants` table.

use async_trait::async_trait;
use pay_common::{PayError, TenantId};
use pay_gateway::credential_registry::{Environment, MerchantStore, Tenant};
use sqlx::{postgres::PgRow, PgPool, Row};

fn environment_from_text(s: &str) -> Result<Environment, PayError> {
    match s {
        "sandbox" => Ok(Environment::Sandbox),
        "production" => Ok(Environment::Production),
        other => Err(PayError::internal(format!("unknown environment: {other}"))),
    }
}

fn environment_to_text(env: Environment) -> &'static str {
    match env {
        Environment::Sandbox => "sandbox",
        Environment::Production => "production",
    }
}

fn tenant_from_row(row: &PgRow) -> Result<Tenant, PayError> {
    let map_err = |e: sqlx::Error| PayError::internal(format!("row decode: {e}"));
    let environment: String = row.try_get("environment").map_err(map_err)?;
    Ok(Tenant {
        id: TenantId::from_uuid(row.try_get("id").map_err(map_err)?),
        slug: row.try_get("slug").map_err(map_err)?,
        cust_nbr: row.try_get("cust_nbr").map_err(map_err)?,
        merch_nbr: row.try_get("merch_nbr").map_err(map_err)?,
        dba_nbr: row.try_get("dba_nbr").map_err(map_err)?,
        terminal_nbr: row.try_get("terminal_nbr").map_err(map_err)?,
        environment: environment_from_text(&environment)?,
        mac_secret_path: row.try_get("mac_secret_path").map_err(map_err)?,
        active: row.try_get("is_active").map_err(map_err)?,
    })
}

pub struct SqlxMerchantStore {
    pool: PgPool,
}

impl SqlxMerchantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MerchantStore for SqlxMerchantStore {
    async fn list_active_tenants(&self) -> Result<Vec<Tenant>, PayError> {
        let rows = sqlx::query(
            "SELECT id, slug, cust_nbr, merch_nbr, dba_nbr, terminal_nbr, environment, \
             mac_secret_path, is_active FROM merchants WHERE is_active",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("list active tenants: {e}")))?;
        rows.iter().map(tenant_from_row).collect()
    }

    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), PayError> {
        sqlx::query(
            "INSERT INTO merchants (id, slug, cust_nbr, merch_nbr, dba_nbr, terminal_nbr, \
             environment, mac_secret_path, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET \
             slug = EXCLUDED.slug, cust_nbr = EXCLUDED.cust_nbr, merch_nbr = EXCLUDED.merch_nbr, \
             dba_nbr = EXCLUDED.dba_nbr, terminal_nbr = EXCLUDED.terminal_nbr, \
             environment = EXCLUDED.environment, mac_secret_path = EXCLUDED.mac_secret_path, \
             is_active = EXCLUDED.is_active, updated_at = now()",
        )
        .bind(tenant.id.as_uuid())
        .bind(&tenant.slug)
        .bind(&tenant.cust_nbr)
        .bind(&tenant.merch_nbr)
        .bind(&tenant.dba_nbr)
        .bind(&tenant.terminal_nbr)
        .bind(environment_to_text(tenant.environment))
        .bind(&tenant.mac_secret_path)
        .bind(tenant.active)
        .execute(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("upsert tenant: {e}")))?;
        Ok(())
    }

    async fn set_active(&self, tenant_id: TenantId, active: bool) -> Result<(), PayError> {
        sqlx::query("UPDATE merchants SET is_active = $2, updated_at = now() WHERE id = $1")
            .bind(tenant_id.as_uuid())
            .bind(active)
            .execute(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("set active: {e}")))?;
        Ok(())
    }
}
