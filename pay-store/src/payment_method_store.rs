//! Payment-Method Store (§4.5): tokens and metadata, an LRU cache shadowing
//! recent reads, and the two operations that reach out to the gateway
//! (`ConvertFinancialToStorage`, `StoreACH`).

use chrono::{DateTime, Utc};
use pay_common::{ids::PaymentMethodId, Money, PayError, TenantId, TransactionId};
use pay_gateway::{
    credential_registry::Tenant,
    wire::{RequestEnvelope, TranCode},
    GatewayAdapter,
};
use quick_cache::sync::Cache;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::transaction_store::{NewTransaction, TranType, TransactionStore};

#[derive(Copy, Clone, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum PmType {
    Card,
    Ach,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Failed,
}

#[derive(Clone, Debug)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub tenant_id: TenantId,
    pub customer_id: Uuid,
    pub pm_type: PmType,
    pub storage_token: String,
    pub masked_last_four: String,
    pub brand_or_bank_name: Option<String>,
    pub exp_month: Option<i16>,
    pub exp_year: Option<i16>,
    pub account_type: Option<String>,
    pub is_default: bool,
    pub is_active: bool,
    pub is_verified: bool,
    pub verification_status: VerificationStatus,
    pub return_count: i32,
    pub deactivation_reason: Option<String>,
    pub prenote_transaction_id: Option<TransactionId>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = "id, tenant_id, customer_id, pm_type, storage_token, \
    masked_last_four, brand_or_bank_name, exp_month, exp_year, account_type, is_default, \
    is_active, is_verified, verification_status, return_count, deactivation_reason, \
    prenote_transaction_id, deleted_at, created_at, updated_at";

impl PaymentMethod {
    fn from_row(row: &PgRow) -> Result<Self, PayError> {
        let map_err = |e: sqlx::Error| PayError::internal(format!("row decode: {e}"));
        Ok(Self {
            id: PaymentMethodId::from_uuid(row.try_get("id").map_err(map_err)?),
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(map_err)?),
            customer_id: row.try_get("customer_id").map_err(map_err)?,
            pm_type: row.try_get("pm_type").map_err(map_err)?,
            storage_token: row.try_get("storage_token").map_err(map_err)?,
            masked_last_four: row.try_get("masked_last_four").map_err(map_err)?,
            brand_or_bank_name: row.try_get("brand_or_bank_name").map_err(map_err)?,
            exp_month: row.try_get("exp_month").map_err(map_err)?,
            exp_year: row.try_get("exp_year").map_err(map_err)?,
            account_type: row.try_get("account_type").map_err(map_err)?,
            is_default: row.try_get("is_default").map_err(map_err)?,
            is_active: row.try_get("is_active").map_err(map_err)?,
            is_verified: row.try_get("is_verified").map_err(map_err)?,
            verification_status: row.try_get("verification_status").map_err(map_err)?,
            return_count: row.try_get("return_count").map_err(map_err)?,
            deactivation_reason: row.try_get("deactivation_reason").map_err(map_err)?,
            prenote_transaction_id: row
                .try_get::<Option<Uuid>, _>("prenote_transaction_id")
                .map_err(map_err)?
                .map(TransactionId::from_uuid),
            deleted_at: row.try_get("deleted_at").map_err(map_err)?,
            created_at: row.try_get("created_at").map_err(map_err)?,
            updated_at: row.try_get("updated_at").map_err(map_err)?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct NewPaymentMethod {
    pub id: PaymentMethodId,
    pub tenant_id: TenantId,
    pub customer_id: Uuid,
    pub pm_type: PmType,
    pub storage_token: String,
    pub masked_last_four: String,
    pub brand_or_bank_name: Option<String>,
    pub exp_month: Option<i16>,
    pub exp_year: Option<i16>,
    pub account_type: Option<String>,
    pub is_verified: bool,
    pub verification_status: VerificationStatus,
}

/// Default LRU capacity and TTL for the payment-method cache (§4.5); no
/// value is named in the source so these mirror the secret resolver's
/// defaults as a reasonable choice for a similarly-shaped hot-path cache.
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

pub struct PaymentMethodStore {
    pool: PgPool,
    cache: Cache<Uuid, PaymentMethod>,
}

impl PaymentMethodStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, cache: Cache::new(DEFAULT_CACHE_CAPACITY) }
    }

    pub async fn save(&self, new: NewPaymentMethod) -> Result<PaymentMethod, PayError> {
        let query = format!(
            "INSERT INTO customer_payment_methods (id, tenant_id, customer_id, pm_type, \
             storage_token, masked_last_four, brand_or_bank_name, exp_month, exp_year, \
             account_type, is_verified, verification_status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {SELECT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(new.id.as_uuid())
            .bind(new.tenant_id.as_uuid())
            .bind(new.customer_id)
            .bind(new.pm_type)
            .bind(&new.storage_token)
            .bind(&new.masked_last_four)
            .bind(&new.brand_or_bank_name)
            .bind(new.exp_month)
            .bind(new.exp_year)
            .bind(&new.account_type)
            .bind(new.is_verified)
            .bind(new.verification_status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("save payment method: {e}")))?;
        let pm = PaymentMethod::from_row(&row)?;
        self.cache.insert(pm.id.as_uuid(), pm.clone());
        Ok(pm)
    }

    pub async fn get(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>, PayError> {
        if let Some(pm) = self.cache.get(&id.as_uuid()) {
            return Ok(Some(pm));
        }
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM customer_payment_methods WHERE id = $1 \
             AND deleted_at IS NULL"
        );
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("get payment method: {e}")))?;
        match row.as_ref().map(PaymentMethod::from_row).transpose()? {
            Some(pm) => {
                self.cache.insert(pm.id.as_uuid(), pm.clone());
                Ok(Some(pm))
            }
            None => Ok(None),
        }
    }

    pub async fn list(
        &self,
        tenant_id: TenantId,
        customer_id: Uuid,
    ) -> Result<Vec<PaymentMethod>, PayError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM customer_payment_methods \
             WHERE tenant_id = $1 AND customer_id = $2 AND deleted_at IS NULL \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(tenant_id.as_uuid())
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("list payment methods: {e}")))?;
        rows.iter().map(PaymentMethod::from_row).collect()
    }

    /// Clear every sibling's default flag and set it on `pm_id`, atomically
    /// (§4.5 default invariant).
    pub async fn set_default(
        &self,
        tenant_id: TenantId,
        customer_id: Uuid,
        pm_id: PaymentMethodId,
    ) -> Result<(), PayError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PayError::internal(format!("begin tx: {e}")))?;

        sqlx::query(
            "UPDATE customer_payment_methods SET is_default = FALSE, updated_at = now() \
             WHERE tenant_id = $1 AND customer_id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(customer_id)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| PayError::internal(format!("clear defaults: {e}")))?;

        let updated = sqlx::query(
            "UPDATE customer_payment_methods SET is_default = TRUE, updated_at = now() \
             WHERE id = $1 AND tenant_id = $2 AND customer_id = $3 AND deleted_at IS NULL",
        )
        .bind(pm_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(customer_id)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| PayError::internal(format!("set default: {e}")))?;

        if updated.rows_affected() == 0 {
            return Err(PayError::not_found(format!("payment method {pm_id}")));
        }

        db_tx
            .commit()
            .await
            .map_err(|e| PayError::internal(format!("commit tx: {e}")))?;
        self.invalidate_customer(tenant_id, customer_id).await?;
        Ok(())
    }

    pub async fn delete(&self, id: PaymentMethodId) -> Result<(), PayError> {
        sqlx::query(
            "UPDATE customer_payment_methods SET deleted_at = now(), updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("soft delete: {e}")))?;
        self.cache.remove(&id.as_uuid());
        Ok(())
    }

    pub async fn update_status(
        &self,
        id: PaymentMethodId,
        verification_status: VerificationStatus,
        is_active: bool,
        is_verified: bool,
        deactivation_reason: Option<&str>,
    ) -> Result<(), PayError> {
        sqlx::query(
            "UPDATE customer_payment_methods SET verification_status = $2, is_active = $3, \
             is_verified = $4, deactivation_reason = $5, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(verification_status)
        .bind(is_active)
        .bind(is_verified)
        .bind(deactivation_reason)
        .execute(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("update status: {e}")))?;
        self.cache.remove(&id.as_uuid());
        Ok(())
    }

    pub async fn increment_return_count(&self, id: PaymentMethodId) -> Result<i32, PayError> {
        let row = sqlx::query(
            "UPDATE customer_payment_methods SET return_count = return_count + 1, \
             updated_at = now() WHERE id = $1 RETURNING return_count",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("increment return count: {e}")))?;
        self.cache.remove(&id.as_uuid());
        row.try_get("return_count")
            .map_err(|e| PayError::internal(format!("increment return count decode: {e}")))
    }

    /// Pending payment methods whose pre-note is older than the cutoff date
    /// and still unverified (§4.6 periodic promotion sweep).
    pub async fn list_pending_prenotes_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PaymentMethod>, PayError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM customer_payment_methods \
             WHERE verification_status = 'pending' AND pm_type = 'ACH' \
             AND created_at <= $1 AND deleted_at IS NULL"
        );
        let rows = sqlx::query(&query)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("list pending prenotes: {e}")))?;
        rows.iter().map(PaymentMethod::from_row).collect()
    }

    async fn invalidate_customer(&self, tenant_id: TenantId, customer_id: Uuid) -> Result<(), PayError> {
        for pm in self.list(tenant_id, customer_id).await? {
            self.cache.remove(&pm.id.as_uuid());
        }
        Ok(())
    }

    /// Convert a financial BRIC from a completed transaction into a
    /// long-lived storage token (§4.5). Requires AVS address + zip per the
    /// resolved Open Question; rejects requests missing either.
    pub async fn convert_financial_to_storage(
        &self,
        gateway: &GatewayAdapter,
        tenant: &Tenant,
        mac_secret: &str,
        new: NewPaymentMethod,
        financial_bric: &str,
        avs_address: Option<&str>,
        avs_zip: Option<&str>,
    ) -> Result<PaymentMethod, PayError> {
        if avs_address.is_none() || avs_zip.is_none() {
            return Err(PayError::invalid_input(
                "avs address and zip are both required to convert a financial BRIC",
            ));
        }
        let tran_code = match new.pm_type {
            PmType::Card => TranCode::CardStorageConversion,
            PmType::Ach => TranCode::AchStorageConversion,
        };
        let envelope = RequestEnvelope {
            cust_nbr: tenant.cust_nbr.clone(),
            merch_nbr: tenant.merch_nbr.clone(),
            dba_nbr: tenant.dba_nbr.clone(),
            terminal_nbr: tenant.terminal_nbr.clone(),
            tran_code,
            tran_nbr: pay_common::ids::derive_tran_nbr(TransactionId::new_random()),
            amount: Money::ZERO,
            bric: Some(financial_bric.to_string()),
            parent_tran_nbr: None,
            redirect_url: None,
            user_data: [None, None, None],
        };
        let response = gateway
            .submit_server_post(tenant, mac_secret, envelope)
            .await?;
        if !response.is_approved() {
            return Err(PayError::GatewayDecline {
                resp_code: response.auth_resp,
                resp_text: response.auth_resp_text.unwrap_or_default(),
            });
        }
        let storage_token = response
            .auth_guid
            .ok_or_else(|| PayError::MalformedGatewayResponse("missing storage token".to_string()))?;
        self.save(NewPaymentMethod { storage_token, ..new }).await
    }

    /// Create a payment method row and immediately submit a zero-amount
    /// pre-note ACH verification (§4.6). The resulting PM is
    /// `verification_status = pending` until the sweep promotes it.
    pub async fn store_ach(
        &self,
        transactions: &TransactionStore,
        gateway: &GatewayAdapter,
        tenant: &Tenant,
        mac_secret: &str,
        mut new: NewPaymentMethod,
    ) -> Result<PaymentMethod, PayError> {
        new.pm_type = PmType::Ach;
        new.verification_status = VerificationStatus::Pending;
        new.is_verified = false;
        let pm = self.save(new).await?;

        let prenote_id = TransactionId::new_random();
        let tran_nbr = pay_common::ids::derive_tran_nbr(prenote_id);
        let envelope = RequestEnvelope {
            cust_nbr: tenant.cust_nbr.clone(),
            merch_nbr: tenant.merch_nbr.clone(),
            dba_nbr: tenant.dba_nbr.clone(),
            terminal_nbr: tenant.terminal_nbr.clone(),
            tran_code: TranCode::AchPrenote,
            tran_nbr: tran_nbr.clone(),
            amount: Money::ZERO,
            bric: Some(pm.storage_token.clone()),
            parent_tran_nbr: None,
            redirect_url: None,
            user_data: [None, None, None],
        };
        let response = gateway
            .submit_server_post(tenant, mac_secret, envelope)
            .await?;

        let new_tx = NewTransaction {
            id: prenote_id,
            tenant_id: tenant.id,
            customer_id: Some(pm.customer_id),
            amount: Money::ZERO,
            currency: "USD".to_string(),
            tran_type: TranType::Sale,
            payment_method_type: "ACH".to_string(),
            payment_method_id: Some(pm.id.as_uuid()),
            subscription_id: None,
            tran_nbr: Some(tran_nbr),
            metadata: serde_json::json!({ "purpose": "ach_prenote" }),
            parent_transaction_id: None,
            idempotency_fingerprint: format!("prenote:{}", pm.id),
        };
        transactions.insert_idempotent(new_tx).await?;
        transactions
            .write_gateway_response(
                prenote_id,
                &response.auth_resp,
                response.auth_guid.as_deref(),
                response.auth_code.as_deref(),
                response.auth_card_type.as_deref(),
                response.auth_resp_text.as_deref(),
            )
            .await?;

        sqlx::query(
            "UPDATE customer_payment_methods SET prenote_transaction_id = $2, updated_at = now() \
             WHERE id = $1",
        )
        .bind(pm.id.as_uuid())
        .bind(prenote_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("link prenote: {e}")))?;
        self.cache.remove(&pm.id.as_uuid());

        self.get(pm.id)
            .await?
            .ok_or_else(|| PayError::internal("payment method vanished after store_ach"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn new_card(tenant_id: TenantId, customer_id: Uuid) -> NewPaymentMethod {
        NewPaymentMethod {
            id: PaymentMethodId::new_random(),
            tenant_id,
            customer_id,
            pm_type: PmType::Card,
            storage_token: "BRIC-STORAGE-1".to_string(),
            masked_last_four: "4242".to_string(),
            brand_or_bank_name: Some("visa".to_string()),
            exp_month: Some(12),
            exp_year: Some(2030),
            account_type: None,
            is_verified: true,
            verification_status: VerificationStatus::Verified,
        }
    }

    /// For a given (tenant, customer) at most one payment method has
    /// `is_default = true`, even after repeated `set_default` calls (§8).
    #[sqlx::test(migrations = "./migrations")]
    async fn set_default_is_exclusive_per_customer(pool: PgPool) {
        let store = PaymentMethodStore::new(pool.clone());
        let tenant = sqlx::query("INSERT INTO merchants (id, slug, cust_nbr, merch_nbr, dba_nbr, \
             terminal_nbr, environment, mac_secret_path) VALUES ($1, 'slug', 'c', 'm', 'd', 't', \
             'sandbox', 'path') RETURNING id")
            .bind(Uuid::new_v4())
            .fetch_one(&pool)
            .await
            .unwrap();
        let tenant_id = TenantId::from_uuid(tenant.try_get::<Uuid, _>("id").unwrap());
        let customer_id = Uuid::new_v4();

        let a = store.save(new_card(tenant_id, customer_id)).await.unwrap();
        let b = store.save(new_card(tenant_id, customer_id)).await.unwrap();

        store.set_default(tenant_id, customer_id, a.id).await.unwrap();
        store.set_default(tenant_id, customer_id, b.id).await.unwrap();

        let all = store.list(tenant_id, customer_id).await.unwrap();
        let defaults: Vec<_> = all.iter().filter(|pm| pm.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, b.id);
    }
}
