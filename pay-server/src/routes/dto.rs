//! Wire DTOs for the `/api/v1` surface (§4.11). The domain types in
//! `pay-store`/`pay-engine` are deliberately not `Serialize` (they carry no
//! opinion about a wire shape); these thin wrappers are that opinion.

use chrono::{DateTime, NaiveDate, Utc};
use pay_common::{Money, TenantId};
use pay_store::{payment_method_store::PaymentMethod, subscription_store::Subscription, transaction_store::Transaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub tran_type: String,
    pub status: String,
    pub payment_method_type: String,
    pub payment_method_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub tran_nbr: Option<String>,
    pub auth_resp: Option<String>,
    pub auth_resp_text: Option<String>,
    pub parent_transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.as_uuid(),
            tenant_id: tx.tenant_id.as_uuid(),
            customer_id: tx.customer_id,
            amount: tx.amount.minor_units(),
            currency: tx.currency.clone(),
            tran_type: format!("{:?}", tx.tran_type),
            status: format!("{:?}", tx.status()),
            payment_method_type: tx.payment_method_type.clone(),
            payment_method_id: tx.payment_method_id,
            subscription_id: tx.subscription_id,
            tran_nbr: tx.tran_nbr.clone(),
            auth_resp: tx.auth_resp.clone(),
            auth_resp_text: tx.auth_resp_text.clone(),
            parent_transaction_id: tx.parent_transaction_id.map(|id| id.as_uuid()),
            created_at: tx.created_at,
            processed_at: tx.processed_at,
        }
    }
}

#[derive(Serialize)]
pub struct PaymentMethodResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub pm_type: String,
    pub masked_last_four: String,
    pub brand_or_bank_name: Option<String>,
    pub exp_month: Option<i16>,
    pub exp_year: Option<i16>,
    pub is_default: bool,
    pub is_active: bool,
    pub is_verified: bool,
    pub verification_status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&PaymentMethod> for PaymentMethodResponse {
    fn from(pm: &PaymentMethod) -> Self {
        Self {
            id: pm.id.as_uuid(),
            tenant_id: pm.tenant_id.as_uuid(),
            customer_id: pm.customer_id,
            pm_type: format!("{:?}", pm.pm_type),
            masked_last_four: pm.masked_last_four.clone(),
            brand_or_bank_name: pm.brand_or_bank_name.clone(),
            exp_month: pm.exp_month,
            exp_year: pm.exp_year,
            is_default: pm.is_default,
            is_active: pm.is_active,
            is_verified: pm.is_verified,
            verification_status: format!("{:?}", pm.verification_status),
            created_at: pm.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub interval_value: u32,
    pub interval_unit: String,
    pub status: String,
    pub payment_method_id: Uuid,
    pub next_billing_date: NaiveDate,
    pub failure_retry_count: i32,
    pub max_retries: i32,
}

impl From<&Subscription> for SubscriptionResponse {
    fn from(sub: &Subscription) -> Self {
        Self {
            id: sub.id.as_uuid(),
            tenant_id: sub.tenant_id.as_uuid(),
            customer_id: sub.customer_id,
            amount: sub.amount.minor_units(),
            currency: sub.currency.clone(),
            interval_value: sub.interval.value,
            interval_unit: format!("{:?}", sub.interval.unit),
            status: format!("{:?}", sub.status),
            payment_method_id: sub.payment_method_id.as_uuid(),
            next_billing_date: sub.next_billing_date,
            failure_retry_count: sub.failure_retry_count,
            max_retries: sub.max_retries,
        }
    }
}

/// A caller-supplied minor-units amount, deserialized straight into
/// [`Money`] via `Money::from_minor_units` at the extraction boundary.
pub fn money_from_minor_units(minor_units: i64) -> Result<Money, pay_common::PayError> {
    Money::from_minor_units(minor_units)
        .map_err(|e| pay_common::PayError::invalid_input(e.to_string()))
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Helper the route handlers use to tie a caller-specified `tenant_id` in a
/// request body to the tenant the bearer JWT grants access to (§4.9):
/// services only ever act within their own grant's tenant.
pub fn authorized_tenant(claimed: TenantId, body_tenant: Uuid) -> Result<TenantId, pay_common::PayError> {
    if claimed.as_uuid() != body_tenant {
        return Err(pay_common::PayError::Forbidden(
            "tenant_id does not match the authenticated grant".to_string(),
        ));
    }
    Ok(claimed)
}
