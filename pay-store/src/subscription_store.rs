//! Subscription Store (§4.8 persistence side). The scheduler crate owns the
//! billing-cycle logic; this module is the plain CRUD + due-selection query
//! underneath it.

use chrono::NaiveDate;
use pay_common::{
    billing::{BillingInterval, IntervalUnit},
    ids::{PaymentMethodId, SubscriptionId},
    Money, PayError, TenantId,
};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
    PastDue,
}

#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub tenant_id: TenantId,
    pub customer_id: Uuid,
    pub amount: Money,
    pub currency: String,
    pub interval: BillingInterval,
    pub status: SubscriptionStatus,
    pub payment_method_id: PaymentMethodId,
    pub next_billing_date: NaiveDate,
    pub failure_retry_count: i32,
    pub max_retries: i32,
    pub cancelled_at: Option<chrono::DateTime<chrono::Utc>>,
}

const SELECT_COLUMNS: &str = "id, tenant_id, customer_id, amount_minor_units, currency, \
    interval_value, interval_unit, status, payment_method_id, next_billing_date, \
    failure_retry_count, max_retries, cancelled_at";

fn interval_unit_from_text(s: &str) -> Result<IntervalUnit, PayError> {
    match s {
        "day" => Ok(IntervalUnit::Day),
        "week" => Ok(IntervalUnit::Week),
        "month" => Ok(IntervalUnit::Month),
        "year" => Ok(IntervalUnit::Year),
        other => Err(PayError::internal(format!("unknown interval unit: {other}"))),
    }
}

fn interval_unit_to_text(unit: IntervalUnit) -> &'static str {
    match unit {
        IntervalUnit::Day => "day",
        IntervalUnit::Week => "week",
        IntervalUnit::Month => "month",
        IntervalUnit::Year => "year",
    }
}

impl Subscription {
    fn from_row(row: &PgRow) -> Result<Self, PayError> {
        let map_err = |e: sqlx::Error| PayError::internal(format!("row decode: {e}"));
        let interval_value: i32 = row.try_get("interval_value").map_err(map_err)?;
        let interval_unit: String = row.try_get("interval_unit").map_err(map_err)?;
        Ok(Self {
            id: SubscriptionId::from_uuid(row.try_get("id").map_err(map_err)?),
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(map_err)?),
            customer_id: row.try_get("customer_id").map_err(map_err)?,
            amount: Money::from_minor_units(row.try_get("amount_minor_units").map_err(map_err)?)
                .map_err(|e| PayError::internal(e.to_string()))?,
            currency: row.try_get("currency").map_err(map_err)?,
            interval: BillingInterval::new(
                interval_value as u32,
                interval_unit_from_text(&interval_unit)?,
            ),
            status: row.try_get("status").map_err(map_err)?,
            payment_method_id: PaymentMethodId::from_uuid(
                row.try_get("payment_method_id").map_err(map_err)?,
            ),
            next_billing_date: row.try_get("next_billing_date").map_err(map_err)?,
            failure_retry_count: row.try_get("failure_retry_count").map_err(map_err)?,
            max_retries: row.try_get("max_retries").map_err(map_err)?,
            cancelled_at: row.try_get("cancelled_at").map_err(map_err)?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct NewSubscription {
    pub id: SubscriptionId,
    pub tenant_id: TenantId,
    pub customer_id: Uuid,
    pub amount: Money,
    pub currency: String,
    pub interval: BillingInterval,
    pub payment_method_id: PaymentMethodId,
    pub next_billing_date: NaiveDate,
    pub max_retries: i32,
}

pub struct SubscriptionStore {
    pool: PgPool,
}

impl SubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewSubscription) -> Result<Subscription, PayError> {
        let query = format!(
            "INSERT INTO subscriptions (id, tenant_id, customer_id, amount_minor_units, \
             currency, interval_value, interval_unit, status, payment_method_id, \
             next_billing_date, max_retries) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8, $9, $10) \
             RETURNING {SELECT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(new.id.as_uuid())
            .bind(new.tenant_id.as_uuid())
            .bind(new.customer_id)
            .bind(new.amount.minor_units())
            .bind(&new.currency)
            .bind(new.interval.value as i32)
            .bind(interval_unit_to_text(new.interval.unit))
            .bind(new.payment_method_id.as_uuid())
            .bind(new.next_billing_date)
            .bind(new.max_retries)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("create subscription: {e}")))?;
        Subscription::from_row(&row)
    }

    pub async fn get(&self, id: SubscriptionId) -> Result<Option<Subscription>, PayError> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM subscriptions WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("get subscription: {e}")))?;
        row.as_ref().map(Subscription::from_row).transpose()
    }

    /// Up to `batch_size` active subscriptions due on or before `as_of`,
    /// ordered by due date ascending (§4.8 `ProcessDueBilling` selection).
    pub async fn list_due(
        &self,
        as_of: NaiveDate,
        batch_size: i64,
    ) -> Result<Vec<Subscription>, PayError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM subscriptions \
             WHERE status = 'active' AND next_billing_date <= $1 \
             ORDER BY next_billing_date ASC LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(as_of)
            .bind(batch_size)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("list due subscriptions: {e}")))?;
        rows.iter().map(Subscription::from_row).collect()
    }

    /// Successful-charge path: reset the retry count and advance the
    /// billing date from its *previous* value, never from "now" (§4.8, §8).
    pub async fn record_success_and_advance(
        &self,
        id: SubscriptionId,
        new_next_billing_date: NaiveDate,
    ) -> Result<(), PayError> {
        sqlx::query(
            "UPDATE subscriptions SET failure_retry_count = 0, next_billing_date = $2, \
             updated_at = now() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(new_next_billing_date)
        .execute(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("record success: {e}")))?;
        Ok(())
    }

    /// Retriable-failure path, still under `max_retries`: bump the counter,
    /// leave `next_billing_date` unchanged so the next tick retries.
    pub async fn record_retriable_failure(&self, id: SubscriptionId) -> Result<i32, PayError> {
        let row = sqlx::query(
            "UPDATE subscriptions SET failure_retry_count = failure_retry_count + 1, \
             updated_at = now() WHERE id = $1 RETURNING failure_retry_count",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("record retriable failure: {e}")))?;
        row.try_get("failure_retry_count")
            .map_err(|e| PayError::internal(format!("record retriable failure decode: {e}")))
    }

    /// `max_retries` reached with policy `forward`/`skip`: advance the
    /// period and reset the counter without a successful charge.
    pub async fn forward_past_failed_period(
        &self,
        id: SubscriptionId,
        new_next_billing_date: NaiveDate,
    ) -> Result<(), PayError> {
        self.record_success_and_advance(id, new_next_billing_date).await
    }

    /// `max_retries` reached with policy `pause`.
    pub async fn pause(&self, id: SubscriptionId) -> Result<(), PayError> {
        sqlx::query("UPDATE subscriptions SET status = 'paused', updated_at = now() WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("pause subscription: {e}")))?;
        Ok(())
    }

    /// A non-retriable error (e.g. expired payment method): mark `past_due`
    /// without advancing or retrying, for operator attention.
    pub async fn mark_past_due(&self, id: SubscriptionId) -> Result<(), PayError> {
        sqlx::query(
            "UPDATE subscriptions SET status = 'past_due', updated_at = now() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("mark past due: {e}")))?;
        Ok(())
    }

    pub async fn cancel(&self, id: SubscriptionId) -> Result<(), PayError> {
        sqlx::query(
            "UPDATE subscriptions SET status = 'cancelled', cancelled_at = now(), \
             updated_at = now() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("cancel subscription: {e}")))?;
        Ok(())
    }
}
