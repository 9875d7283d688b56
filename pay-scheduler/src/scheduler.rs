//! `ProcessDueBilling` (§4.8).

use std::sync::Arc;

use chrono::NaiveDate;
use pay_common::{ids::SubscriptionId, PayError};
use pay_engine::transaction_engine::{ChargeRequest, TransactionEngine};
use pay_gateway::credential_registry::MerchantStore;
use pay_secrets::SecretBackend;
use pay_store::{
    subscription_store::{Subscription, SubscriptionStatus},
    transaction_store::TransactionStatus,
    SubscriptionStore,
};
use tracing::{info, warn};

/// What happens to a subscription once it has exhausted `max_retries` on a
/// retriable failure. Not pinned to one value by the source; exposed as a
/// scheduler-wide configuration choice since §4.8 describes all three as
/// valid policies without naming which is default.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FailurePolicy {
    Forward,
    Skip,
    Pause,
}

#[derive(Clone, Debug, Default)]
pub struct BillingOutcome {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(SubscriptionId, String)>,
}

pub struct SubscriptionScheduler<M: MerchantStore, S: SecretBackend> {
    subscriptions: Arc<SubscriptionStore>,
    engine: Arc<TransactionEngine<M, S>>,
    failure_policy: FailurePolicy,
}

impl<M: MerchantStore, S: SecretBackend> SubscriptionScheduler<M, S> {
    pub fn new(
        subscriptions: Arc<SubscriptionStore>,
        engine: Arc<TransactionEngine<M, S>>,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self { subscriptions, engine, failure_policy }
    }

    /// Process every subscription due on or before `as_of`, up to
    /// `batch_size` at a time, charging each via the Transaction Engine.
    pub async fn process_due_billing(
        &self,
        as_of: NaiveDate,
        batch_size: i64,
    ) -> Result<BillingOutcome, PayError> {
        let due = self.subscriptions.list_due(as_of, batch_size).await?;
        let mut outcome = BillingOutcome::default();

        for subscription in due {
            outcome.processed += 1;
            match self.charge_one(&subscription).await {
                Ok(true) => outcome.succeeded += 1,
                Ok(false) => outcome.failed += 1,
                Err(e) => {
                    outcome.failed += 1;
                    outcome.errors.push((subscription.id, e.to_string()));
                }
            }
        }

        info!(
            processed = outcome.processed,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "process_due_billing complete"
        );
        Ok(outcome)
    }

    /// Returns `Ok(true)` on an approved charge, `Ok(false)` on a handled
    /// failure (decline, retriable error under the limit, or policy
    /// applied), and `Err` only for an unexpected store-layer error.
    async fn charge_one(&self, subscription: &Subscription) -> Result<bool, PayError> {
        let idempotency_key = format!(
            "sub-{}-{}",
            subscription.id,
            subscription.next_billing_date.format("%Y-%m-%d")
        );
        let req = ChargeRequest {
            tenant_id: subscription.tenant_id,
            idempotency_key,
            customer_id: Some(subscription.customer_id),
            amount: subscription.amount,
            currency: subscription.currency.clone(),
            payment_method_type: "SUBSCRIPTION".to_string(),
            payment_method_id: Some(subscription.payment_method_id.as_uuid()),
            subscription_id: Some(subscription.id.as_uuid()),
            bric: String::new(),
            metadata: serde_json::json!({ "subscription_id": subscription.id }),
        };

        match self.engine.sale(req).await {
            Ok(tx) if tx.status() == TransactionStatus::Approved => {
                let next = subscription.interval.advance(subscription.next_billing_date);
                self.subscriptions
                    .record_success_and_advance(subscription.id, next)
                    .await?;
                Ok(true)
            }
            // A clean decline is a retriable business outcome (insufficient
            // funds, etc.), distinct from the non-retriable payment-method
            // failures called out in §4.8.
            Ok(_declined) => {
                self.handle_retriable_failure(subscription).await?;
                Ok(false)
            }
            Err(e) if e.is_retriable() => {
                self.handle_retriable_failure(subscription).await?;
                Ok(false)
            }
            Err(e) => {
                warn!(subscription_id = %subscription.id, error = %e, "non-retriable billing failure");
                self.subscriptions.mark_past_due(subscription.id).await?;
                Ok(false)
            }
        }
    }

    async fn handle_retriable_failure(&self, subscription: &Subscription) -> Result<(), PayError> {
        let retry_count = self.subscriptions.record_retriable_failure(subscription.id).await?;
        if retry_count < subscription.max_retries {
            return Ok(());
        }
        match self.failure_policy {
            FailurePolicy::Forward | FailurePolicy::Skip => {
                let next = subscription.interval.advance(subscription.next_billing_date);
                self.subscriptions
                    .forward_past_failed_period(subscription.id, next)
                    .await?;
            }
            FailurePolicy::Pause => {
                self.subscriptions.pause(subscription.id).await?;
            }
        }
        Ok(())
    }
}

/// Whether a subscription's status still admits billing attempts. Exposed
/// for callers building their own selection on top of `list_due`, which
/// already filters to `active` in SQL.
pub fn is_billable(status: SubscriptionStatus) -> bool {
    matches!(status, SubscriptionStatus::Active)
}
