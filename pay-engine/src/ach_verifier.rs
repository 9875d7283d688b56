//! ACH Verifier (§4.6): promotes pending ACH payment methods once their
//! pre-note has aged past the business-day cutoff with no return, and
//! processes returns posted against either a pre-note or a normal debit.

use pay_common::{business_days, ids::PaymentMethodId, PayError};
use pay_store::{
    payment_method_store::VerificationStatus, transaction_store::Transaction, PaymentMethodStore,
};
use tracing::{info, warn};

/// Business days a pre-note must age with no return before promotion,
/// absent a configured override (§4.6 default).
pub const DEFAULT_PRENOTE_HOLD_BUSINESS_DAYS: u32 = 3;

/// Return count at which a payment method is deactivated for excessive
/// returns on normal ACH debits. Not named explicitly in the source; chosen
/// in line with card-network excessive-return thresholds of the same order.
pub const EXCESSIVE_RETURNS_THRESHOLD: i32 = 3;

pub struct AchVerifier {
    payment_methods: std::sync::Arc<PaymentMethodStore>,
    prenote_hold_business_days: u32,
}

impl AchVerifier {
    pub fn new(payment_methods: std::sync::Arc<PaymentMethodStore>) -> Self {
        Self {
            payment_methods,
            prenote_hold_business_days: DEFAULT_PRENOTE_HOLD_BUSINESS_DAYS,
        }
    }

    pub fn with_hold_business_days(
        payment_methods: std::sync::Arc<PaymentMethodStore>,
        prenote_hold_business_days: u32,
    ) -> Self {
        Self { payment_methods, prenote_hold_business_days }
    }

    /// Periodic sweep: promote pending ACH payment methods whose pre-note
    /// was submitted at least `prenote_hold_business_days` ago with no
    /// return posted. Returns the number promoted.
    ///
    /// The store's query filters by the minimum possible calendar-day
    /// cutoff (`n` business days can never elapse in fewer than `n`
    /// calendar days), so it's guaranteed to over-include; `business_days_elapsed`
    /// then applies the precise business-day rule per row before promoting.
    pub async fn run_promotion_sweep(&self, now: chrono::DateTime<chrono::Utc>) -> Result<usize, PayError> {
        let cutoff = now - chrono::Duration::days(i64::from(self.prenote_hold_business_days));

        let candidates = self.payment_methods.list_pending_prenotes_older_than(cutoff).await?;
        let mut promoted = 0;
        for pm in candidates {
            if !business_days::business_days_elapsed(
                pm.created_at.date_naive(),
                now.date_naive(),
                self.prenote_hold_business_days,
            ) {
                continue;
            }
            self.payment_methods
                .update_status(pm.id, VerificationStatus::Verified, true, true, None)
                .await?;
            promoted += 1;
        }
        if promoted > 0 {
            info!(promoted, "ach prenote promotion sweep completed");
        }
        Ok(promoted)
    }

    /// Process a return posted against `prenote_transaction_id` or a normal
    /// ACH debit's parent id, identified by parent `tran_nbr` on the
    /// returned transaction (§4.6).
    pub async fn process_return(
        &self,
        pm_id: PaymentMethodId,
        returned_transaction: &Transaction,
    ) -> Result<(), PayError> {
        let pm = self
            .payment_methods
            .get(pm_id)
            .await?
            .ok_or_else(|| PayError::not_found(format!("payment method {pm_id}")))?;

        let is_return_on_prenote = pm.prenote_transaction_id == returned_transaction.parent_transaction_id;
        if is_return_on_prenote {
            warn!(%pm_id, "ach prenote returned, marking payment method failed");
            self.payment_methods
                .update_status(
                    pm_id,
                    VerificationStatus::Failed,
                    false,
                    false,
                    Some("prenote_returned"),
                )
                .await?;
            return Ok(());
        }

        let return_count = self.payment_methods.increment_return_count(pm_id).await?;
        if return_count >= EXCESSIVE_RETURNS_THRESHOLD {
            warn!(%pm_id, return_count, "ach payment method deactivated for excessive returns");
            self.payment_methods
                .update_status(
                    pm_id,
                    pm.verification_status,
                    false,
                    pm.is_verified,
                    Some("excessive_returns"),
                )
                .await?;
        }
        Ok(())
    }
}
