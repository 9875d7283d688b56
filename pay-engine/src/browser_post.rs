//! Browser-Post Coordinator (§4.7): TAC issuance for the hosted card-entry
//! redirect flow, and idempotent reconciliation of the asynchronous
//! callback the gateway posts once the browser submits the form.

use std::net::IpAddr;

use pay_common::{ids::derive_tran_nbr, Money, PayError, TenantId, TransactionId};
use pay_gateway::{
    credential_registry::MerchantStore,
    wire::{RequestEnvelope, TranCode},
    CredentialRegistry, GatewayAdapter,
};
use pay_secrets::{SecretBackend, SecretResolver};
use pay_store::transaction_store::{InsertOutcome, NewTransaction, TranType, Transaction, TransactionStore};
use serde_json::Value as Json;
use std::sync::Arc;

pub struct GenerateFormRequest {
    pub tenant_id: TenantId,
    pub idempotency_key: String,
    pub customer_id: Option<uuid::Uuid>,
    pub amount: Money,
    pub currency: String,
    pub tran_type: TranType,
    pub return_url: String,
}

pub struct BrowserPostCoordinator<M: MerchantStore, S: SecretBackend> {
    store: Arc<TransactionStore>,
    gateway: Arc<GatewayAdapter>,
    registry: Arc<CredentialRegistry<M, S>>,
    secrets: Arc<SecretResolver<S>>,
}

impl<M: MerchantStore, S: SecretBackend> BrowserPostCoordinator<M, S> {
    pub fn new(
        store: Arc<TransactionStore>,
        gateway: Arc<GatewayAdapter>,
        registry: Arc<CredentialRegistry<M, S>>,
        secrets: Arc<SecretResolver<S>>,
    ) -> Self {
        Self { store, gateway, registry, secrets }
    }

    /// Pre-insert a pending transaction row with a deterministic `tran_nbr`,
    /// then exchange it for a TAC the browser will use to post directly to
    /// the gateway.
    pub async fn generate_form(
        &self,
        req: GenerateFormRequest,
    ) -> Result<pay_gateway::gateway_adapter::FormDescriptor, PayError> {
        let tenant = self
            .registry
            .get(req.tenant_id)
            .ok_or_else(|| PayError::not_found(format!("tenant {}", req.tenant_id)))?;
        if !tenant.active {
            return Err(PayError::invalid_state("tenant is not active"));
        }
        let mac_secret = self.secrets.get(&tenant.mac_secret_path).await?;

        let id = pay_common::ids::derive_idempotent_transaction_id(
            req.tenant_id,
            &req.idempotency_key,
        );
        let tran_nbr = derive_tran_nbr(id);

        let new_tx = NewTransaction {
            id,
            tenant_id: req.tenant_id,
            customer_id: req.customer_id,
            amount: req.amount,
            currency: req.currency,
            tran_type: req.tran_type,
            payment_method_type: "CARD".to_string(),
            payment_method_id: None,
            subscription_id: None,
            tran_nbr: Some(tran_nbr.clone()),
            metadata: Json::Null,
            parent_transaction_id: None,
            idempotency_fingerprint: format!("browser-post:{}", req.idempotency_key),
        };
        // A repeated call with the same idempotency key reuses the existing
        // pending row rather than issuing a second TAC for it.
        self.store.insert_idempotent(new_tx).await?;

        let tran_code = match req.tran_type {
            TranType::Sale => TranCode::CardSale,
            TranType::Auth => TranCode::CardAuth,
            other => {
                return Err(PayError::invalid_input(format!(
                    "{other:?} is not a valid browser-post transaction type"
                )))
            }
        };
        let envelope = RequestEnvelope {
            cust_nbr: tenant.cust_nbr.clone(),
            merch_nbr: tenant.merch_nbr.clone(),
            dba_nbr: tenant.dba_nbr.clone(),
            terminal_nbr: tenant.terminal_nbr.clone(),
            tran_code,
            tran_nbr: tran_nbr.clone(),
            amount: req.amount,
            bric: None,
            parent_tran_nbr: None,
            redirect_url: Some(req.return_url),
            user_data: [None, None, None],
        };
        self.gateway.exchange_key_for_tac(&tenant, &mac_secret, envelope).await
    }

    /// Authenticate and reconcile an asynchronous callback. The caller has
    /// already established the source IP and/or `X-EPX-Signature` header
    /// checked out per §6; this only applies the idempotent `UPDATE ...
    /// WHERE tran_nbr = ?`.
    pub async fn reconcile_callback(&self, form_body: &str) -> Result<Transaction, PayError> {
        let response = self.gateway.parse_callback(form_body)?;
        let existing = self
            .store
            .get_by_tran_nbr(&response.tran_nbr)
            .await?
            .ok_or_else(|| PayError::not_found(format!("transaction with tran_nbr {}", response.tran_nbr)))?;

        self.store
            .write_gateway_response(
                existing.id,
                &response.auth_resp,
                response.auth_guid.as_deref(),
                response.auth_code.as_deref(),
                response.auth_card_type.as_deref(),
                response.auth_resp_text.as_deref(),
            )
            .await
    }

    /// Whether `source_ip` is allowed to post a callback without a valid
    /// HMAC signature: only the non-production private/loopback bypass
    /// named in §6 and gated per-tenant by [`Environment::allows_private_ip_bypass`].
    pub fn allows_unsigned_callback(
        &self,
        tenant_id: TenantId,
        source_ip: IpAddr,
    ) -> bool {
        let Some(tenant) = self.registry.get(tenant_id) else {
            return false;
        };
        tenant.environment.allows_private_ip_bypass() && is_private_or_loopback(source_ip)
    }
}

fn is_private_or_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn private_and_loopback_ipv4_are_recognized() {
        assert!(is_private_or_loopback("127.0.0.1".parse().unwrap()));
        assert!(is_private_or_loopback("10.0.0.5".parse().unwrap()));
        assert!(!is_private_or_loopback("8.8.8.8".parse().unwrap()));
    }
}
