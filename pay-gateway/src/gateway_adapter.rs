//! Gateway Adapter (§4.3): submission, key exchange, and callback parsing
//! over HTTP, guarded by a per-tenant [`CircuitBreaker`] and the teacher's
//! bounded backoff iterator for transient transport failures.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use pay_common::{backoff, PayError};
use tracing::{debug, warn};

use crate::{
    breaker::{Admission, CircuitBreaker},
    credential_registry::{Environment, Tenant},
    wire::{GatewayResponse, RequestEnvelope},
};

const SERVER_POST_TIMEOUT: Duration = Duration::from_secs(30);
/// Bounded retries at the transport layer before the circuit breaker records
/// the failure (§4.3 "Retries (ambient)").
const MAX_TRANSPORT_RETRIES: usize = 3;

/// A form descriptor returned by [`GatewayAdapter::exchange_key_for_tac`]
/// for the browser to post directly to the gateway (§4.7).
#[derive(Clone, Debug)]
pub struct FormDescriptor {
    pub tac: String,
    pub cust_nbr: String,
    pub merch_nbr: String,
    pub dba_nbr: String,
    pub terminal_nbr: String,
    pub post_url: String,
    pub tran_nbr: String,
}

pub struct GatewayAdapter {
    client: reqwest::Client,
    sandbox_base_url: String,
    production_base_url: String,
    breakers: Mutex<HashMap<pay_common::TenantId, Arc<CircuitBreaker>>>,
}

impl GatewayAdapter {
    pub fn new(sandbox_base_url: impl Into<String>, production_base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SERVER_POST_TIMEOUT)
            .user_agent("pay-gateway")
            .build()
            .expect("reqwest client config is static and always valid");
        Self {
            client,
            sandbox_base_url: sandbox_base_url.into(),
            production_base_url: production_base_url.into(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    fn base_url(&self, environment: Environment) -> &str {
        match environment {
            Environment::Sandbox => &self.sandbox_base_url,
            Environment::Production => &self.production_base_url,
        }
    }

    fn breaker_for(&self, tenant_id: pay_common::TenantId) -> Arc<CircuitBreaker> {
        self.breakers
            .lock()
            .unwrap()
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(CircuitBreaker::with_defaults()))
            .clone()
    }

    /// Submit a server-to-server request. `mac_secret` is the tenant's
    /// plaintext MAC key, resolved by the caller via the Secret Resolver.
    pub async fn submit_server_post(
        &self,
        tenant: &Tenant,
        mac_secret: &str,
        envelope: RequestEnvelope,
    ) -> Result<GatewayResponse, PayError> {
        let breaker = self.breaker_for(tenant.id);
        if breaker.try_acquire() == Admission::Rejected {
            return Err(PayError::GatewayUnavailable(format!(
                "circuit open for tenant {}",
                tenant.id
            )));
        }

        let mac = envelope.compute_mac(mac_secret)?;
        let body = envelope.to_form(&mac)?;
        let url = format!("{}/server-post", self.base_url(tenant.environment));

        let result = self.post_with_retries(&url, body).await;
        match &result {
            Ok(_) => breaker.on_success(),
            Err(e) if e.is_retriable() => breaker.on_failure(),
            // Declines and malformed-response failures are the gateway doing
            // its job correctly; they don't indicate the endpoint is down.
            Err(_) => {}
        }
        let response_body = result?;
        GatewayResponse::parse_form(&response_body)
    }

    /// Request a TAC for the browser-post redirect flow (§4.7).
    pub async fn exchange_key_for_tac(
        &self,
        tenant: &Tenant,
        mac_secret: &str,
        envelope: RequestEnvelope,
    ) -> Result<FormDescriptor, PayError> {
        let breaker = self.breaker_for(tenant.id);
        if breaker.try_acquire() == Admission::Rejected {
            return Err(PayError::GatewayUnavailable(format!(
                "circuit open for tenant {}",
                tenant.id
            )));
        }

        let mac = envelope.compute_mac(mac_secret)?;
        let body = envelope.to_form(&mac)?;
        let url = format!("{}/key-exchange", self.base_url(tenant.environment));

        let result = self.post_with_retries(&url, body).await;
        match &result {
            Ok(_) => breaker.on_success(),
            Err(e) if e.is_retriable() => breaker.on_failure(),
            Err(_) => {}
        }
        let response_body = result?;
        let tac_response = TacResponse::parse_form(&response_body)?;

        Ok(FormDescriptor {
            tac: tac_response.tac,
            cust_nbr: envelope.cust_nbr,
            merch_nbr: envelope.merch_nbr,
            dba_nbr: envelope.dba_nbr,
            terminal_nbr: envelope.terminal_nbr,
            post_url: format!("{}/post", self.base_url(tenant.environment)),
            tran_nbr: envelope.tran_nbr,
        })
    }

    /// Parse a browser-post callback body into a [`GatewayResponse`]. The
    /// caller is responsible for the IP-allowlist/HMAC authentication
    /// described in §6 before calling this.
    pub fn parse_callback(&self, form_body: &str) -> Result<GatewayResponse, PayError> {
        GatewayResponse::parse_form(form_body)
    }

    async fn post_with_retries(&self, url: &str, body: String) -> Result<String, PayError> {
        let mut backoffs = backoff::get_backoff_iter();
        let mut attempts_left = MAX_TRANSPORT_RETRIES;
        loop {
            let response = self
                .client
                .post(url)
                .header("content-type", "application/x-www-form-urlencoded")
                .body(body.clone())
                .send()
                .await;

            match response {
                Ok(resp) => {
                    return resp
                        .text()
                        .await
                        .map_err(|e| PayError::GatewayUnavailable(e.to_string()));
                }
                Err(e) if attempts_left > 1 => {
                    attempts_left -= 1;
                    let delay = backoffs.next().unwrap_or(Duration::from_secs(1));
                    warn!(error = %e, attempts_left, "gateway transport error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(error = %e, "gateway transport error, retries exhausted");
                    return Err(PayError::GatewayUnavailable(e.to_string()));
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
struct TacResponse {
    tac: String,
}

impl TacResponse {
    fn parse_form(body: &str) -> Result<Self, PayError> {
        let fields: HashMap<String, String> = serde_urlencoded::from_str(body)
            .map_err(|e| PayError::MalformedGatewayResponse(e.to_string()))?;
        let tac = fields
            .get("TAC")
            .cloned()
            .ok_or_else(|| PayError::MalformedGatewayResponse("missing TAC field".to_string()))?;
        Ok(Self { tac })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tac_response_requires_tac_field() {
        assert!(TacResponse::parse_form("FOO=bar").is_err());
        assert_eq!(TacResponse::parse_form("TAC=abc123").unwrap().tac, "abc123");
    }

    #[test]
    fn breaker_is_created_lazily_per_tenant() {
        let adapter = GatewayAdapter::new("https://sandbox", "https://prod");
        let tenant_id = pay_common::TenantId::new_random();
        let a = adapter.breaker_for(tenant_id);
        let b = adapter.breaker_for(tenant_id);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
