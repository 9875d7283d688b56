//! `/api/v1/payments/browser-post/*` (§4.7, §6): TAC issuance behind the
//! normal JWT auth, and the unauthenticated (by JWT) callback the gateway
//! posts directly from the user's browser, authenticated instead by IP
//! allowlist or an `X-EPX-Signature` HMAC over the raw body.

use std::net::IpAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    routing::post,
    Extension, Json, Router,
};
use pay_common::{PayError, TenantId};
use pay_engine::browser_post::GenerateFormRequest;
use pay_gateway::gateway_adapter::FormDescriptor;
use pay_store::transaction_store::{TranType, TransactionStore};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::{auth::RequiredScope, routes::dto::authorized_tenant, state::AppState};
use pay_auth::Claims;

#[derive(Deserialize)]
pub struct GenerateFormBody {
    pub tenant_id: Uuid,
    pub idempotency_key: String,
    pub customer_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub tran_type: WireTranType,
    pub return_url: String,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum WireTranType {
    Sale,
    Auth,
}

impl From<WireTranType> for TranType {
    fn from(wire: WireTranType) -> Self {
        match wire {
            WireTranType::Sale => TranType::Sale,
            WireTranType::Auth => TranType::Auth,
        }
    }
}

#[derive(Serialize)]
pub struct FormDescriptorResponse {
    pub tac: String,
    pub cust_nbr: String,
    pub merch_nbr: String,
    pub dba_nbr: String,
    pub terminal_nbr: String,
    pub post_url: String,
    pub tran_nbr: String,
}

impl From<FormDescriptor> for FormDescriptorResponse {
    fn from(form: FormDescriptor) -> Self {
        Self {
            tac: form.tac,
            cust_nbr: form.cust_nbr,
            merch_nbr: form.merch_nbr,
            dba_nbr: form.dba_nbr,
            terminal_nbr: form.terminal_nbr,
            post_url: form.post_url,
            tran_nbr: form.tran_nbr,
        }
    }
}

async fn generate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<GenerateFormBody>,
) -> Result<Json<FormDescriptorResponse>, PayError> {
    let tenant_id = authorized_tenant(claims.merchant_id, body.tenant_id)?;
    let req = GenerateFormRequest {
        tenant_id,
        idempotency_key: body.idempotency_key,
        customer_id: body.customer_id,
        amount: pay_common::Money::from_minor_units(body.amount)
            .map_err(|e| PayError::invalid_input(e.to_string()))?,
        currency: body.currency,
        tran_type: body.tran_type.into(),
        return_url: body.return_url,
    };
    let form = state.browser_post.generate_form(req).await?;
    Ok(Json(FormDescriptorResponse::from(form)))
}

#[derive(Serialize)]
pub struct CallbackReceipt {
    pub tran_nbr: String,
    pub status: String,
}

const SIGNATURE_HEADER: &str = "X-EPX-Signature";

/// Verify an `X-EPX-Signature: <hex-hmac-sha256>` header against `body`
/// under `mac_secret`, using the same HMAC construction as outbound gateway
/// requests ([`pay_gateway::wire::RequestEnvelope::compute_mac`]).
fn verify_signature(headers: &HeaderMap, body: &str, mac_secret: &str) -> bool {
    let Some(header) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, mac_secret.as_bytes());
    let expected = ring::hmac::sign(&key, body.as_bytes());
    let expected_hex = {
        use std::fmt::Write;
        let mut out = String::with_capacity(expected.as_ref().len() * 2);
        for b in expected.as_ref() {
            let _ = write!(out, "{b:02x}");
        }
        out
    };
    // Constant-time comparison: callback signatures gate money-moving state,
    // so a timing side-channel on this check is unacceptable.
    ring::constant_time::verify_slices_are_equal(expected_hex.as_bytes(), header.as_bytes()).is_ok()
}

/// Resolve which tenant a raw callback body belongs to without trusting the
/// caller: parse just enough to find `tran_nbr`, then look the pending
/// transaction up by that number.
async fn tenant_for_callback(transactions: &TransactionStore, body: &str) -> Result<TenantId, PayError> {
    let parsed = pay_gateway::wire::GatewayResponse::parse_form(body)?;
    let tx = transactions
        .get_by_tran_nbr(&parsed.tran_nbr)
        .await?
        .ok_or_else(|| PayError::not_found(format!("transaction with tran_nbr {}", parsed.tran_nbr)))?;
    Ok(tx.tenant_id)
}

async fn callback(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<CallbackReceipt>, PayError> {
    let source_ip: IpAddr = peer.ip();
    let tenant_id = tenant_for_callback(&state.transactions, &body).await?;

    let ip_allowed = state.ip_whitelist.is_allowed(tenant_id, source_ip).await?
        || state.browser_post.allows_unsigned_callback(tenant_id, source_ip);
    if !ip_allowed {
        let tenant = state
            .registry
            .get(tenant_id)
            .ok_or_else(|| PayError::not_found(format!("tenant {tenant_id}")))?;
        let mac_secret = state.secrets.get(&tenant.mac_secret_path).await?;
        if !verify_signature(&headers, &body, &mac_secret) {
            return Err(PayError::Unauthenticated(
                "callback source IP not allowlisted and signature invalid".to_string(),
            ));
        }
    }

    let tx = state.browser_post.reconcile_callback(&body).await?;
    Ok(Json(CallbackReceipt {
        tran_nbr: tx.tran_nbr.clone().unwrap_or_default(),
        status: format!("{:?}", tx.status()),
    }))
}

pub fn router(state: AppState) -> Router<AppState> {
    let generate_router = Router::new()
        .route("/generate", post(generate))
        .route_layer(axum::middleware::from_fn_with_state(state, crate::auth::require_auth))
        .layer(Extension(RequiredScope("payments:write")));

    // Deliberately not behind `require_auth`: the gateway posts this
    // callback directly from the browser with no bearer token, so it
    // authenticates itself via IP allowlist or HMAC signature instead (§6).
    let callback_router = Router::new().route("/callback", post(callback));

    generate_router.merge(callback_router)
}
