//! `/api/v1/payment-methods/*` (§4.5, §4.6): tokenize (card via storage
//! conversion, ACH via pre-note), list/get/set-default/delete.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use pay_common::{ids::PaymentMethodId, PayError, TenantId};
use pay_store::payment_method_store::{NewPaymentMethod, PmType, VerificationStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::RequiredScope,
    routes::dto::{authorized_tenant, PaymentMethodResponse},
    state::AppState,
};
use pay_auth::Claims;

#[derive(Deserialize)]
pub struct StoreCardBody {
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub financial_bric: String,
    pub masked_last_four: String,
    pub brand_or_bank_name: Option<String>,
    pub exp_month: Option<i16>,
    pub exp_year: Option<i16>,
    pub avs_address: String,
    pub avs_zip: String,
}

#[derive(Deserialize)]
pub struct StoreAchBody {
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub storage_token: String,
    pub masked_last_four: String,
    pub brand_or_bank_name: Option<String>,
    pub account_type: Option<String>,
}

async fn tenant_context(
    state: &AppState,
    tenant_id: TenantId,
) -> Result<(pay_gateway::credential_registry::Tenant, String), PayError> {
    let tenant = state
        .registry
        .get(tenant_id)
        .ok_or_else(|| PayError::not_found(format!("tenant {tenant_id}")))?;
    let mac_secret = state.secrets.get(&tenant.mac_secret_path).await?;
    Ok((tenant, mac_secret))
}

async fn store_card(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<StoreCardBody>,
) -> Result<Json<PaymentMethodResponse>, PayError> {
    let tenant_id = authorized_tenant(claims.merchant_id, body.tenant_id)?;
    let (tenant, mac_secret) = tenant_context(&state, tenant_id).await?;

    let new = NewPaymentMethod {
        id: PaymentMethodId::new_random(),
        tenant_id,
        customer_id: body.customer_id,
        pm_type: PmType::Card,
        storage_token: String::new(),
        masked_last_four: body.masked_last_four,
        brand_or_bank_name: body.brand_or_bank_name,
        exp_month: body.exp_month,
        exp_year: body.exp_year,
        account_type: None,
        is_verified: true,
        verification_status: VerificationStatus::Verified,
    };
    let pm = state
        .payment_methods
        .convert_financial_to_storage(
            &state.gateway,
            &tenant,
            &mac_secret,
            new,
            &body.financial_bric,
            Some(&body.avs_address),
            Some(&body.avs_zip),
        )
        .await?;
    Ok(Json(PaymentMethodResponse::from(&pm)))
}

async fn store_ach(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<StoreAchBody>,
) -> Result<Json<PaymentMethodResponse>, PayError> {
    let tenant_id = authorized_tenant(claims.merchant_id, body.tenant_id)?;
    let (tenant, mac_secret) = tenant_context(&state, tenant_id).await?;

    let new = NewPaymentMethod {
        id: PaymentMethodId::new_random(),
        tenant_id,
        customer_id: body.customer_id,
        pm_type: PmType::Ach,
        storage_token: body.storage_token,
        masked_last_four: body.masked_last_four,
        brand_or_bank_name: body.brand_or_bank_name,
        exp_month: None,
        exp_year: None,
        account_type: body.account_type,
        is_verified: false,
        verification_status: VerificationStatus::Pending,
    };
    let pm = state
        .payment_methods
        .store_ach(&state.transactions, &state.gateway, &tenant, &mac_secret, new)
        .await?;
    Ok(Json(PaymentMethodResponse::from(&pm)))
}

async fn get_payment_method(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentMethodResponse>, PayError> {
    let pm = state
        .payment_methods
        .get(PaymentMethodId::from_uuid(id))
        .await?
        .ok_or_else(|| PayError::not_found(format!("payment method {id}")))?;
    authorized_tenant(claims.merchant_id, pm.tenant_id.as_uuid())?;
    Ok(Json(PaymentMethodResponse::from(&pm)))
}

#[derive(Deserialize)]
pub struct ListPmQuery {
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
}

async fn list_payment_methods(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    axum::extract::Query(query): axum::extract::Query<ListPmQuery>,
) -> Result<Json<Vec<PaymentMethodResponse>>, PayError> {
    let tenant_id = authorized_tenant(claims.merchant_id, query.tenant_id)?;
    let rows = state.payment_methods.list(tenant_id, query.customer_id).await?;
    Ok(Json(rows.iter().map(PaymentMethodResponse::from).collect()))
}

#[derive(Deserialize)]
pub struct SetDefaultBody {
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
}

async fn set_default(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetDefaultBody>,
) -> Result<(), PayError> {
    let tenant_id = authorized_tenant(claims.merchant_id, body.tenant_id)?;
    state
        .payment_methods
        .set_default(tenant_id, body.customer_id, PaymentMethodId::from_uuid(id))
        .await
}

async fn delete_payment_method(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<(), PayError> {
    let pm = state
        .payment_methods
        .get(PaymentMethodId::from_uuid(id))
        .await?
        .ok_or_else(|| PayError::not_found(format!("payment method {id}")))?;
    authorized_tenant(claims.merchant_id, pm.tenant_id.as_uuid())?;
    state.payment_methods.delete(pm.id).await
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/card", post(store_card))
        .route("/ach", post(store_ach))
        .route("/{id}", get(get_payment_method).delete(delete_payment_method))
        .route("/{id}/default", post(set_default))
        .route("/", get(list_payment_methods))
        .route_layer(axum::middleware::from_fn_with_state(state, crate::auth::require_auth))
        .layer(Extension(RequiredScope("payment_methods:write")))
}
