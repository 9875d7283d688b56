//! `/api/v1/payments/*` (§4.11): Authorize/Sale/Capture/Void/Refund plus the
//! read-side tree/list queries, all delegating straight to
//! [`pay_engine::transaction_engine::TransactionEngine`].

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use pay_common::{PayError, TransactionId};
use pay_engine::transaction_engine::{CaptureRequest, ChargeRequest, RefundRequest, VoidRequest};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::RequiredScope,
    routes::dto::{authorized_tenant, money_from_minor_units, ListQuery, TransactionResponse},
    state::AppState,
};
use pay_auth::Claims;

#[derive(Deserialize)]
pub struct ChargeBody {
    pub tenant_id: Uuid,
    pub idempotency_key: String,
    pub customer_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub payment_method_type: String,
    pub payment_method_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub bric: String,
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
}

fn default_metadata() -> serde_json::Value {
    serde_json::json!({})
}

impl ChargeBody {
    fn into_request(self, claims: &Claims) -> Result<ChargeRequest, PayError> {
        Ok(ChargeRequest {
            tenant_id: authorized_tenant(claims.merchant_id, self.tenant_id)?,
            idempotency_key: self.idempotency_key,
            customer_id: self.customer_id,
            amount: money_from_minor_units(self.amount)?,
            currency: self.currency,
            payment_method_type: self.payment_method_type,
            payment_method_id: self.payment_method_id,
            subscription_id: self.subscription_id,
            bric: self.bric,
            metadata: self.metadata,
        })
    }
}

#[derive(Deserialize)]
pub struct CaptureBody {
    pub tenant_id: Uuid,
    pub idempotency_key: String,
    pub parent_transaction_id: Uuid,
    pub amount: i64,
}

#[derive(Deserialize)]
pub struct VoidBody {
    pub tenant_id: Uuid,
    pub idempotency_key: String,
    pub parent_transaction_id: Uuid,
}

#[derive(Deserialize)]
pub struct RefundBody {
    pub tenant_id: Uuid,
    pub idempotency_key: String,
    pub parent_transaction_id: Uuid,
    pub amount: i64,
}

async fn authorize(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<ChargeBody>,
) -> Result<Json<TransactionResponse>, PayError> {
    let req = body.into_request(&claims)?;
    let tx = state.engine.authorize(req).await?;
    Ok(Json(TransactionResponse::from(&tx)))
}

async fn sale(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<ChargeBody>,
) -> Result<Json<TransactionResponse>, PayError> {
    let req = body.into_request(&claims)?;
    let tx = state.engine.sale(req).await?;
    Ok(Json(TransactionResponse::from(&tx)))
}

async fn capture(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<CaptureBody>,
) -> Result<Json<TransactionResponse>, PayError> {
    let req = CaptureRequest {
        tenant_id: authorized_tenant(claims.merchant_id, body.tenant_id)?,
        idempotency_key: body.idempotency_key,
        parent_transaction_id: TransactionId::from_uuid(body.parent_transaction_id),
        amount: money_from_minor_units(body.amount)?,
    };
    let tx = state.engine.capture(req).await?;
    Ok(Json(TransactionResponse::from(&tx)))
}

async fn void(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<VoidBody>,
) -> Result<Json<TransactionResponse>, PayError> {
    let req = VoidRequest {
        tenant_id: authorized_tenant(claims.merchant_id, body.tenant_id)?,
        idempotency_key: body.idempotency_key,
        parent_transaction_id: TransactionId::from_uuid(body.parent_transaction_id),
    };
    let tx = state.engine.void(req).await?;
    Ok(Json(TransactionResponse::from(&tx)))
}

async fn refund(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<RefundBody>,
) -> Result<Json<TransactionResponse>, PayError> {
    let req = RefundRequest {
        tenant_id: authorized_tenant(claims.merchant_id, body.tenant_id)?,
        idempotency_key: body.idempotency_key,
        parent_transaction_id: TransactionId::from_uuid(body.parent_transaction_id),
        amount: money_from_minor_units(body.amount)?,
    };
    let tx = state.engine.refund(req).await?;
    Ok(Json(TransactionResponse::from(&tx)))
}

async fn get_transaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, PayError> {
    let tx = state
        .engine
        .get_transaction(TransactionId::from_uuid(id))
        .await?
        .ok_or_else(|| PayError::not_found(format!("transaction {id}")))?;
    authorized_tenant(claims.merchant_id, tx.tenant_id.as_uuid())?;
    Ok(Json(TransactionResponse::from(&tx)))
}

async fn get_tree(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TransactionResponse>>, PayError> {
    let tree = state.engine.get_tree(TransactionId::from_uuid(id)).await?;
    for tx in &tree {
        authorized_tenant(claims.merchant_id, tx.tenant_id.as_uuid())?;
    }
    Ok(Json(tree.iter().map(TransactionResponse::from).collect()))
}

async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TransactionResponse>>, PayError> {
    let rows = state
        .engine
        .list(claims.merchant_id, query.limit, query.offset)
        .await?;
    Ok(Json(rows.iter().map(TransactionResponse::from).collect()))
}

/// Mutating routes, scoped to `payments:write`; read routes are split out
/// (below) under `payments:read` since a read-only grant shouldn't admit
/// writes.
pub fn write_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/authorize", post(authorize))
        .route("/sale", post(sale))
        .route("/capture", post(capture))
        .route("/void", post(void))
        .route("/refund", post(refund))
        .route_layer(axum::middleware::from_fn_with_state(state, crate::auth::require_auth))
        .layer(Extension(RequiredScope("payments:write")))
}

pub fn read_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_transaction))
        .route("/{id}/tree", get(get_tree))
        .route("/", get(list))
        .route_layer(axum::middleware::from_fn_with_state(state, crate::auth::require_auth))
        .layer(Extension(RequiredScope("payments:read")))
}
