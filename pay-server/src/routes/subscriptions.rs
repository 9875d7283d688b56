//! `/api/v1/subscriptions/*` (§4.8 persistence side): create and manage
//! recurring billing rows. The billing cycle itself is driven by the
//! background scheduler tick, not by this surface.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use pay_common::{
    billing::{BillingInterval, IntervalUnit},
    ids::{PaymentMethodId, SubscriptionId},
    PayError,
};
use pay_store::subscription_store::NewSubscription;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::RequiredScope,
    routes::dto::{authorized_tenant, money_from_minor_units, SubscriptionResponse},
    state::AppState,
};
use pay_auth::Claims;

#[derive(Deserialize)]
pub struct CreateSubscriptionBody {
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub interval_value: u32,
    pub interval_unit: IntervalUnitWire,
    pub payment_method_id: Uuid,
    pub next_billing_date: NaiveDate,
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
}

fn default_max_retries() -> i32 {
    3
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnitWire {
    Day,
    Week,
    Month,
    Year,
}

impl From<IntervalUnitWire> for IntervalUnit {
    fn from(wire: IntervalUnitWire) -> Self {
        match wire {
            IntervalUnitWire::Day => IntervalUnit::Day,
            IntervalUnitWire::Week => IntervalUnit::Week,
            IntervalUnitWire::Month => IntervalUnit::Month,
            IntervalUnitWire::Year => IntervalUnit::Year,
        }
    }
}

async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<CreateSubscriptionBody>,
) -> Result<Json<SubscriptionResponse>, PayError> {
    let tenant_id = authorized_tenant(claims.merchant_id, body.tenant_id)?;
    let new = NewSubscription {
        id: SubscriptionId::new_random(),
        tenant_id,
        customer_id: body.customer_id,
        amount: money_from_minor_units(body.amount)?,
        currency: body.currency,
        interval: BillingInterval::new(body.interval_value, body.interval_unit.into()),
        payment_method_id: PaymentMethodId::from_uuid(body.payment_method_id),
        next_billing_date: body.next_billing_date,
        max_retries: body.max_retries,
    };
    let sub = state.subscriptions.create(new).await?;
    Ok(Json(SubscriptionResponse::from(&sub)))
}

async fn get_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubscriptionResponse>, PayError> {
    let sub = state
        .subscriptions
        .get(SubscriptionId::from_uuid(id))
        .await?
        .ok_or_else(|| PayError::not_found(format!("subscription {id}")))?;
    authorized_tenant(claims.merchant_id, sub.tenant_id.as_uuid())?;
    Ok(Json(SubscriptionResponse::from(&sub)))
}

async fn fetch_owned(
    state: &AppState,
    claims: &Claims,
    id: Uuid,
) -> Result<pay_store::subscription_store::Subscription, PayError> {
    let sub = state
        .subscriptions
        .get(SubscriptionId::from_uuid(id))
        .await?
        .ok_or_else(|| PayError::not_found(format!("subscription {id}")))?;
    authorized_tenant(claims.merchant_id, sub.tenant_id.as_uuid())?;
    Ok(sub)
}

async fn pause(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<(), PayError> {
    let sub = fetch_owned(&state, &claims, id).await?;
    state.subscriptions.pause(sub.id).await
}

async fn cancel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<(), PayError> {
    let sub = fetch_owned(&state, &claims, id).await?;
    state.subscriptions.cancel(sub.id).await
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/{id}", get(get_subscription))
        .route("/{id}/pause", post(pause))
        .route("/{id}/cancel", post(cancel))
        .route_layer(axum::middleware::from_fn_with_state(state, crate::auth::require_auth))
        .layer(Extension(RequiredScope("subscriptions:write")))
}
