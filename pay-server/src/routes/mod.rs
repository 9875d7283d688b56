//! The `/api/v1` router (§4.11): one nested sub-router per resource, each
//! wrapped in its own auth middleware so read and write grants can diverge.

pub mod browser_post;
pub mod dto;
pub mod payment_methods;
pub mod payments;
pub mod subscriptions;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let payments = payments::write_router(state.clone()).merge(payments::read_router(state.clone()));

    Router::new().nest(
        "/api/v1",
        Router::new()
            .nest("/payments", payments.nest("/browser-post", browser_post::router(state.clone())))
            .nest("/payment-methods", payment_methods::router(state.clone()))
            .nest("/subscriptions", subscriptions::router(state)),
    )
}
