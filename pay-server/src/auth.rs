//! Request authentication and rate limiting (§4.9, §5): every RPC under
//! `/api/v1` is gated on a bearer JWT verified by [`pay_auth::JwtVerifier`]
//! and a per-service token bucket enforced by [`pay_auth::RateLimiter`].
//! Applied as a route-scoped `axum::middleware::from_fn_with_state` layer so
//! each route can name the scope it requires.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
    Extension,
};
use pay_auth::Claims;
use pay_common::PayError;

use crate::state::AppState;

/// The scope a route requires, attached per-route via `Extension` before
/// [`require_auth`] runs.
#[derive(Clone, Copy)]
pub struct RequiredScope(pub &'static str);

const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

fn bearer_token(req: &Request) -> Result<&str, PayError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| PayError::Unauthenticated("missing authorization header".to_string()))?;
    let header = header
        .to_str()
        .map_err(|_| PayError::Unauthenticated("authorization header is not valid UTF-8".to_string()))?;
    header.strip_prefix("Bearer ").ok_or_else(|| {
        PayError::Unauthenticated("authorization header must be a bearer token".to_string())
    })
}

/// Verifies the bearer JWT against `required_scope`, then checks the calling
/// service's rate-limit bucket before admitting the request. Inserts the
/// verified [`Claims`] into the request extensions for handlers to read.
pub async fn require_auth(
    State(state): State<AppState>,
    Extension(RequiredScope(required_scope)): Extension<RequiredScope>,
    mut req: Request,
    next: Next,
) -> Result<Response, PayError> {
    let token = bearer_token(&req)?;
    let claims: Claims = state.jwt.verify(token, required_scope).await?;

    let capacity = state
        .public_keys
        .requests_per_second(claims.iss)
        .unwrap_or(DEFAULT_REQUESTS_PER_SECOND);
    let admitted = state
        .rate_limiter
        .check("service", &claims.iss.to_string(), capacity)
        .await;
    if !admitted {
        let secs_into_minute = chrono::Utc::now().timestamp() % 60;
        return Err(PayError::RateLimited {
            retry_after_secs: (60 - secs_into_minute) as u64,
        });
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
