//! The core's single, flat error type (§7). Every fallible operation in this
//! workspace returns `Result<T, PayError>`; service boundaries (HTTP, the
//! scheduler, the ACH sweep) map kinds to their own presentation instead of
//! inventing a parallel hierarchy of nested error types.

use serde::{Deserialize, Serialize};

/// Error kinds named in §7. `Display`/`Debug` messages are for logs; the
/// wire-facing message lives in [`ErrorResponse`] and never includes internal
/// detail for the `Internal` kind.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PayError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("idempotency key reused with a different payload")]
    DuplicateIdempotencyKey,

    #[error("gateway declined: {resp_code} {resp_text}")]
    GatewayDecline { resp_code: String, resp_text: String },

    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("malformed gateway response: {0}")]
    MalformedGatewayResponse(String),

    #[error("secret unavailable: {0}")]
    SecretUnavailable(String),

    #[error("internal error")]
    Internal(String),
}

impl PayError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a failed gateway submission can safely be retried by the
    /// caller (network/timeout/circuit-open) as opposed to a business
    /// decision that won't change on retry (decline, malformed response).
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable(_))
    }

    /// The stable wire error code for this error kind. Not a discriminant of
    /// the variant's data (e.g. the retry-after seconds aren't part of the
    /// code), just a stable tag clients can match on.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidState(_) => "invalid_state",
            Self::NotFound(_) => "not_found",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::DuplicateIdempotencyKey => "duplicate_idempotency_key",
            Self::GatewayDecline { .. } => "gateway_decline",
            Self::GatewayUnavailable(_) => "gateway_unavailable",
            Self::MalformedGatewayResponse(_) => "malformed_gateway_response",
            Self::SecretUnavailable(_) => "secret_unavailable",
            Self::Internal(_) => "internal",
        }
    }

    /// The caller-safe message: for `Internal`, this deliberately drops the
    /// wrapped detail so that e.g. database errors never leak table/column
    /// names to a client (§7 policy).
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_string(),
            Self::SecretUnavailable(_) => "service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

/// The wire-serialized representation of any [`PayError`], mirroring the
/// teacher's `ErrorResponse { code, msg }` split between an internal error
/// enum and its serializable form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub msg: String,
}

impl From<&PayError> for ErrorResponse {
    fn from(err: &PayError) -> Self {
        Self {
            code: err.code().to_string(),
            msg: err.public_message(),
        }
    }
}

/// Maps an error kind to the HTTP status code the server surface should
/// return for it.
pub trait ToHttpStatusCode {
    fn to_http_status_code(&self) -> u16;
}

impl ToHttpStatusCode for PayError {
    fn to_http_status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::InvalidState(_) => 409,
            Self::NotFound(_) => 404,
            Self::Unauthenticated(_) => 401,
            Self::Forbidden(_) => 403,
            Self::RateLimited { .. } => 429,
            Self::DuplicateIdempotencyKey => 409,
            Self::GatewayDecline { .. } => 402,
            Self::GatewayUnavailable(_) => 503,
            Self::MalformedGatewayResponse(_) => 502,
            Self::SecretUnavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }
}

#[cfg(feature = "axum")]
mod axum_impl {
    use axum::response::{IntoResponse, Response};
    use http::StatusCode;

    use super::{ErrorResponse, PayError, ToHttpStatusCode};

    impl IntoResponse for PayError {
        fn into_response(self) -> Response {
            let status = StatusCode::from_u16(self.to_http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = ErrorResponse::from(&self);

            if status.is_server_error() {
                tracing::error!(code = %body.code, "request failed: {self:#}");
            } else {
                tracing::debug!(code = %body.code, "request rejected: {self:#}");
            }

            let mut response = axum::Json(body).into_response();
            *response.status_mut() = status;
            if let Self::RateLimited { retry_after_secs } = self {
                if let Ok(value) = retry_after_secs.to_string().parse() {
                    response
                        .headers_mut()
                        .insert(http::header::RETRY_AFTER, value);
                }
            }
            response
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn internal_errors_never_leak_detail() {
        let err = PayError::internal("leaked table name: secret_tenants");
        assert_eq!(err.public_message(), "an internal error occurred");
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn status_codes_match_kinds() {
        assert_eq!(PayError::invalid_input("x").to_http_status_code(), 400);
        assert_eq!(PayError::invalid_state("x").to_http_status_code(), 409);
        assert_eq!(PayError::not_found("x").to_http_status_code(), 404);
        assert_eq!(
            PayError::RateLimited { retry_after_secs: 5 }.to_http_status_code(),
            429
        );
    }
}
