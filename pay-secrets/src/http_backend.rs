//! Production [`SecretBackend`] over HTTP (§4.1, §6 `SECRET_STORE_ADDR`): a
//! thin client against an external KV secret store (Vault/Secrets-Manager
//! shaped), grounded in `pay-gateway::gateway_adapter`'s `reqwest::Client`
//! construction pattern.

use std::time::Duration;

use async_trait::async_trait;
use pay_common::PayError;
use serde::{Deserialize, Serialize};

use crate::SecretBackend;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct PutBody<'a> {
    value: &'a str,
}

#[derive(Deserialize)]
struct GetBody {
    value: String,
}

/// Talks to a KV secret store reachable at `base_url` (§6 `SECRET_STORE_ADDR`)
/// over `GET /secrets/{path}` / `PUT /secrets/{path}`, authenticating with a
/// bearer token (§6 `BOOTSTRAP_SIGNING_SECRET`, the one secret referenced by
/// value rather than path).
pub struct HttpSecretBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSecretBackend {
    pub fn new(base_url: impl Into<String>, bearer_token: &str) -> Result<Self, PayError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth_value = reqwest::header::HeaderValue::from_str(&format!("Bearer {bearer_token}"))
            .map_err(|e| PayError::internal(format!("invalid bearer token: {e}")))?;
        auth_value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("pay-secrets")
            .default_headers(headers)
            .build()
            .map_err(|e| PayError::internal(format!("secret store client build: {e}")))?;
        Ok(Self { client, base_url: base_url.into() })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/secrets/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl SecretBackend for HttpSecretBackend {
    async fn get_secret(&self, path: &str) -> Result<String, PayError> {
        let response = self
            .client
            .get(self.url_for(path))
            .send()
            .await
            .map_err(|e| PayError::SecretUnavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PayError::not_found(format!("no secret at path {path}")));
        }
        let response = response
            .error_for_status()
            .map_err(|e| PayError::SecretUnavailable(e.to_string()))?;
        let body: GetBody = response
            .json()
            .await
            .map_err(|e| PayError::SecretUnavailable(format!("malformed secret store response: {e}")))?;
        Ok(body.value)
    }

    async fn put_secret(&self, path: &str, value: &str) -> Result<(), PayError> {
        self.client
            .put(self.url_for(path))
            .json(&PutBody { value })
            .send()
            .await
            .map_err(|e| PayError::SecretUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| PayError::SecretUnavailable(e.to_string()))?;
        Ok(())
    }
}
