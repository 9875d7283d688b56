//! RS256 JWT verification (§4.9). Required claims, issuer resolution
//! through the public-key store, blacklist and grant checks, and scope
//! enforcement all live here as one verification pipeline so a caller
//! can't accidentally skip a step.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, TokenData, Validation};
use pay_common::{ids::TenantId, PayError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{blacklist::JtiBlacklist, public_key_store::{PublicKeyStore, ServiceRegistry}};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer: the calling service's id.
    pub iss: Uuid,
    pub sub: String,
    pub merchant_id: TenantId,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub scopes: Vec<String>,
}

pub struct JwtVerifier<R: ServiceRegistry, B: JtiBlacklist> {
    keys: Arc<PublicKeyStore<R>>,
    blacklist: Arc<B>,
}

impl<R: ServiceRegistry, B: JtiBlacklist> JwtVerifier<R, B> {
    pub fn new(keys: Arc<PublicKeyStore<R>>, blacklist: Arc<B>) -> Self {
        Self { keys, blacklist }
    }

    /// Verify `token` for the required `scope`, applying every check named
    /// in §4.9 in order: signature/issuer, expiry, blacklist, merchant_id
    /// presence, grant, and scope.
    pub async fn verify(&self, token: &str, required_scope: &str) -> Result<Claims, PayError> {
        let unverified = decode_header_issuer(token)?;
        let decoding_key = self
            .keys
            .decoding_key(unverified)
            .ok_or_else(|| PayError::Unauthenticated("unknown issuer".to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iat"]);
        let data: TokenData<Claims> = decode(token, &decoding_key, &validation)
            .map_err(|e| PayError::Unauthenticated(format!("bad signature or expired: {e}")))?;
        let claims = data.claims;

        if claims.iss != unverified {
            return Err(PayError::Unauthenticated("iss does not match token header".to_string()));
        }

        // `jsonwebtoken` already rejected an expired token above, but a
        // blacklist lookup failure must independently fail closed.
        let blacklisted = self.blacklist.is_blacklisted(&claims.jti).await.unwrap_or(true);
        if blacklisted {
            return Err(PayError::Unauthenticated("token is blacklisted".to_string()));
        }

        if !self.keys.has_active_grant(claims.iss, claims.merchant_id, Utc::now()) {
            return Err(PayError::Forbidden("no active grant for (service, tenant)".to_string()));
        }

        if !claims.scopes.iter().any(|s| s == required_scope) {
            return Err(PayError::Forbidden(format!("missing required scope {required_scope}")));
        }

        Ok(claims)
    }
}

/// Decode the token's claims *without* verifying the signature, purely to
/// learn which service's key to verify against. The real verification
/// happens in [`JwtVerifier::verify`] immediately after with that key.
fn decode_header_issuer(token: &str) -> Result<Uuid, PayError> {
    let mut insecure = Validation::new(Algorithm::RS256);
    insecure.insecure_disable_signature_validation();
    insecure.validate_exp = false;
    let data: TokenData<Claims> = decode(token, &jsonwebtoken::DecodingKey::from_secret(&[]), &insecure)
        .map_err(|e| PayError::Unauthenticated(format!("malformed token: {e}")))?;
    Ok(data.claims.iss)
}

#[cfg(test)]
mod test {
    use async_trait::async_trait;
    use jsonwebtoken::{encode, EncodingKey, Header};

    use crate::public_key_store::{Grant, PublicKeyStore, ServiceRecord, ServiceRegistry};

    use super::*;

    const TEST_PUBLIC_KEY_PEM: &str = include_str!("../testdata/test_rsa_public_key.pem");
    const TEST_PRIVATE_KEY_PEM: &str = include_str!("../testdata/test_rsa_private_key_pkcs8.pem");

    struct StaticRegistry {
        service_id: Uuid,
        tenant_id: TenantId,
    }

    #[async_trait]
    impl ServiceRegistry for StaticRegistry {
        async fn list_active_services(&self) -> Result<Vec<ServiceRecord>, PayError> {
            Ok(vec![ServiceRecord {
                id: self.service_id,
                public_key_pem: TEST_PUBLIC_KEY_PEM.to_string(),
                requests_per_second: 10,
            }])
        }
        async fn list_grants(&self) -> Result<Vec<Grant>, PayError> {
            Ok(vec![Grant {
                service_id: self.service_id,
                tenant_id: self.tenant_id,
                active: true,
                expires_at: None,
            }])
        }
    }

    struct NeverBlacklisted;
    #[async_trait]
    impl JtiBlacklist for NeverBlacklisted {
        async fn is_blacklisted(&self, _jti: &str) -> Result<bool, PayError> {
            Ok(false)
        }
    }

    struct AlwaysErrors;
    #[async_trait]
    impl JtiBlacklist for AlwaysErrors {
        async fn is_blacklisted(&self, _jti: &str) -> Result<bool, PayError> {
            Err(PayError::internal("blacklist store down"))
        }
    }

    fn sign_token(service_id: Uuid, tenant_id: TenantId, scopes: &[&str]) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: service_id,
            sub: "test-subject".to_string(),
            merchant_id: tenant_id,
            exp: now + 3600,
            iat: now,
            jti: Uuid::new_v4().to_string(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        };
        let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY_PEM.as_bytes()).unwrap();
        encode(&Header::new(Algorithm::RS256), &claims, &key).unwrap()
    }

    #[tokio::test]
    async fn valid_token_with_required_scope_passes() {
        let service_id = Uuid::new_v4();
        let tenant_id = TenantId::new_random();
        let keys = Arc::new(PublicKeyStore::new(Arc::new(StaticRegistry { service_id, tenant_id })));
        keys.refresh().await.unwrap();
        let verifier = JwtVerifier::new(keys, Arc::new(NeverBlacklisted));

        let token = sign_token(service_id, tenant_id, &["payments:write"]);
        let claims = verifier.verify(&token, "payments:write").await.unwrap();
        assert_eq!(claims.merchant_id, tenant_id);
    }

    #[tokio::test]
    async fn missing_scope_is_forbidden() {
        let service_id = Uuid::new_v4();
        let tenant_id = TenantId::new_random();
        let keys = Arc::new(PublicKeyStore::new(Arc::new(StaticRegistry { service_id, tenant_id })));
        keys.refresh().await.unwrap();
        let verifier = JwtVerifier::new(keys, Arc::new(NeverBlacklisted));

        let token = sign_token(service_id, tenant_id, &["payments:read"]);
        let err = verifier.verify(&token, "payments:write").await.unwrap_err();
        assert!(matches!(err, PayError::Forbidden(_)));
    }

    #[tokio::test]
    async fn blacklist_lookup_failure_fails_closed() {
        let service_id = Uuid::new_v4();
        let tenant_id = TenantId::new_random();
        let keys = Arc::new(PublicKeyStore::new(Arc::new(StaticRegistry { service_id, tenant_id })));
        keys.refresh().await.unwrap();
        let verifier = JwtVerifier::new(keys, Arc::new(AlwaysErrors));

        let token = sign_token(service_id, tenant_id, &["payments:write"]);
        let err = verifier.verify(&token, "payments:write").await.unwrap_err();
        assert!(matches!(err, PayError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn unknown_issuer_is_rejected() {
        let service_id = Uuid::new_v4();
        let tenant_id = TenantId::new_random();
        let keys = Arc::new(PublicKeyStore::new(Arc::new(StaticRegistry { service_id, tenant_id })));
        keys.refresh().await.unwrap();
        let verifier = JwtVerifier::new(keys, Arc::new(NeverBlacklisted));

        let token = sign_token(Uuid::new_v4(), tenant_id, &["payments:write"]);
        let err = verifier.verify(&token, "payments:write").await.unwrap_err();
        assert!(matches!(err, PayError::Unauthenticated(_)));
    }
}
