//! Jti blacklist (§4.9): a revocation list for tokens that must stop being
//! accepted before their natural expiry. A lookup failure is treated as
//! blacklisted — fail-closed, the same security default the rate limiter
//! and the ACH verifier's sibling components use.

use async_trait::async_trait;
use pay_common::PayError;

#[async_trait]
pub trait JtiBlacklist: Send + Sync + 'static {
    /// `Ok(true)` if `jti` has been revoked. Callers that get `Err` should
    /// treat the token as blacklisted rather than propagate the error as a
    /// distinct failure mode.
    async fn is_blacklisted(&self, jti: &str) -> Result<bool, PayError>;
    async fn revoke(&self, jti: &str, expires_at: chrono::DateTime<chrono::Utc>) -> Result<(), PayError>;
}

/// In-memory blacklist for tests. Not suitable for production use across
/// multiple process instances.
#[derive(Default)]
pub struct InMemoryBlacklist {
    revoked: std::sync::Mutex<std::collections::HashMap<String, chrono::DateTime<chrono::Utc>>>,
}

impl InMemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JtiBlacklist for InMemoryBlacklist {
    async fn is_blacklisted(&self, jti: &str) -> Result<bool, PayError> {
        Ok(self.revoked.lock().unwrap().contains_key(jti))
    }

    async fn revoke(&self, jti: &str, expires_at: chrono::DateTime<chrono::Utc>) -> Result<(), PayError> {
        self.revoked.lock().unwrap().insert(jti.to_string(), expires_at);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn revoked_jti_is_blacklisted() {
        let blacklist = InMemoryBlacklist::new();
        assert!(!blacklist.is_blacklisted("jti-1").await.unwrap());
        blacklist.revoke("jti-1", chrono::Utc::now()).await.unwrap();
        assert!(blacklist.is_blacklisted("jti-1").await.unwrap());
    }
}
