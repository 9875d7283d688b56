//! Auth Plane (§4.9): RS256 JWT verification, a refreshed public-key store,
//! grant checks, jti blacklisting, and per-entity rate limiting. Everything
//! here is fail-closed: a lookup failure denies the request rather than
//! admitting it.

pub mod blacklist;
pub mod jwt;
pub mod public_key_store;
pub mod rate_limiter;

pub use blacklist::JtiBlacklist;
pub use jwt::{Claims, JwtVerifier};
pub use public_key_store::{PublicKeyStore, ServiceRecord, ServiceRegistry};
pub use rate_limiter::{RateLimitBackend, RateLimiter};
