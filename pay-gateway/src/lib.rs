//! Credential Registry (§4.2) and Gateway Adapter (§4.3): everything that
//! talks to the acquirer's EPX-style gateway over HTTP, plus the in-process
//! tenant lookup the adapter needs to build a signed request.

pub mod breaker;
pub mod credential_registry;
pub mod gateway_adapter;
pub mod wire;

pub use breaker::CircuitBreaker;
pub use credential_registry::{CredentialRegistry, Tenant};
pub use gateway_adapter::GatewayAdapter;
