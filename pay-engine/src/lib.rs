//! Transaction Engine, ACH Verifier, and Browser-Post Coordinator (§4.4,
//! §4.6, §4.7): the pieces that sit between the API surface and the
//! Gateway Adapter / stores, owning idempotency, lifecycle validation, and
//! concurrency control.

pub mod ach_verifier;
pub mod browser_post;
pub mod transaction_engine;

pub use ach_verifier::AchVerifier;
pub use browser_post::BrowserPostCoordinator;
pub use transaction_engine::TransactionEngine;
