//! Subscription Scheduler (§4.8): drives the Transaction Engine on a timer
//! to process due recurring billing. The engine itself is stateless per
//! invocation; external scheduling (a periodic `LxTask`, see `pay-server`)
//! decides when `process_due_billing` runs.

pub mod scheduler;

pub use scheduler::{BillingOutcome, FailurePolicy, SubscriptionScheduler};
