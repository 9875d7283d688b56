/// Detailed types and state machines for inbound Lightning payments.
pub mod inbound;
/// Detailed types and state machines for outbound Lightning payments.
pub mod outbound;
