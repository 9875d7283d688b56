pub mod cert;
mod quote;
pub mod verify;

pub use cert::AttestationCert;
pub use quote::quote_enclave;
pub use verify::{EnclavePolicy, ServerCertVerifier};
