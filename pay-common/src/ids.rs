//! Opaque identifiers used throughout the core, plus the two deterministic
//! derivations the engine relies on for idempotency: a transaction's UUID
//! from (tenant, idempotency key), and its `tran_nbr` from that UUID.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed namespace used to derive idempotent transaction UUIDs via UUIDv5.
/// Never changes: rotating it would silently break idempotency for every
/// in-flight idempotency key.
const IDEMPOTENCY_NAMESPACE: Uuid =
    Uuid::from_bytes([
        0x8c, 0x1e, 0x2a, 0x6d, 0x4f, 0x3b, 0x4d, 0x9a, 0xb5, 0x71, 0x0b, 0x4e,
        0x2f, 0x9d, 0x7a, 0x31,
    ]);

macro_rules! uuid_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(TenantId, "Opaque tenant (merchant) identifier.");
uuid_id!(ServiceId, "Opaque API-client (service) identifier.");
uuid_id!(CustomerId, "Opaque customer identifier, scoped to a tenant.");
uuid_id!(TransactionId, "A transaction's primary key.");
uuid_id!(PaymentMethodId, "A stored payment method's primary key.");
uuid_id!(SubscriptionId, "A subscription's primary key.");

/// Derive a [`TransactionId`] deterministically from `(tenant_id,
/// idempotency_key)` so that retrying a mutating call with the same key
/// always resolves to the same row, per §4.4.
///
/// This must never depend on wall-clock time or randomness.
pub fn derive_idempotent_transaction_id(
    tenant_id: TenantId,
    idempotency_key: &str,
) -> TransactionId {
    let mut name = Vec::with_capacity(16 + idempotency_key.len() + 1);
    name.extend_from_slice(tenant_id.as_uuid().as_bytes());
    name.push(b':');
    name.extend_from_slice(idempotency_key.as_bytes());
    TransactionId(Uuid::new_v5(&IDEMPOTENCY_NAMESPACE, &name))
}

/// The modulus `tran_nbr` values are derived under: a pure function of a
/// transaction UUID, rendered as a zero-padded 10-digit decimal string.
const TRAN_NBR_MODULUS: u64 = 10_000_000_000;

/// Derive the gateway-echoed `tran_nbr` from a transaction UUID: the low 34
/// bits of SHA-256(uuid bytes), reduced mod 10^10 and zero-padded to 10
/// digits. `2^34 > 10^10`, so the reduction doesn't introduce a detectable
/// bias large enough to matter for collision purposes at the volumes this
/// core targets.
pub fn derive_tran_nbr(id: TransactionId) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, id.as_uuid().as_bytes());
    let bytes = digest.as_ref();
    // Take the last 5 bytes (40 bits), mask to 34 bits, reduce mod 10^10.
    let mut acc: u64 = 0;
    for &b in &bytes[bytes.len() - 5..] {
        acc = (acc << 8) | u64::from(b);
    }
    acc &= (1u64 << 34) - 1;
    let value = acc % TRAN_NBR_MODULUS;
    format!("{value:010}")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn idempotent_id_is_deterministic() {
        let tenant = TenantId::new_random();
        let a = derive_idempotent_transaction_id(tenant, "k1");
        let b = derive_idempotent_transaction_id(tenant, "k1");
        assert_eq!(a, b);
    }

    #[test]
    fn idempotent_id_varies_by_key_and_tenant() {
        let tenant = TenantId::new_random();
        let other_tenant = TenantId::new_random();
        let a = derive_idempotent_transaction_id(tenant, "k1");
        let b = derive_idempotent_transaction_id(tenant, "k2");
        let c = derive_idempotent_transaction_id(other_tenant, "k1");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn tran_nbr_is_pure_and_bounded() {
        for _ in 0..1000 {
            let id = TransactionId::new_random();
            let a = derive_tran_nbr(id);
            let b = derive_tran_nbr(id);
            assert_eq!(a, b);
            assert_eq!(a.len(), 10);
            let numeric: u64 = a.parse().unwrap();
            assert!(numeric < TRAN_NBR_MODULUS);
        }
    }

    #[test]
    fn tran_nbr_differs_across_distinct_uuids_with_overwhelming_probability() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for _ in 0..5000 {
            let id = TransactionId::new_random();
            seen.insert(derive_tran_nbr(id));
        }
        // Birthday-bound collisions at n=5000 over a ~10^10 space are
        // vanishingly unlikely; any collision here indicates a bug.
        assert_eq!(seen.len(), 5000);
    }

    proptest::proptest! {
        /// `tran_nbr` is a pure function of its input UUID and always lands
        /// in `[0, 10^10)`, for any UUID bytes (§8).
        #[test]
        fn tran_nbr_is_pure_and_in_range(bytes: [u8; 16]) {
            let id = TransactionId::from_uuid(Uuid::from_bytes(bytes));
            let a = derive_tran_nbr(id);
            let b = derive_tran_nbr(id);
            proptest::prop_assert_eq!(&a, &b);
            proptest::prop_assert_eq!(a.len(), 10);
            let numeric: u64 = a.parse().unwrap();
            proptest::prop_assert!(numeric < TRAN_NBR_MODULUS);
        }

        /// Idempotent transaction ids are a pure function of (tenant, key):
        /// same inputs always yield the same id, regardless of call order.
        #[test]
        fn idempotent_id_is_pure(tenant_bytes: [u8; 16], key in "[a-zA-Z0-9_-]{1,32}") {
            let tenant = TenantId::from_uuid(Uuid::from_bytes(tenant_bytes));
            let a = derive_idempotent_transaction_id(tenant, &key);
            let b = derive_idempotent_transaction_id(tenant, &key);
            proptest::prop_assert_eq!(a, b);
        }
    }
}
