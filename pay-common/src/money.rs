//! A minor-units money newtype.
//!
//! Note that we don't impl `From<f64>` or any other binary-float conversion:
//! every [`Money`] in this codebase either comes from a caller-specified
//! integer number of cents, or is parsed from the gateway's own decimal-string
//! `AMOUNT` field via [`Money::try_from_decimal_str`]. Mixing in floats would
//! reintroduce the rounding bugs minor-units arithmetic exists to avoid.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing or combining [`Money`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("amount is negative")]
    Negative,
    #[error("amount overflows i64 minor units")]
    Overflow,
    #[error("amount is not a valid decimal string")]
    InvalidDecimal,
}

/// A non-negative amount of money, represented as an integer count of minor
/// units (cents for USD). Deliberately does not implement `Ord`-breaking
/// arithmetic operators; use the `checked_*` methods so overflow and sign are
/// always handled explicitly at the call site.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Self = Self(0);

    /// Construct a [`Money`] from a non-negative number of minor units.
    #[inline]
    pub fn from_minor_units(minor_units: i64) -> Result<Self, MoneyError> {
        if minor_units < 0 {
            Err(MoneyError::Negative)
        } else {
            Ok(Self(minor_units))
        }
    }

    /// Parse a decimal string with up to 2 fractional digits (as sent in the
    /// gateway's `AMOUNT` field, e.g. `"10.00"`) into minor units.
    pub fn try_from_decimal_str(s: &str) -> Result<Self, MoneyError> {
        let decimal: Decimal =
            s.parse().map_err(|_| MoneyError::InvalidDecimal)?;
        Self::try_from_decimal(decimal)
    }

    /// Convert a [`Decimal`] (major units, e.g. dollars) into [`Money`].
    pub fn try_from_decimal(decimal: Decimal) -> Result<Self, MoneyError> {
        if decimal.is_sign_negative() {
            return Err(MoneyError::Negative);
        }
        let scaled = decimal
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(MoneyError::Overflow)?
            .round();
        let minor_units: i64 =
            scaled.try_into().map_err(|_| MoneyError::Overflow)?;
        Ok(Self(minor_units))
    }

    /// The raw minor-unit integer value (cents).
    #[inline]
    pub fn minor_units(self) -> i64 {
        self.0
    }

    /// Render as the gateway's `AMOUNT` wire format: a decimal string with
    /// exactly two fractional digits, e.g. `1000` minor units -> `"10.00"`.
    pub fn to_decimal_string(self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, MoneyError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, MoneyError> {
        let diff = self.0.checked_sub(rhs.0).ok_or(MoneyError::Overflow)?;
        if diff < 0 {
            Err(MoneyError::Negative)
        } else {
            Ok(Self(diff))
        }
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decimal_roundtrip() {
        let m = Money::try_from_decimal_str("10.00").unwrap();
        assert_eq!(m.minor_units(), 1000);
        assert_eq!(m.to_decimal_string(), "10.00");

        let m = Money::try_from_decimal_str("0.01").unwrap();
        assert_eq!(m.minor_units(), 1);
        assert_eq!(m.to_decimal_string(), "0.01");
    }

    #[test]
    fn rejects_negative() {
        assert_eq!(
            Money::from_minor_units(-1).unwrap_err(),
            MoneyError::Negative
        );
        assert_eq!(
            Money::try_from_decimal_str("-5.00").unwrap_err(),
            MoneyError::Negative
        );
    }

    #[test]
    fn checked_sub_never_goes_negative() {
        let a = Money::from_minor_units(100).unwrap();
        let b = Money::from_minor_units(150).unwrap();
        assert_eq!(a.checked_sub(b).unwrap_err(), MoneyError::Negative);
    }

    #[test]
    fn checked_add_overflow() {
        let a = Money::from_minor_units(i64::MAX).unwrap();
        let b = Money::from_minor_units(1).unwrap();
        assert_eq!(a.checked_add(b).unwrap_err(), MoneyError::Overflow);
    }
}
