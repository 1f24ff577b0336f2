// crates/link-locker-core/src/core/money.rs
// ============================================================================
// Module: Link Locker Money
// Description: Exact decimal amounts for CPM rates, payouts, and balances.
// Purpose: Avoid binary floating point drift in revenue arithmetic.
// Dependencies: bigdecimal, serde
// ============================================================================

//! ## Overview
//! [`Money`] wraps a [`BigDecimal`] so `4.50 / 1000` is exactly `0.0045`.
//! Amounts serialize as canonical decimal strings and deserialize from either
//! JSON numbers or strings, because ad networks send both.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use bigdecimal::Signed;
use bigdecimal::Zero;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Bounds applied while parsing a textual amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AmountLimits {
    /// Maximum length of the trimmed text.
    chars: usize,
    /// Maximum number of significant digits.
    digits: usize,
    /// Maximum normalized exponent magnitude, in either direction.
    exponent: i64,
}

/// Limits for amounts supplied by callers (payouts, CPM rows).
const INPUT_LIMITS: AmountLimits = AmountLimits {
    chars: MAX_AMOUNT_CHARS,
    digits: MAX_AMOUNT_DIGITS,
    exponent: MAX_AMOUNT_EXPONENT,
};

/// Limits for amounts rendered by [`Money`] itself, which may carry the extra
/// digits of per-mille rates and ledger sums.
const CANONICAL_LIMITS: AmountLimits = AmountLimits {
    chars: 128,
    digits: 96,
    exponent: 48,
};

/// Maximum length of a caller-supplied amount.
pub const MAX_AMOUNT_CHARS: usize = 64;
/// Maximum number of significant digits in a caller-supplied amount.
pub const MAX_AMOUNT_DIGITS: usize = 38;
/// Maximum decimal exponent magnitude of a caller-supplied amount.
pub const MAX_AMOUNT_EXPONENT: i64 = 18;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while parsing monetary amounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Input is not a decimal number.
    #[error("invalid decimal amount: {0}")]
    Invalid(String),
    /// Input is a negative amount where only non-negative values are allowed.
    #[error("amount must be non-negative: {0}")]
    Negative(String),
}

// ============================================================================
// SECTION: Money
// ============================================================================

/// Exact decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Money(BigDecimal);

impl Money {
    /// Returns the zero amount.
    #[must_use]
    pub fn zero() -> Self {
        Self(BigDecimal::zero())
    }

    /// Parses a decimal amount, allowing negative values.
    ///
    /// Amounts are bounded: at most [`MAX_AMOUNT_CHARS`] characters,
    /// [`MAX_AMOUNT_DIGITS`] significant digits, and a normalized exponent
    /// within `±MAX_AMOUNT_EXPONENT`.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Invalid`] when the input is not a decimal number
    /// or falls outside those bounds.
    pub fn parse(value: &str) -> Result<Self, MoneyError> {
        Self::parse_within(value, INPUT_LIMITS)
    }

    /// Parses an amount in the form [`Money`] renders, as read back from
    /// storage or serialized records.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Invalid`] when the input is not a decimal number
    /// or is too large to have been produced by ledger arithmetic.
    pub fn parse_canonical(value: &str) -> Result<Self, MoneyError> {
        Self::parse_within(value, CANONICAL_LIMITS)
    }

    /// Parses a decimal amount under explicit bounds.
    fn parse_within(value: &str, limits: AmountLimits) -> Result<Self, MoneyError> {
        let invalid = || MoneyError::Invalid(value.to_string());
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.len() > limits.chars {
            return Err(invalid());
        }
        let parsed = BigDecimal::from_str(trimmed).map_err(|_| invalid())?;
        let normalized = parsed.normalized();
        let (digits, scale) = normalized.as_bigint_and_exponent();
        let digit_count = digits.to_string().trim_start_matches('-').len();
        if digit_count > limits.digits || scale.abs() > limits.exponent {
            return Err(invalid());
        }
        Ok(Self(parsed))
    }

    /// Parses a decimal amount that must be zero or greater.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError`] when the input is not a decimal or is negative.
    pub fn parse_non_negative(value: &str) -> Result<Self, MoneyError> {
        let amount = Self::parse(value)?;
        if amount.is_negative() {
            return Err(MoneyError::Negative(value.to_string()));
        }
        Ok(amount)
    }

    /// Returns true when the amount is below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Returns true when the amount equals zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns this amount divided by one thousand (CPM to per-completion revenue).
    #[must_use]
    pub fn per_mille(&self) -> Self {
        let (digits, scale) = self.0.as_bigint_and_exponent();
        Self(BigDecimal::new(digits, scale.saturating_add(3)))
    }

    /// Returns the sum of two amounts.
    #[must_use]
    pub fn plus(&self, other: &Self) -> Self {
        Self(&self.0 + &other.0)
    }

    /// Returns `self - other`, floored at zero.
    #[must_use]
    pub fn minus_floor_zero(&self, other: &Self) -> Self {
        let difference = &self.0 - &other.0;
        if difference.is_negative() { Self::zero() } else { Self(difference) }
    }

    /// Sums an iterator of amounts.
    pub fn sum<'a>(amounts: impl IntoIterator<Item = &'a Self>) -> Self {
        amounts.into_iter().fold(Self::zero(), |acc, amount| acc.plus(amount))
    }

    /// Returns the canonical decimal representation (no trailing zeros, no exponent).
    fn canonical(&self) -> BigDecimal {
        let normalized = self.0.normalized();
        if normalized.as_bigint_and_exponent().1 < 0 {
            normalized.with_scale(0)
        } else {
            normalized
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.canonical().fmt(f)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

/// Serde visitor accepting decimal strings and JSON numbers.
struct MoneyVisitor;

impl de::Visitor<'_> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a decimal amount as a number or string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Money::parse_canonical(value).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(Money(BigDecimal::from(value)))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(Money(BigDecimal::from(value)))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        if !value.is_finite() {
            return Err(E::custom("amount must be finite"));
        }
        Money::parse(&value.to_string()).map_err(E::custom)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions use unwrap/expect for clarity."
    )]

    use super::MAX_AMOUNT_CHARS;
    use super::MAX_AMOUNT_DIGITS;
    use super::Money;

    fn money(value: &str) -> Money {
        Money::parse(value).expect("valid amount")
    }

    #[test]
    fn per_mille_is_exact() {
        let cpm = money("4.50");
        assert_eq!(cpm.per_mille(), money("0.0045"));
        assert_eq!(cpm.per_mille().to_string(), "0.0045");
    }

    #[test]
    fn display_has_no_exponent_for_whole_amounts() {
        assert_eq!(money("100.00").to_string(), "100");
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let from_number: Money = serde_json::from_str("2.0").expect("number");
        let from_string: Money = serde_json::from_str("\"2.00\"").expect("string");
        assert_eq!(from_number, from_string);
        assert_eq!(from_number, money("2"));
    }

    #[test]
    fn minus_floor_zero_never_goes_negative() {
        assert!(money("1").minus_floor_zero(&money("3")).is_zero());
        assert_eq!(money("3").minus_floor_zero(&money("1")), money("2"));
    }

    #[test]
    fn bounds_exponent_digits_and_length() {
        assert!(Money::parse("1e18").is_ok());
        assert!(Money::parse("1e-18").is_ok());
        assert!(Money::parse("1e19").is_err());
        assert!(Money::parse("1e-19").is_err());
        assert!(Money::parse("1e400000").is_err());
        assert!(Money::parse("1e20000000").is_err());
        assert!(Money::parse_non_negative("1e400000").is_err());

        assert!(Money::parse(&"9".repeat(MAX_AMOUNT_DIGITS)).is_ok());
        assert!(Money::parse(&"9".repeat(MAX_AMOUNT_DIGITS + 1)).is_err());
        assert!(Money::parse(&format!("0.{}", "9".repeat(18))).is_ok());
        assert!(Money::parse(&format!("0.{}", "9".repeat(MAX_AMOUNT_DIGITS + 1))).is_err());
        assert!(Money::parse(&"1".repeat(MAX_AMOUNT_CHARS + 1)).is_err());
    }

    #[test]
    fn canonical_parse_round_trips_ledger_arithmetic() {
        let rate = money("123456789012345678.123456789012345678").per_mille();
        let total = rate.plus(&money("999999999999999999"));
        assert!(Money::parse(&total.to_string()).is_err());
        assert_eq!(Money::parse_canonical(&total.to_string()).unwrap(), total);
        let json = serde_json::to_string(&total).unwrap();
        assert_eq!(serde_json::from_str::<Money>(&json).unwrap(), total);
        assert!(Money::parse_canonical("1e400000").is_err());
    }

    #[test]
    fn huge_float_payloads_are_rejected() {
        assert!(serde_json::from_str::<Money>("1e300").is_err());
        assert!(serde_json::from_str::<Money>("\"1e99999\"").is_err());
    }

    #[test]
    fn rejects_negative_when_required() {
        assert!(Money::parse_non_negative("-0.01").is_err());
        assert!(Money::parse_non_negative("abc").is_err());
        assert!(Money::parse_non_negative("0").is_ok());
    }
}
