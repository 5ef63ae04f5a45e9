use crate::error::LedgerError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Fractional digits carried by monetary values.
pub const MONEY_SCALE: u32 = 4;
/// Fractional digits carried by annual interest rates.
pub const RATE_SCALE: u32 = 6;
/// Fractional digits reported for per-day interest rates.
pub const DAILY_RATE_SCALE: u32 = 10;

/// Rounds half-up to the given number of fractional digits.
///
/// All money and rate math in the crate routes through `rust_decimal`; this is
/// the only rounding mode it is allowed to use.
pub fn round_half_up(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Formats a decimal as a canonical fixed-fraction string, e.g. `"1000.0000"`.
///
/// Every amount returned to callers goes through this so textual output is
/// deterministic regardless of the internal scale.
pub fn to_fixed(value: Decimal, scale: u32) -> String {
    format!("{:.*}", scale as usize, round_half_up(value, scale))
}

/// A wallet balance with 4 decimal places of precision.
///
/// Wrapper around `rust_decimal::Decimal` to keep balances distinct from raw
/// decimals and from transfer amounts.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Canonical 4-decimal string form.
    pub fn to_canonical(&self) -> String {
        to_fixed(self.0, MONEY_SCALE)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical())
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// A positive monetary amount with at most 4 fractional digits.
///
/// Transfer and funding amounts are validated at construction so the engines
/// only ever see well-formed values.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, LedgerError> {
        if value <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        if value != round_half_up(value, MONEY_SCALE) {
            return Err(LedgerError::Validation(format!(
                "amount must have at most {MONEY_SCALE} decimal places"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn to_canonical(&self) -> String {
        to_fixed(self.0, MONEY_SCALE)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

/// An annual interest rate in percent, positive, at most 6 fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Rate(Decimal);

impl Rate {
    pub fn new(value: Decimal) -> Result<Self, LedgerError> {
        if value <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "annual rate must be positive".to_string(),
            ));
        }
        if value != round_half_up(value, RATE_SCALE) {
            return Err(LedgerError::Validation(format!(
                "annual rate must have at most {RATE_SCALE} decimal places"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn to_canonical(&self) -> String {
        to_fixed(self.0, RATE_SCALE)
    }
}

impl TryFrom<Decimal> for Rate {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_arithmetic() {
        let b1 = Balance::new(dec!(10.0));
        let b2 = Balance::new(dec!(5.0));
        assert_eq!(b1 + b2, Balance::new(dec!(15.0)));
        assert_eq!(b1 - b2, Balance::new(dec!(5.0)));
    }

    #[test]
    fn test_amount_must_be_positive() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_amount_precision_limit() {
        assert!(Amount::new(dec!(0.0001)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.00001)),
            Err(LedgerError::Validation(_))
        ));
        // Trailing zeros beyond the scale are still the same number
        assert!(Amount::new(dec!(1.50000)).is_ok());
    }

    #[test]
    fn test_rate_precision_limit() {
        assert!(Rate::new(dec!(27.5)).is_ok());
        assert!(Rate::new(dec!(0.000001)).is_ok());
        assert!(matches!(
            Rate::new(dec!(0.0000001)),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_rounding_is_half_up() {
        assert_eq!(round_half_up(dec!(75.34245), 4), dec!(75.3425));
        assert_eq!(round_half_up(dec!(75.34244), 4), dec!(75.3424));
        assert_eq!(round_half_up(dec!(0.00005), 4), dec!(0.0001));
    }

    #[test]
    fn test_canonical_formatting() {
        assert_eq!(to_fixed(dec!(1000), MONEY_SCALE), "1000.0000");
        assert_eq!(to_fixed(dec!(0), MONEY_SCALE), "0.0000");
        assert_eq!(to_fixed(dec!(75.34246575), MONEY_SCALE), "75.3425");
        assert_eq!(
            to_fixed(dec!(0.07534246575342), DAILY_RATE_SCALE),
            "0.0753424658"
        );
    }
}
