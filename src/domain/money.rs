use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

/// Maximum number of decimal places an amount may carry: minor units only,
/// no fractional cents.
pub const MAX_SCALE: u32 = 2;

/// ISO-ish currency codes the engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Ngn,
    Kes,
    Ghs,
}

impl FromStr for Currency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "NGN" => Ok(Self::Ngn),
            "KES" => Ok(Self::Kes),
            "GHS" => Ok(Self::Ghs),
            other => Err(LedgerError::UnsupportedCurrency(other.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Ngn => "NGN",
            Self::Kes => "KES",
            Self::Ghs => "GHS",
        };
        f.write_str(code)
    }
}

fn check_scale(value: Decimal) -> Result<()> {
    if value.normalize().scale() > MAX_SCALE {
        return Err(LedgerError::InvalidAmount(format!(
            "{value} has sub-minor-unit precision"
        )));
    }
    Ok(())
}

/// A strictly positive monetary amount with at most [`MAX_SCALE`] decimal
/// places.
///
/// Wraps `rust_decimal::Decimal` so that validation happens once, at the
/// boundary, and the rest of the engine can assume well-formed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "amount must be positive, got {value}"
            )));
        }
        check_scale(value)?;
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A non-zero signed balance movement: positive credits, negative debits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignedAmount(Decimal);

impl SignedAmount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value.is_zero() {
            return Err(LedgerError::InvalidAmount(
                "movement must be non-zero".to_string(),
            ));
        }
        check_scale(value)?;
        Ok(Self(value))
    }

    pub fn credit(amount: Amount) -> Self {
        Self(amount.0)
    }

    pub fn debit(amount: Amount) -> Self {
        Self(-amount.0)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_credit(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A wallet's running balance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Balance(pub Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Balance after applying a signed movement.
    pub fn apply(&self, movement: SignedAmount) -> Self {
        Self(self.0 + movement.0)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
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

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amount_must_be_positive() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn amount_rejects_sub_minor_units() {
        assert!(Amount::new(dec!(10.99)).is_ok());
        assert!(matches!(
            Amount::new(dec!(10.999)),
            Err(LedgerError::InvalidAmount(_))
        ));
        // trailing zeros beyond the scale are fine
        assert!(Amount::new(dec!(10.9900)).is_ok());
    }

    #[test]
    fn signed_amount_direction() {
        let amount = Amount::new(dec!(5.00)).unwrap();
        assert!(SignedAmount::credit(amount).is_credit());
        assert!(!SignedAmount::debit(amount).is_credit());
        assert_eq!(SignedAmount::debit(amount).value(), dec!(-5.00));
    }

    #[test]
    fn signed_amount_rejects_zero() {
        assert!(matches!(
            SignedAmount::new(dec!(0)),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn balance_arithmetic() {
        let b1 = Balance::new(dec!(10.0));
        let b2 = Balance::new(dec!(5.0));
        assert_eq!(b1 + b2, Balance::new(dec!(15.0)));
        assert_eq!(b1 - b2, Balance::new(dec!(5.0)));
    }

    #[test]
    fn balance_apply_movement() {
        let amount = Amount::new(dec!(3.50)).unwrap();
        let credited = Balance::ZERO.apply(SignedAmount::credit(amount));
        assert_eq!(credited, Balance::new(dec!(3.50)));
        let debited = credited.apply(SignedAmount::debit(Amount::new(dec!(4)).unwrap()));
        assert!(debited.is_negative());
    }

    #[test]
    fn currency_parsing() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!("NGN".parse::<Currency>().unwrap(), Currency::Ngn);
        assert!(matches!(
            "XTS".parse::<Currency>(),
            Err(LedgerError::UnsupportedCurrency(_))
        ));
    }
}
