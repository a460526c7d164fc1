//! Money type with decimal precision and currency.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! This type wraps `rust_decimal::Decimal` for arbitrary precision.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Represents a monetary amount with currency.
///
/// Uses `Decimal` internally to avoid floating-point precision errors.
/// Ledger lines carry signed amounts, so `amount` may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The signed amount in major currency units.
    pub amount: Decimal,
    /// ISO 4217 currency code (e.g., "USD", "IDR").
    pub currency: Currency,
}

/// ISO 4217 currency codes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// US Dollar
    Usd,
    /// Indonesian Rupiah
    Idr,
    /// Euro
    Eur,
    /// Singapore Dollar
    Sgd,
    /// Japanese Yen
    Jpy,
}

impl Currency {
    /// Number of decimal places in the currency's minor unit.
    #[must_use]
    pub const fn decimal_places(self) -> u32 {
        match self {
            Self::Usd | Self::Eur | Self::Sgd => 2,
            Self::Idr | Self::Jpy => 0,
        }
    }
}

impl Money {
    /// Creates a new Money instance.
    #[must_use]
    pub const fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Creates a zero amount in the specified currency.
    #[must_use]
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative()
    }

    /// Returns true if the amount is strictly positive.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        !self.amount.is_zero() && self.amount.is_sign_positive()
    }

    /// Returns the same amount with the sign flipped.
    #[must_use]
    pub fn negated(&self) -> Self {
        Self {
            amount: -self.amount,
            currency: self.currency,
        }
    }

    /// Returns true if the amount's scale fits the currency's minor unit.
    #[must_use]
    pub fn scale_fits_currency(&self) -> bool {
        self.amount.normalize().scale() <= self.currency.decimal_places()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usd => write!(f, "USD"),
            Self::Idr => write!(f, "IDR"),
            Self::Eur => write!(f, "EUR"),
            Self::Sgd => write!(f, "SGD"),
            Self::Jpy => write!(f, "JPY"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "IDR" => Ok(Self::Idr),
            "EUR" => Ok(Self::Eur),
            "SGD" => Ok(Self::Sgd),
            "JPY" => Ok(Self::Jpy),
            _ => Err(format!("Unknown currency: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_money_new() {
        let amount = dec!(100.00);
        let money = Money::new(amount, Currency::Usd);
        assert_eq!(money.amount, amount);
        assert_eq!(money.currency, Currency::Usd);
    }

    #[test]
    fn test_money_zero() {
        let money = Money::zero(Currency::Idr);
        assert!(money.is_zero());
        assert_eq!(money.amount, Decimal::ZERO);
        assert_eq!(money.currency, Currency::Idr);
    }

    #[test]
    fn test_money_signs() {
        let positive = Money::new(dec!(10), Currency::Usd);
        assert!(positive.is_positive());
        assert!(!positive.is_negative());

        let negative = Money::new(dec!(-10), Currency::Usd);
        assert!(negative.is_negative());
        assert!(!negative.is_positive());

        let zero = Money::new(dec!(0), Currency::Usd);
        assert!(!zero.is_negative());
        assert!(!zero.is_positive());
    }

    #[test]
    fn test_money_negated() {
        let money = Money::new(dec!(25.50), Currency::Sgd);
        let flipped = money.negated();
        assert_eq!(flipped.amount, dec!(-25.50));
        assert_eq!(flipped.currency, Currency::Sgd);
        assert_eq!(flipped.negated(), money);
    }

    #[test]
    fn test_scale_fits_currency() {
        assert!(Money::new(dec!(10.55), Currency::Usd).scale_fits_currency());
        assert!(!Money::new(dec!(10.555), Currency::Usd).scale_fits_currency());
        // Trailing zeros do not count against the scale.
        assert!(Money::new(dec!(10.00), Currency::Jpy).scale_fits_currency());
        assert!(!Money::new(dec!(10.5), Currency::Jpy).scale_fits_currency());
    }

    #[rstest]
    #[case(Currency::Usd, "USD", 2)]
    #[case(Currency::Idr, "IDR", 0)]
    #[case(Currency::Eur, "EUR", 2)]
    #[case(Currency::Sgd, "SGD", 2)]
    #[case(Currency::Jpy, "JPY", 0)]
    fn test_currency_table(#[case] currency: Currency, #[case] code: &str, #[case] places: u32) {
        assert_eq!(currency.to_string(), code);
        assert_eq!(currency.decimal_places(), places);
        assert_eq!(Currency::from_str(code).unwrap(), currency);
        assert_eq!(
            Currency::from_str(&code.to_lowercase()).unwrap(),
            currency
        );
    }

    #[test]
    fn test_unknown_currency_rejected() {
        assert!(Currency::from_str("XXX").is_err());
        assert!(Currency::from_str("").is_err());
    }
}
