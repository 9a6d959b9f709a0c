use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of provider minor units (kobo, cents, ...) in one major unit.
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

const MONEY_DECIMAL_PLACES: u32 = 2;

//--------------------------------------       Money        ---------------------------------------------------------
/// A monetary amount in major units (e.g. `95.00`). Backed by a `Decimal` so that commission arithmetic is exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

// Arithmetic is exact; only `percentage` and `to_minor_units` round.
macro_rules! money_arithmetic {
    ($($op:ident::$op_fn:ident / $assign:ident::$assign_fn:ident),+) => {
        $(
            impl $op for Money {
                type Output = Money;

                fn $op_fn(self, rhs: Money) -> Money {
                    Money(self.0.$op_fn(rhs.0))
                }
            }

            impl $assign for Money {
                fn $assign_fn(&mut self, rhs: Money) {
                    self.0.$assign_fn(rhs.0);
                }
            }
        )+
    };
}

money_arithmetic!(Add::add / AddAssign::add_assign, Sub::sub / SubAssign::sub_assign);

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as money: {0}")]
pub struct MoneyConversionError(String);

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Self).map_err(|e| MoneyConversionError(format!("{s}: {e}")))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Money {
    pub fn new(num: i64, scale: u32) -> Self {
        Self(Decimal::new(num, scale))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Returns `self × rate`, rounded half-away-from-zero to two decimal places.
    pub fn percentage(&self, rate: Decimal) -> Self {
        Self((self.0 * rate).round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Converts the amount into integer minor units, the way most payment providers expect amounts to be sent.
    pub fn to_minor_units(&self) -> Result<i64, MoneyConversionError> {
        let minor = (self.0 * Decimal::from(MINOR_UNITS_PER_MAJOR))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        minor.to_i64().ok_or_else(|| MoneyConversionError(format!("{self} is out of range for minor units")))
    }

    pub fn from_minor_units(minor: i64) -> Self {
        Self(Decimal::new(minor, MONEY_DECIMAL_PLACES))
    }
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn commission_split_is_exact() {
        let amount = Money::from(100);
        let commission = amount.percentage(dec!(0.05));
        assert_eq!(commission, Money::from(5));
        assert_eq!(amount - commission, Money::from(95));
    }

    #[test]
    fn percentage_rounds_to_cents() {
        let amount = Money::from_str("33.33").unwrap();
        // 33.33 × 0.05 = 1.6665
        assert_eq!(amount.percentage(dec!(0.05)), Money::new(167, 2));
    }

    #[test]
    fn minor_units() {
        assert_eq!(Money::from(190).to_minor_units().unwrap(), 19_000);
        assert_eq!(Money::from_str("12.345").unwrap().to_minor_units().unwrap(), 1235);
        assert_eq!(Money::from_minor_units(950), Money::new(95, 1));
    }

    #[test]
    fn display_and_serde() {
        let m = Money::new(95, 0);
        assert_eq!(m.to_string(), "95.00");
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "\"95\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn arithmetic() {
        let mut total = Money::from(10);
        total += Money::from(5);
        total -= Money::from(3);
        assert_eq!(total, Money::from(12));
        assert_eq!(-total, Money::from(-12));
        assert!((-total).is_negative());
        let sum: Money = vec![Money::from(1), Money::from(2)].into_iter().sum();
        assert_eq!(sum, Money::from(3));
    }
}
