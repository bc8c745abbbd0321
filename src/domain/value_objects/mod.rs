//! Value Objects for the storefront

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Discount percentage, strictly between 0 and 100.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub fn new(value: Decimal) -> Result<Self, PercentageError> {
        if value <= Decimal::ZERO || value >= Decimal::ONE_HUNDRED {
            return Err(PercentageError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal { self.0 }
}

impl TryFrom<Decimal> for Percentage {
    type Error = PercentageError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Percentage> for Decimal {
    fn from(p: Percentage) -> Self { p.0 }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PercentageError {
    #[error("discount must be greater than 0 and less than 100, got {0}")]
    OutOfRange(Decimal),
}

/// Rounds a monetary amount to cents.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a monetary amount to the gateway's integer minor units (cents).
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    use rust_decimal::prelude::ToPrimitive;
    (round_money(amount) * Decimal::ONE_HUNDRED).to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percentage_bounds() {
        assert!(Percentage::new(dec!(0)).is_err());
        assert!(Percentage::new(dec!(100)).is_err());
        assert!(Percentage::new(dec!(-5)).is_err());
        assert_eq!(Percentage::new(dec!(10)).unwrap().value(), dec!(10));
    }

    #[test]
    fn percentage_rejects_out_of_range_on_deserialize() {
        let parsed: Result<Percentage, _> = serde_json::from_str("\"150\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn minor_units() {
        assert_eq!(to_minor_units(dec!(180)), Some(18000));
        assert_eq!(to_minor_units(dec!(12.345)), Some(1235));
    }
}
