use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::str::FromStr;

use crate::errors::{LendingError, Result};

/// number of minor-unit digits carried by every currency amount (kobo)
pub const MONEY_SCALE: u32 = 2;

/// currency amount fixed at two decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::from_parts(0, 0, 0, false, MONEY_SCALE));
    pub const ONE: Money = Money(Decimal::from_parts(100, 0, 0, false, MONEY_SCALE));
    pub const KOBO: Money = Money(Decimal::from_parts(1, 0, 0, false, MONEY_SCALE));

    /// create from decimal, rounding half-up to the nearest minor unit
    pub fn from_decimal(d: Decimal) -> Self {
        Money(normalize(d.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)))
    }

    /// create from decimal, truncating toward zero to the nearest minor unit
    pub fn from_decimal_floor(d: Decimal) -> Self {
        Money(normalize(d.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero)))
    }

    /// create from decimal; rejects values finer than one minor unit
    pub fn from_decimal_exact(d: Decimal) -> Result<Self> {
        if d.normalize().scale() > MONEY_SCALE {
            return Err(LendingError::InvalidAmount { value: d.to_string() });
        }
        Ok(Money(normalize(d)))
    }

    /// create from string; rejects values finer than one minor unit
    pub fn from_str_exact(s: &str) -> Result<Self> {
        let d = Decimal::from_str(s.trim()).map_err(|_| LendingError::InvalidAmount {
            value: s.to_string(),
        })?;
        Money::from_decimal_exact(d)
    }

    /// create from whole currency units (naira, dollars)
    pub fn from_major(amount: i64) -> Self {
        Money(normalize(Decimal::from(amount)))
    }

    /// create from minor units (kobo, cents)
    pub fn from_minor(amount: i64) -> Self {
        Money(Decimal::new(amount, MONEY_SCALE))
    }

    /// amount expressed in minor units
    pub fn to_minor(&self) -> Result<i64> {
        let minor = normalize(self.0).mantissa();
        i64::try_from(minor).map_err(|_| LendingError::InvalidAmount {
            value: format!("{} does not fit in minor units", self),
        })
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    /// subtraction clamped at zero
    pub fn saturating_sub(self, other: Self) -> Self {
        (self - other).max(Money::ZERO)
    }

    /// multiply by a rate fraction (0.15 for 15%), rounding half-up
    pub fn apply_rate(&self, rate: Rate) -> Self {
        Money::from_decimal(self.0 * rate.as_decimal())
    }

    /// percentage of this amount (2.5 for 2.5%), rounding half-up
    pub fn percentage(&self, percent: Decimal) -> Self {
        Money::from_decimal(self.0 * percent / Decimal::from(100))
    }

    /// split into `parts` equal shares floored to the minor unit
    ///
    /// returns the regular share and the final share, which absorbs the
    /// remainder so that `share * (parts - 1) + last == self`
    pub fn split_floor(&self, parts: u32) -> Result<(Money, Money)> {
        if parts == 0 {
            return Err(LendingError::CalculationError {
                message: "cannot split an amount into zero parts".to_string(),
            });
        }
        let share = Money::from_decimal_floor(self.0 / Decimal::from(parts));
        let last = *self - Money(share.0 * Decimal::from(parts - 1));
        Ok((share, Money(normalize(last.0))))
    }
}

fn normalize(mut d: Decimal) -> Decimal {
    d.rescale(MONEY_SCALE);
    d
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::ZERO
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let d = Decimal::deserialize(deserializer)?;
        Money::from_decimal_exact(d).map_err(serde::de::Error::custom)
    }
}

impl FromStr for Money {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self> {
        Money::from_str_exact(s)
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::from_decimal(d)
    }
}

impl From<i32> for Money {
    fn from(i: i32) -> Self {
        Money::from_major(i as i64)
    }
}

impl From<u32> for Money {
    fn from(i: u32) -> Self {
        Money::from_major(i as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money(normalize(self.0 + other.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        self.0 = normalize(self.0 + other.0);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money(normalize(self.0 - other.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Money) {
        self.0 = normalize(self.0 - other.0);
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, other: Decimal) -> Money {
        Money::from_decimal(self.0 * other)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}

/// rate type for interest rates, fee percentages, and ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);
    pub const ONE: Rate = Rate(Decimal::ONE);

    /// create from decimal fraction (e.g., 0.15 for 15%)
    pub fn from_decimal(d: Decimal) -> Self {
        Rate(d)
    }

    /// create from percentage (e.g., 15 for 15%)
    pub fn from_percentage(p: Decimal) -> Self {
        Rate(p / Decimal::from(100))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn as_percentage(&self) -> Decimal {
        self.0 * Decimal::from(100)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().normalize())
    }
}

impl From<Decimal> for Rate {
    fn from(d: Decimal) -> Self {
        Rate::from_decimal(d)
    }
}
