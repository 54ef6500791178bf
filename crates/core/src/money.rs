//! Exact decimal money.
//!
//! Every amount in the ledger (refunds, coupon balances, deductions, pay
//! rates, salaries) is a [`Money`]. Arithmetic and equality are base-10
//! exact; `Money::parse("0.10") + Money::parse("0.20")` equals `0.30`.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::DomainError;

/// Number of fractional digits an input amount may carry.
pub const MONEY_SCALE: u32 = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, MONEY_SCALE))
    }

    /// Parses a caller-supplied amount, rejecting anything finer than cents.
    pub fn parse(field: &'static str, raw: &str) -> Result<Self, DomainError> {
        let value = Decimal::from_str(raw.trim())
            .map_err(|_| DomainError::validation(field, format!("`{raw}` is not a decimal amount")))?;
        Self(value).checked_scale(field)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Rejects amounts with more than two fractional digits.
    pub fn checked_scale(self, field: &'static str) -> Result<Self, DomainError> {
        if self.0.normalize().scale() > MONEY_SCALE {
            return Err(DomainError::validation(
                field,
                format!("{} has more than {MONEY_SCALE} decimal places", self.0),
            ));
        }
        Ok(self)
    }

    /// Validates a strictly positive, cent-precise input amount.
    pub fn require_positive(self, field: &'static str) -> Result<Self, DomainError> {
        let checked = self.checked_scale(field)?;
        if !checked.is_positive() {
            return Err(DomainError::validation(field, "must be greater than zero"));
        }
        Ok(checked)
    }

    /// `rate × count`, used for gross pay.
    pub fn times(self, count: u64) -> Self {
        Self(self.0 * Decimal::from(count))
    }

    pub fn clamp_to_zero(self) -> Self {
        if self.is_negative() {
            Self::ZERO
        } else {
            self
        }
    }

    /// How much of `self` is still outstanding after `paid`, never negative.
    pub fn shortfall(self, paid: Money) -> Self {
        (self - paid).clamp_to_zero()
    }

    /// Canonical two-decimal rendering, also the persisted form.
    pub fn to_fixed(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded =
            self.0.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        write!(f, "{rounded:.2}")
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse("amount", value)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |total, amount| total + amount)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |total, amount| total + *amount)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <Decimal as Deserialize>::deserialize(deserializer).map(Self)
    }
}
