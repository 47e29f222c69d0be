//! Value Objects for the point of sale

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub const MAX_LEN: usize = 50;

    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > Self::MAX_LEN { return Err(SkuError::TooLong); }
        if value.chars().any(char::is_whitespace) { return Err(SkuError::Whitespace); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SkuError { Empty, TooLong, Whitespace }
impl std::error::Error for SkuError {}
impl fmt::Display for SkuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "SKU empty"),
            Self::TooLong => write!(f, "SKU longer than {} characters", Sku::MAX_LEN),
            Self::Whitespace => write!(f, "SKU contains whitespace"),
        }
    }
}

/// Money value object in the store currency.
///
/// Amounts keep full precision while they are summed; [`Money::round`] brings
/// them to cents the way receipts show them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    /// `Money::cents(1999)` is 19.99.
    pub fn cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn round(&self) -> Money { Money(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)) }
    /// Saturates at the largest representable amount; use [`Money::checked_mul`]
    /// where the caller supplies the operands.
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0.saturating_mul(Decimal::from(qty))) }
    pub fn checked_mul(&self, qty: u32) -> Option<Money> { self.0.checked_mul(Decimal::from(qty)).map(Money) }
    pub fn checked_add(&self, rhs: Money) -> Option<Money> { self.0.checked_add(rhs.0).map(Money) }
    pub fn to_f64(&self) -> f64 { self.0.to_f64().unwrap_or_default() }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0.saturating_add(rhs.0)) }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0.saturating_sub(rhs.0)) }
}

impl Mul<u32> for Money {
    type Output = Money;
    fn mul(self, rhs: u32) -> Money { self.multiply(rhs) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self { Money(amount) }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Decimal::from_str(s.trim()).map(Money) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.round().0) }
}

/// Sales tax as a fraction of the subtotal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(Decimal);

impl TaxRate {
    /// 16% IVA, the rate every receipt of the store carries.
    pub const STANDARD: TaxRate = TaxRate(Decimal::from_parts(16, 0, 0, false, 2));

    pub fn new(fraction: Decimal) -> Result<Self, TaxRateError> {
        if fraction.is_sign_negative() || fraction >= Decimal::ONE { return Err(TaxRateError::OutOfRange(fraction)); }
        Ok(Self(fraction))
    }
    pub fn fraction(&self) -> Decimal { self.0 }
    pub fn tax_on(&self, subtotal: Money) -> Money { Money(subtotal.amount() * self.0).round() }
}

impl Default for TaxRate { fn default() -> Self { Self::STANDARD } }

#[derive(Debug, Clone)] pub enum TaxRateError { OutOfRange(Decimal) }
impl std::error::Error for TaxRateError {}
impl fmt::Display for TaxRateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::OutOfRange(v) => write!(f, "tax rate {v} must be in [0, 1)") }
    }
}

/// Subtotal, tax and total of a sale or purchase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

impl Totals {
    pub fn from_subtotal(subtotal: Money, rate: TaxRate) -> Self {
        let subtotal = subtotal.round();
        let tax = rate.tax_on(subtotal);
        Self { subtotal, tax, total: subtotal + tax }
    }

    pub fn from_lines<I: IntoIterator<Item = Money>>(lines: I, rate: TaxRate) -> Self {
        Self::from_subtotal(lines.into_iter().sum(), rate)
    }

    /// `None` when the subtotal or total does not fit in a `Money`.
    pub fn checked_from_lines<I: IntoIterator<Item = Money>>(lines: I, rate: TaxRate) -> Option<Self> {
        let subtotal = lines.into_iter().try_fold(Money::ZERO, |acc, line| acc.checked_add(line))?.round();
        let tax = rate.tax_on(subtotal);
        Some(Self { subtotal, tax, total: subtotal.checked_add(tax)? })
    }

    pub fn is_consistent(&self) -> bool { self.total == self.subtotal + self.tax }
}
