//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Customer phone number, the natural key for guest customers.
///
/// Whitespace is stripped so "0700 111 222" and "0700111222" key the same
/// customer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    pub fn new(value: impl AsRef<str>) -> Result<Self, PhoneError> {
        let value: String = value.as_ref().chars().filter(|c| !c.is_whitespace()).collect();
        if value.is_empty() { return Err(PhoneError::Empty); }
        if value.len() > 20 { return Err(PhoneError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Phone {
    type Error = PhoneError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self { phone.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhoneError {
    #[error("phone number is empty")]
    Empty,
    #[error("phone number is too long")]
    TooLong,
}

/// Money value object. The storefront trades in a single currency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money { amount: Decimal }

impl Money {
    pub const CURRENCY: &'static str = "KES";

    pub fn kes(amount: Decimal) -> Self { Self { amount } }
    pub fn zero() -> Self { Self::kes(Decimal::ZERO) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn add(&self, other: &Money) -> Money { Money::kes(self.amount + other.amount) }
    pub fn multiply(&self, qty: u32) -> Money { Money::kes(self.amount * Decimal::from(qty)) }
}

impl Default for Money { fn default() -> Self { Self::zero() } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", Self::CURRENCY, self.amount.normalize())
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self { iter.fold(Money::zero(), |acc, m| acc.add(&m)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_phone_strips_whitespace() {
        let phone = Phone::new(" 0700 111 222 ").unwrap();
        assert_eq!(phone.as_str(), "0700111222");
        assert_eq!(Phone::new("   "), Err(PhoneError::Empty));
    }
    #[test]
    fn test_money_display_and_sum() {
        let total: Money = [Money::kes(Decimal::new(2400, 0)), Money::kes(Decimal::new(850, 0))].into_iter().sum();
        assert_eq!(total.amount(), Decimal::new(3250, 0));
        assert_eq!(total.to_string(), "KES 3250");
        assert_eq!(Money::kes(Decimal::new(1200, 0)).multiply(2).amount(), Decimal::new(2400, 0));
    }
}
