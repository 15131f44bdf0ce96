//! Cart Aggregate
//!
//! Pure line math for the buyer's pre-checkout selection. Persistence and
//! change notification live in [`crate::cart_store`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::Money;

/// Prices are stored to the cent; the blob carries floats that may not be.
fn to_cents(price: Decimal) -> Decimal { price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero) }

/// One product's quantity entry. Field names match the storefront's stored blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(rename = "id")]
    pub product_id: String,
    pub name: String,
    #[serde(rename = "price", with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartLine {
    pub fn line_total(&self) -> Money { Money::kes(self.unit_price).multiply(self.quantity) }
}

/// What the cart needs to know about a product to add it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartProduct { pub id: String, pub name: String, pub unit_price: Decimal }

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Builds a cart from untrusted lines: zero quantities and negative
    /// prices are dropped, prices rounded to the cent, duplicate product ids
    /// merged.
    pub fn from_lines(lines: Vec<CartLine>) -> Self {
        let mut cart = Self::new();
        for mut line in lines {
            if line.quantity == 0 || line.unit_price.is_sign_negative() { continue; }
            line.unit_price = to_cents(line.unit_price);
            match cart.lines.iter_mut().find(|l| l.product_id == line.product_id) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
                None => cart.lines.push(line),
            }
        }
        cart
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn line(&self, product_id: &str) -> Option<&CartLine> { self.lines.iter().find(|l| l.product_id == product_id) }

    /// Increments an existing line by `delta`, or creates one with
    /// `max(delta, 1)`.
    pub fn add(&mut self, product: &CartProduct, delta: i32) {
        if self.line(&product.id).is_some() {
            self.set_quantity(&product.id, delta);
        } else {
            self.lines.push(CartLine {
                product_id: product.id.clone(),
                name: product.name.clone(),
                unit_price: to_cents(product.unit_price),
                quantity: delta.max(1).unsigned_abs(),
            });
        }
    }

    /// Applies `delta` to a line, flooring at zero. A line that reaches zero
    /// is dropped. Returns false when no line matches.
    pub fn set_quantity(&mut self, product_id: &str, delta: i32) -> bool {
        let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product_id) else { return false };
        line.quantity = apply_delta(line.quantity, delta);
        self.lines.retain(|l| l.quantity > 0);
        true
    }

    pub fn remove(&mut self, product_id: &str) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        self.lines.len() != before
    }

    pub fn clear(&mut self) { self.lines.clear(); }

    pub fn total(&self) -> Money { self.lines.iter().map(CartLine::line_total).sum() }

    pub fn count(&self) -> u32 { self.lines.iter().fold(0u32, |acc, l| acc.saturating_add(l.quantity)) }
}

fn apply_delta(quantity: u32, delta: i32) -> u32 {
    if delta >= 0 {
        quantity.saturating_add(delta.unsigned_abs())
    } else {
        quantity.saturating_sub(delta.unsigned_abs())
    }
}
