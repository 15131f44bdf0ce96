//! Cart Store
//!
//! Client-resident cart persisted to durable key/value storage. Every
//! mutation rewrites the full line set and the derived count, then
//! broadcasts a payload-less [`CartUpdated`] signal; subscribers re-read
//! the count themselves with [`stored_count`].

mod storage;

use std::path::Path;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::{Cart, CartLine, CartProduct, Money};

pub use storage::{CartStorage, FileStorage, MemoryStorage};

pub const CART_DATA_KEY: &str = "amilax_cart_data";
pub const CART_COUNT_KEY: &str = "amilax_cart_count";
/// Name of the broadcast signal, as the navigation badge listens for it.
pub const CART_UPDATE_EVENT: &str = "cartUpdate";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CartUpdated;

#[derive(Debug, Error)]
pub enum CartError {
    #[error("cart storage at {path}: {source}")]
    Storage { path: String, source: std::io::Error },
}

impl CartError {
    pub(crate) fn storage(path: &Path, source: std::io::Error) -> Self {
        Self::Storage { path: path.display().to_string(), source }
    }
}

pub struct CartStore<S> {
    storage: S,
    cart: Cart,
    events: broadcast::Sender<CartUpdated>,
}

impl<S: CartStorage> CartStore<S> {
    /// Loads the cart from storage. Missing, unreadable or malformed
    /// content yields an empty cart.
    pub fn open(storage: S) -> Self {
        let cart = read_cart(&storage);
        let (events, _) = broadcast::channel(16);
        Self { storage, cart, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CartUpdated> { self.events.subscribe() }

    pub fn storage(&self) -> &S { &self.storage }
    pub fn lines(&self) -> &[CartLine] { self.cart.lines() }
    pub fn is_empty(&self) -> bool { self.cart.is_empty() }
    pub fn snapshot(&self) -> Cart { self.cart.clone() }
    pub fn total(&self) -> Money { self.cart.total() }
    pub fn count(&self) -> u32 { self.cart.count() }

    pub fn add(&mut self, product: &CartProduct, delta: i32) -> Result<(), CartError> {
        let mut next = self.cart.clone();
        next.add(product, delta);
        self.commit(next)
    }

    pub fn set_quantity(&mut self, product_id: &str, delta: i32) -> Result<(), CartError> {
        let mut next = self.cart.clone();
        next.set_quantity(product_id, delta);
        self.commit(next)
    }

    pub fn remove(&mut self, product_id: &str) -> Result<(), CartError> {
        let mut next = self.cart.clone();
        next.remove(product_id);
        self.commit(next)
    }

    pub fn clear(&mut self) -> Result<(), CartError> { self.commit(Cart::new()) }

    /// Re-reads durable storage, picking up writes made by another store
    /// over the same backend.
    pub fn reload(&mut self) { self.cart = read_cart(&self.storage); }

    /// Lines first, then the count. A failed count write puts the previous
    /// lines back so storage never pairs new lines with an old count.
    fn commit(&mut self, next: Cart) -> Result<(), CartError> {
        self.storage.save(CART_DATA_KEY, &blob(&next))?;
        if let Err(e) = self.storage.save(CART_COUNT_KEY, &next.count().to_string()) {
            if let Err(restore) = self.storage.save(CART_DATA_KEY, &blob(&self.cart)) {
                warn!(error = %restore, "cart lines not restored after failed count write");
            }
            return Err(e);
        }
        self.cart = next;
        debug!(event = CART_UPDATE_EVENT, count = self.cart.count(), "cart persisted");
        // No subscribers is fine.
        let _ = self.events.send(CartUpdated);
        Ok(())
    }
}

fn blob(cart: &Cart) -> String { serde_json::to_string(cart.lines()).unwrap_or_else(|_| "[]".to_string()) }

/// The badge count as persisted; malformed or missing reads as zero.
pub fn stored_count<S: CartStorage + ?Sized>(storage: &S) -> u32 {
    storage.load(CART_COUNT_KEY).ok().flatten().and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

fn read_cart<S: CartStorage + ?Sized>(storage: &S) -> Cart {
    let raw = match storage.load(CART_DATA_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Cart::new(),
        Err(e) => {
            warn!(error = %e, "cart storage unreadable, starting empty");
            return Cart::new();
        }
    };
    match serde_json::from_str::<Vec<CartLine>>(&raw) {
        Ok(lines) => Cart::from_lines(lines),
        Err(e) => {
            warn!(error = %e, "malformed cart blob, starting empty");
            Cart::new()
        }
    }
}
