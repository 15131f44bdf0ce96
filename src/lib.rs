//! Amilax Commerce
//!
//! Cart, checkout and loyalty core for the Amilax pharmacy storefront.
//!
//! ## Features
//! - Durable client cart with change broadcast
//! - Catalog reads (categories, products, detail by slug)
//! - Checkout to order plus order items
//! - Customer loyalty reconciliation and tiers
//! - Order tracking and admin back-office operations
//! - Account view and address book

pub mod api;
pub mod cart_store;
pub mod config;
pub mod domain;
pub mod services;
pub mod store;

use thiserror::Error;

pub use cart_store::{CartError, CartStorage, CartStore};
pub use config::{Config, ConfigError};
pub use store::{RecordStore, StoreError};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Validation(#[from] services::ValidationError),

    #[error(transparent)]
    Checkout(#[from] services::CheckoutError),

    #[error(transparent)]
    Account(#[from] services::AccountError),

    #[error(transparent)]
    Admin(#[from] services::AdminError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("sign in required")]
    Unauthenticated,
}

pub type Result<T> = std::result::Result<T, Error>;
