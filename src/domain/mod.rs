//! Storefront domain model
pub mod aggregates;
pub mod events;
pub mod loyalty;
pub mod value_objects;

pub use aggregates::*;
pub use events::DomainEvent;
pub use loyalty::{LoyaltyProgress, LoyaltyTier};
pub use value_objects::{Money, Phone, PhoneError};
