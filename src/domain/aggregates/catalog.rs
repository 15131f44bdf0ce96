//! Catalog records: categories and products

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub display_order: i32,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock_count: i32,
    pub image_url: Option<String>,
    pub sku: Option<String>,
    pub category_id: Option<Uuid>,
    /// Pharmacy leaflet sections shown on the detail page.
    pub ingredients: Option<String>,
    pub dosage: Option<String>,
    pub warnings: Option<String>,
    pub is_in_stock: bool,
    pub is_featured: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: impl Into<String>, display_order: i32) -> Self {
        let name = name.into();
        Self { id: Uuid::now_v7(), slug: slugify(&name), name, description: None, display_order, is_active: true }
    }
}

impl Product {
    /// An active, in-stock product with a slug derived from its name.
    pub fn new(name: impl Into<String>, price: Decimal, category_id: Option<Uuid>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::now_v7(), slug: slugify(&name), name, description: None, price, stock_count: 0,
            image_url: None, sku: None, category_id, ingredients: None, dosage: None, warnings: None,
            is_in_stock: true, is_featured: false, is_active: true, created_at: Utc::now(),
        }
    }
}

/// Lowercase, hyphen-separated slug derived from a display name.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
