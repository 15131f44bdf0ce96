//! Product/Category catalog reader

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::domain::{Category, Product};
use crate::store::{RecordStore, Result};

#[derive(Clone)]
pub struct CatalogReader {
    store: Arc<dyn RecordStore>,
}

impl CatalogReader {
    pub fn new(store: Arc<dyn RecordStore>) -> Self { Self { store } }

    /// Active categories by display order.
    pub async fn categories(&self) -> Result<Vec<Category>> { self.store.active_categories().await }

    /// Active products, newest first, optionally within one category.
    pub async fn products(&self, category_id: Option<Uuid>) -> Result<Vec<Product>> {
        let products = self.store.active_products(category_id).await?;
        debug!(category_id = ?category_id, count = products.len(), "catalog products read");
        Ok(products)
    }

    /// Products of the active category with this slug. An unknown or
    /// inactive category yields `None`.
    pub async fn products_in(&self, category_slug: &str) -> Result<Option<Vec<Product>>> {
        let categories = self.store.active_categories().await?;
        let Some(category) = categories.into_iter().find(|c| c.slug == category_slug) else { return Ok(None) };
        self.products(Some(category.id)).await.map(Some)
    }

    pub async fn featured(&self) -> Result<Vec<Product>> {
        Ok(self.store.active_products(None).await?.into_iter().filter(|p| p.is_featured).collect())
    }

    /// Detail lookup; only active products are visible.
    pub async fn product(&self, slug: &str) -> Result<Option<Product>> { self.store.product_by_slug(slug).await }
}
