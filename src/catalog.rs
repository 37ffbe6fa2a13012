//! Product catalog collaborator.
//!
//! Catalog master data lives outside this crate; order creation only needs
//! existence and a coarse stock figure for the advisory pre-flight check.
//! The authoritative availability check happens against the stock ledger at
//! confirmation time.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductSummary {
    pub id: Uuid,
    /// Catalog-level quantity; coarse and possibly stale.
    pub stock_quantity: i32,
}

#[async_trait]
pub trait ProductLookup: Send + Sync {
    async fn find_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<ProductSummary>, ServiceError>;
}

/// In-memory catalog used by tests and demos. Production deployments plug in
/// an implementation backed by the catalog service.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: DashMap<(Uuid, Uuid), ProductSummary>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, tenant_id: Uuid, product: ProductSummary) {
        self.products.insert((tenant_id, product.id), product);
    }
}

#[async_trait]
impl ProductLookup for InMemoryCatalog {
    async fn find_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<ProductSummary>, ServiceError> {
        Ok(self
            .products
            .get(&(tenant_id, product_id))
            .map(|entry| *entry))
    }
}
