use crate::domain::product::Product;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("product {uuid} changed since revision {expected}")]
    Conflict { uuid: String, expected: u64 },
    #[error("product {0} does not exist")]
    Missing(String),
    #[error("stored product is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("repository backend error: {0}")]
    Backend(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<Product>, RepositoryError>;

    /// Replace the whole stored document.
    ///
    /// Succeeds only while the stored revision still equals `product.revision`;
    /// returns the document as written, with its revision bumped.
    async fn save(&self, product: &Product) -> Result<Product, RepositoryError>;
}

#[async_trait]
impl<T: ProductRepository + ?Sized> ProductRepository for std::sync::Arc<T> {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<Product>, RepositoryError> {
        (**self).find_by_uuid(uuid).await
    }

    async fn save(&self, product: &Product) -> Result<Product, RepositoryError> {
        (**self).save(product).await
    }
}
