//! In-process adapters.
//!
//! Used for `REPOSITORY_BACKEND=memory` development runs and by the HTTP tests.

use crate::domain::jobs::UploadJob;
use crate::domain::product::Product;
use crate::ports::repository::{ProductRepository, RepositoryError};
use crate::ports::storage::{ObjectStorage, StorageError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Default)]
struct Objects {
    stored: BTreeMap<String, StoredObject>,
    /// Filenames whose uploads are rejected.
    failing: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Objects>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upload whose destination filename is `filename` fail.
    pub fn fail_uploads_of(&self, filename: impl Into<String>) {
        self.lock().failing.insert(filename.into());
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().stored.keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().stored.get(key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Objects> {
        // a panicking test thread must not take the others down with it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(&self, job: &UploadJob) -> Result<(), StorageError> {
        if self.lock().failing.contains(&job.filename) {
            return Err(StorageError::Backend {
                key: job.key(),
                message: "upload rejected".to_string(),
            });
        }

        let bytes = tokio::fs::read(&job.source_path)
            .await
            .map_err(|source| StorageError::Source {
                path: job.source_path.clone(),
                source,
            })?;

        self.lock().stored.insert(
            job.key(),
            StoredObject {
                bytes,
                content_type: job.content_type.clone(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.lock().stored.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryProductRepository {
    products: Arc<Mutex<HashMap<String, Product>>>,
}

impl MemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: Product) {
        self.lock().insert(product.uuid.clone(), product);
    }

    pub fn get(&self, uuid: &str) -> Option<Product> {
        self.lock().get(uuid).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Product>> {
        self.products
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProductRepository for MemoryProductRepository {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<Product>, RepositoryError> {
        Ok(self.get(uuid))
    }

    async fn save(&self, product: &Product) -> Result<Product, RepositoryError> {
        let mut products = self.lock();
        let stored = products
            .get_mut(&product.uuid)
            .ok_or_else(|| RepositoryError::Missing(product.uuid.clone()))?;

        if stored.revision != product.revision {
            return Err(RepositoryError::Conflict {
                uuid: product.uuid.clone(),
                expected: product.revision,
            });
        }

        let mut next = product.clone();
        next.revision += 1;
        *stored = next.clone();
        Ok(next)
    }
}
