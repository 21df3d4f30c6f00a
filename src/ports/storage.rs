use crate::domain::jobs::UploadJob;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot read {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("object store rejected `{key}`: {message}")]
    Backend { key: String, message: String },
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Put the job's local file at `folder/filename`, overwriting any existing object.
    async fn upload(&self, job: &UploadJob) -> Result<(), StorageError>;

    /// Remove an object by full key. Removing a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: ObjectStorage + ?Sized> ObjectStorage for std::sync::Arc<T> {
    async fn upload(&self, job: &UploadJob) -> Result<(), StorageError> {
        (**self).upload(job).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key).await
    }
}
