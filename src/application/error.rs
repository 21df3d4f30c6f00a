use crate::domain::jobs::AssetFile;
use crate::domain::keys::KeyError;
use crate::ports::processor::ProcessingError;
use crate::ports::repository::RepositoryError;
use crate::ports::storage::StorageError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Bad request; nothing has been uploaded or written.
    #[error("{0}")]
    Validation(String),
    #[error("watermarking failed: {0}")]
    Processing(#[from] ProcessingError),
    #[error("failed to upload {file} file: {source}")]
    Upload {
        file: AssetFile,
        #[source]
        source: StorageError,
    },
    #[error("Product not found")]
    ProductNotFound(String),
    #[error("product {0} kept changing while being updated")]
    Conflict(String),
    #[error("failed to persist product: {0}")]
    Persistence(#[source] RepositoryError),
    #[error("staging failed: {0}")]
    Staging(#[from] io::Error),
    #[error("service is shutting down")]
    Unavailable,
}

impl From<KeyError> for IngestError {
    fn from(err: KeyError) -> Self {
        IngestError::Validation(err.to_string())
    }
}

impl IngestError {
    pub fn upload(file: AssetFile, source: StorageError) -> Self {
        IngestError::Upload { file, source }
    }
}
