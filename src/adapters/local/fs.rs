use crate::domain::jobs::UploadJob;
use crate::ports::storage::{ObjectStorage, StorageError};
use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Object storage backed by a directory: object `a/b/c.mp3` lives at `root/a/b/c.mp3`.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key below `root`, refusing anything that could climb out of it.
    pub fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        if key.is_empty() || !key_is_valid(relative) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn key_is_valid(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_)))
}

#[async_trait]
impl ObjectStorage for FsStorage {
    async fn upload(&self, job: &UploadJob) -> Result<(), StorageError> {
        let destination = self.object_path(&job.key())?;

        if let Err(source) = tokio::fs::metadata(&job.source_path).await {
            return Err(StorageError::Source {
                path: job.source_path.clone(),
                source,
            });
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&job.source_path, &destination).await?;

        debug!(key = %job.key(), path = %destination.display(), "Stored object");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
