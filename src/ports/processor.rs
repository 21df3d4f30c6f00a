use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}: {diagnostic}")]
    Failed {
        program: String,
        status: String,
        diagnostic: String,
    },
    #[error("watermarking timed out after {0:?}")]
    TimedOut(Duration),
    #[error("engine finished without writing {}", .0.display())]
    MissingOutput(PathBuf),
    #[error("watermark track {} is not readable", .0.display())]
    MissingWatermark(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WatermarkEngine: Send + Sync {
    /// Mix `watermark` into `source`, writing exactly one file at `destination`.
    async fn apply_watermark(
        &self,
        source: &Path,
        watermark: &Path,
        destination: &Path,
    ) -> Result<(), ProcessingError>;
}

#[async_trait]
impl<T: WatermarkEngine + ?Sized> WatermarkEngine for std::sync::Arc<T> {
    async fn apply_watermark(
        &self,
        source: &Path,
        watermark: &Path,
        destination: &Path,
    ) -> Result<(), ProcessingError> {
        (**self).apply_watermark(source, watermark, destination).await
    }
}
