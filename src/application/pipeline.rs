use super::error::IngestError;
use super::publisher::{check_request, AssetPublisher};
use super::staging::StagingArea;
use crate::config::{PipelineConfig, ProcessingPolicy};
use crate::domain::product::Product;
use crate::ports::processor::{ProcessingError, WatermarkEngine};
use crate::ports::repository::ProductRepository;
use crate::ports::storage::ObjectStorage;
use std::path::PathBuf;
use tokio::sync::Semaphore;
use tracing::{error, info, warn, Instrument};

/// A client upload already written to its staging area.
#[derive(Debug)]
pub struct AssetUpload {
    pub uuid: String,
    pub media_type: String,
    /// Name the client gave the file; only its extension is used.
    pub file_name: String,
    pub staging: StagingArea,
}

impl AssetUpload {
    pub fn original_path(&self) -> PathBuf {
        self.staging.original_path(&self.file_name)
    }

    pub fn watermarked_path(&self) -> PathBuf {
        self.staging.watermarked_path(&self.file_name)
    }
}

/// Outcome of the watermark stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub original: PathBuf,
    pub watermarked: PathBuf,
    /// False when the engine failed under the best-effort policy.
    pub watermark_applied: bool,
}

/// validate → watermark → upload both → attach to product.
pub struct IngestPipeline<W, S, R> {
    engine: W,
    publisher: AssetPublisher<S, R>,
    permits: Semaphore,
    config: PipelineConfig,
}

impl<W, S, R> IngestPipeline<W, S, R>
where
    W: WatermarkEngine,
    S: ObjectStorage,
    R: ProductRepository,
{
    pub fn new(engine: W, storage: S, repo: R, config: &PipelineConfig) -> Self {
        Self {
            engine,
            publisher: AssetPublisher::new(storage, repo, config),
            permits: Semaphore::new(config.max_concurrent_watermarks.max(1)),
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn publisher(&self) -> &AssetPublisher<S, R> {
        &self.publisher
    }

    pub async fn run(&self, upload: AssetUpload) -> Result<Product, IngestError> {
        let span = tracing::info_span!(
            "ingest",
            uuid = %upload.uuid,
            request_id = %uuid::Uuid::new_v4()
        );
        async move {
            let result = self.run_stages(&upload).await;
            match &result {
                Ok(_) => info!("Ingest finished"),
                Err(e) => warn!(error = %e, "Ingest failed"),
            }
            // staging directory goes away here
            drop(upload);
            result
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, upload: &AssetUpload) -> Result<Product, IngestError> {
        let original = upload.original_path();
        check_request(&upload.uuid, &upload.media_type, &original)?;

        let processed = self.process(original, upload.watermarked_path()).await?;

        self.publisher
            .publish(
                &upload.uuid,
                &upload.media_type,
                &processed.original,
                &processed.watermarked,
            )
            .await
    }

    /// Run the engine under the concurrency cap and timeout, then apply the
    /// processing policy to any failure.
    pub async fn process(
        &self,
        original: PathBuf,
        watermarked: PathBuf,
    ) -> Result<Processed, IngestError> {
        let outcome = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| IngestError::Unavailable)?;

            let run = self.engine.apply_watermark(
                &original,
                &self.config.watermark_track,
                &watermarked,
            );
            match tokio::time::timeout(self.config.watermark_timeout, run).await {
                Ok(result) => result,
                Err(_) => Err(ProcessingError::TimedOut(self.config.watermark_timeout)),
            }
        };

        let watermark_applied = match outcome {
            Ok(()) => true,
            Err(e) => match self.config.processing_policy {
                ProcessingPolicy::FailFast => {
                    error!(error = %e, "Audio watermarking failed");
                    return Err(e.into());
                }
                ProcessingPolicy::BestEffort => {
                    warn!(
                        error = %e,
                        output = %watermarked.display(),
                        "Audio watermarking failed, continuing with whatever is staged"
                    );
                    false
                }
            },
        };

        Ok(Processed {
            original,
            watermarked,
            watermark_applied,
        })
    }
}
