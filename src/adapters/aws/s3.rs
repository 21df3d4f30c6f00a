use crate::domain::jobs::UploadJob;
use crate::ports::storage::{ObjectStorage, StorageError};
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

/// S3Storage implements ObjectStorage for AWS S3 and S3-compatible endpoints.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Client from the default AWS credential chain, optionally pointed at a
    /// custom endpoint (MinIO and friends need path-style addressing).
    pub async fn from_env(bucket: String, endpoint: Option<String>) -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self::new(Client::from_conf(builder.build()), bucket)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload(&self, job: &UploadJob) -> Result<(), StorageError> {
        let key = job.key();
        let body = match ByteStream::from_path(&job.source_path).await {
            Ok(body) => body,
            Err(e) => {
                // from_path hides the io error kind; re-stat for a useful message
                return Err(match tokio::fs::metadata(&job.source_path).await {
                    Err(source) => StorageError::Source {
                        path: job.source_path.clone(),
                        source,
                    },
                    Ok(_) => StorageError::Backend {
                        key,
                        message: e.to_string(),
                    },
                });
            }
        };

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(&job.content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Backend {
                key: key.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(bucket = %self.bucket, key = %key, "Uploaded object");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Backend {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }
}
