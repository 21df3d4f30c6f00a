//! Monolith Binary - single-server deployment of the ingestion service
//!
//! It wires up:
//! - Object storage (filesystem or S3)
//! - Product repository (Redis or in-memory)
//! - The ffmpeg watermark engine
//! - The HTTP inbound adapter

#[cfg(feature = "aws")]
use stockmedia::adapters::aws::S3Storage;
use stockmedia::adapters::http;
use stockmedia::adapters::local::{FsStorage, RedisPool};
use stockmedia::adapters::memory::MemoryProductRepository;
use stockmedia::config::{Config, RepositoryBackend, StorageBackend};
use stockmedia::domain::av::FfmpegWatermarker;
use stockmedia::ports::{repository::ProductRepository, storage::ObjectStorage};
use stockmedia::IngestPipeline;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    // 1. Adapters
    let storage: Arc<dyn ObjectStorage> = match &config.storage {
        StorageBackend::Fs { root } => {
            info!(root = %root.display(), "Using filesystem storage");
            Arc::new(FsStorage::new(root.clone()))
        }
        #[cfg(feature = "aws")]
        StorageBackend::S3 { bucket, endpoint } => {
            info!(bucket = %bucket, "Using S3 storage");
            let s3 = S3Storage::from_env(bucket.clone(), endpoint.clone()).await;
            Arc::new(s3)
        }
        #[cfg(not(feature = "aws"))]
        StorageBackend::S3 { .. } => {
            error!("STORAGE_BACKEND=s3 needs the `aws` feature");
            std::process::exit(1);
        }
    };

    let repository: Arc<dyn ProductRepository> = match &config.repository {
        RepositoryBackend::Redis { url } => match RedisPool::new(url) {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                error!(error = %e, "Failed to connect to Redis");
                std::process::exit(1);
            }
        },
        RepositoryBackend::Memory => {
            warn!("Using the in-memory product repository; products are lost on restart");
            Arc::new(MemoryProductRepository::new())
        }
    };

    if !config.pipeline.watermark_track.exists() {
        warn!(
            track = %config.pipeline.watermark_track.display(),
            "Watermark track not found; uploads will fail until it exists"
        );
    }

    let engine = FfmpegWatermarker::new(config.ffmpeg_path.clone())
        .with_ffprobe(config.ffprobe_path.clone());

    // 2. Application Service
    let pipeline = Arc::new(IngestPipeline::new(
        engine,
        storage,
        repository,
        &config.pipeline,
    ));

    // 3. HTTP Layer
    let app = http::router(pipeline, config.max_upload_bytes);

    // 4. Start Server
    let listener = match tokio::net::TcpListener::bind(config.bind_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, address = %config.bind_address(), "Failed to bind TCP listener");
            std::process::exit(1);
        }
    };
    info!("Listening at {}", config.bind_address());
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}
