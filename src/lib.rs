//! Stockmedia - audio ingestion service
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (products, asset keys, upload jobs, watermarking)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations
//! - application/: Ingest pipeline and publisher
//! - config: Environment configuration
//!
//! # Features
//! - `local`: Redis product repository and the monolith binary
//! - `aws`: S3 object storage
//! - `full`: All features

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports for convenience
pub use application::{AssetUpload, IngestError, IngestPipeline};
pub use config::Config;
pub use domain::product::{MediaType, Product};
