//! Application layer - Pipeline services that use ports.

pub mod error;
pub mod pipeline;
pub mod publisher;
pub mod retry;
pub mod staging;

pub use error::IngestError;
pub use pipeline::{AssetUpload, IngestPipeline};
pub use publisher::AssetPublisher;
pub use staging::StagingArea;
