//! Domain layer - Pure business logic.

// ffmpeg-backed watermarking
pub mod av;

pub mod jobs;
pub mod keys;
pub mod product;
