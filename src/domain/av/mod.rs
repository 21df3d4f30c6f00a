//! Audio/Video domain modules.

pub mod progress;
pub mod watermark;

pub use progress::{ProgressCallback, WatermarkProgress};
pub use watermark::{probe_duration, FfmpegWatermarker};
