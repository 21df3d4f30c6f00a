//! Parsing of ffmpeg's `-progress` key/value stream.

use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkProgress {
    pub out_time: Duration,
    /// Only known when the source duration could be probed.
    pub percent: Option<f64>,
    pub finished: bool,
}

pub type ProgressCallback = Arc<dyn Fn(WatermarkProgress) + Send + Sync>;

/// Accumulates `key=value` lines; every `progress=` line closes a block.
#[derive(Debug, Default)]
pub struct ProgressParser {
    total: Option<Duration>,
    out_time: Duration,
}

impl ProgressParser {
    pub fn new(total: Option<Duration>) -> Self {
        Self {
            total,
            out_time: Duration::ZERO,
        }
    }

    pub fn feed(&mut self, line: &str) -> Option<WatermarkProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // out_time_ms is in microseconds too, ffmpeg kept the old name
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<u64>() {
                    self.out_time = Duration::from_micros(us);
                }
                None
            }
            "progress" => Some(WatermarkProgress {
                out_time: self.out_time,
                percent: self.percent(),
                finished: value == "end",
            }),
            _ => None,
        }
    }

    fn percent(&self) -> Option<f64> {
        let total = self.total?.as_secs_f64();
        if total <= 0.0 {
            return None;
        }
        Some((self.out_time.as_secs_f64() / total * 100.0).min(100.0))
    }
}
