//! Configuration for the ingestion service.
//!
//! Built once at startup and handed to constructors by reference; nothing in
//! the pipeline reads the environment on its own.

use crate::domain::product::VariantPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: &'static str },
    #[error("{name}=`{value}` is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Whether a failed watermark run aborts the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingPolicy {
    /// Abort before any upload.
    #[default]
    FailFast,
    /// Log and upload whatever sits at the staging path.
    BestEffort,
}

impl FromStr for ProcessingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail-fast" | "fail_fast" => Ok(ProcessingPolicy::FailFast),
            "best-effort" | "best_effort" => Ok(ProcessingPolicy::BestEffort),
            other => Err(format!("unknown processing policy `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Objects are files under `root`.
    Fs { root: PathBuf },
    /// AWS S3 or an S3-compatible endpoint.
    S3 {
        bucket: String,
        endpoint: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryBackend {
    Redis { url: String },
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first one.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Knobs the pipeline itself reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Request-scoped staging directories are created under here.
    pub staging_dir: PathBuf,
    /// Read-only track mixed into every upload.
    pub watermark_track: PathBuf,
    pub watermark_timeout: Duration,
    pub max_concurrent_watermarks: usize,
    pub processing_policy: ProcessingPolicy,
    pub variant_policy: VariantPolicy,
    /// Delete already-uploaded objects when a later step fails.
    pub compensate_orphans: bool,
    pub upload_retry: RetryPolicy,
    pub persist_retry: RetryPolicy,
    /// Reload-and-reapply rounds after a revision conflict.
    pub conflict_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staging_dir: env::temp_dir(),
            watermark_track: PathBuf::from("audio/watermark.wav"),
            watermark_timeout: Duration::from_secs(300),
            max_concurrent_watermarks: 4,
            processing_policy: ProcessingPolicy::default(),
            variant_policy: VariantPolicy::default(),
            compensate_orphans: true,
            upload_retry: RetryPolicy::new(3, Duration::from_millis(200)),
            persist_retry: RetryPolicy::new(3, Duration::from_millis(100)),
            conflict_retries: 3,
        }
    }
}

/// Configuration for the monolith deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Largest accepted multipart body, in bytes
    pub max_upload_bytes: usize,
    pub storage: StorageBackend,
    pub repository: RepositoryBackend,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from environment variables (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any key lookup; `from_env` is this over the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let defaults = PipelineConfig::default();

        let storage = match get("STORAGE_BACKEND", "fs").as_str() {
            "fs" => StorageBackend::Fs {
                root: PathBuf::from(get("STORAGE_DIR", "./storage")),
            },
            "s3" => StorageBackend::S3 {
                bucket: lookup("S3_BUCKET").ok_or(ConfigError::Missing { name: "S3_BUCKET" })?,
                endpoint: lookup("S3_ENDPOINT"),
            },
            other => return Err(invalid("STORAGE_BACKEND", other, "expected `fs` or `s3`")),
        };

        let repository = match get("REPOSITORY_BACKEND", "redis").as_str() {
            "redis" => RepositoryBackend::Redis {
                url: get("REDIS_URL", "redis://127.0.0.1/"),
            },
            "memory" => RepositoryBackend::Memory,
            other => {
                return Err(invalid(
                    "REPOSITORY_BACKEND",
                    other,
                    "expected `redis` or `memory`",
                ))
            }
        };

        let retry_delay = Duration::from_millis(parse(&lookup, "RETRY_DELAY_MS", 200u64)?);

        let pipeline = PipelineConfig {
            staging_dir: lookup("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            watermark_track: lookup("WATERMARK_TRACK")
                .map(PathBuf::from)
                .unwrap_or(defaults.watermark_track),
            watermark_timeout: Duration::from_secs(parse(&lookup, "WATERMARK_TIMEOUT_SECS", 300u64)?),
            max_concurrent_watermarks: parse(&lookup, "MAX_CONCURRENT_WATERMARKS", 4usize)?.max(1),
            processing_policy: parse(&lookup, "PROCESSING_POLICY", defaults.processing_policy)?,
            variant_policy: parse(&lookup, "VARIANT_POLICY", defaults.variant_policy)?,
            compensate_orphans: parse(&lookup, "COMPENSATE_ORPHANS", true)?,
            upload_retry: RetryPolicy::new(parse(&lookup, "UPLOAD_RETRIES", 3u32)?, retry_delay),
            persist_retry: RetryPolicy::new(parse(&lookup, "PERSIST_RETRIES", 3u32)?, retry_delay),
            conflict_retries: parse(&lookup, "CONFLICT_RETRIES", 3u32)?,
        };

        Ok(Self {
            addr: get("ADDR", "127.0.0.1"),
            port: get("PORT", "3000"),
            ffmpeg_path: PathBuf::from(get("FFMPEG_PATH", "ffmpeg")),
            ffprobe_path: PathBuf::from(get("FFPROBE_PATH", "ffprobe")),
            max_upload_bytes: parse(&lookup, "MAX_UPLOAD_BYTES", 512 * 1024 * 1024usize)?,
            storage,
            repository,
            pipeline,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: ToString,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(name, &value, &e.to_string())),
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
