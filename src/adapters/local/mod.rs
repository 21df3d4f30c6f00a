//! Local adapters for monolith deployment.

pub mod fs;

#[cfg(feature = "local")]
pub mod redis;

pub use fs::FsStorage;

#[cfg(feature = "local")]
pub use redis::RedisPool;
