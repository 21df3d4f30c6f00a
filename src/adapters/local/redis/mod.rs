//! Redis adapter for local deployment.
//!
//! Products are stored as JSON documents, one key per uuid, so the catalog
//! service and this pipeline can share them. Saves go through a Lua
//! compare-and-set on the document's `revision`.

mod error;
mod pool;
mod repository;

pub use error::RedisAdapterError;
pub use pool::RedisPool;

/// Redis key constants
const PRODUCT_PREFIX: &str = "stockmedia:product:";

fn product_key(uuid: &str) -> String {
    format!("{}{}", PRODUCT_PREFIX, uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_keys_are_namespaced() {
        assert_eq!(product_key("abc123"), "stockmedia:product:abc123");
    }
}
