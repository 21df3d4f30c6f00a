//! Redis ProductRepository implementation.

use super::error::RedisAdapterError;
use super::pool::RedisPool;
use super::product_key;
use crate::domain::product::Product;
use crate::ports::repository::{ProductRepository, RepositoryError};
use async_trait::async_trait;
use deadpool_redis::redis::{AsyncCommands, Script};

/// Writes ARGV[2] to KEYS[1] only if the stored revision equals ARGV[1].
/// Returns -1 when the key is absent, 0 on a revision mismatch, 1 on success.
const COMPARE_AND_SET: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return -1
end
local stored = cjson.decode(current)
local revision = tonumber(stored['revision']) or 0
if revision ~= tonumber(ARGV[1]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2])
return 1
"#;

impl RedisPool {
    /// Store a product unconditionally. Used by seeding and the catalog side.
    pub async fn put_product(&self, product: &Product) -> Result<(), RepositoryError> {
        let mut conn = self.pool.get().await.map_err(RedisAdapterError::from)?;
        let json = serde_json::to_string(product)?;
        conn.set::<_, _, ()>(product_key(&product.uuid), json)
            .await
            .map_err(RedisAdapterError::from)?;
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for RedisPool {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<Product>, RepositoryError> {
        let mut conn = self.pool.get().await.map_err(RedisAdapterError::from)?;
        let json: Option<String> = conn
            .get(product_key(uuid))
            .await
            .map_err(RedisAdapterError::from)?;
        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, product: &Product) -> Result<Product, RepositoryError> {
        let mut conn = self.pool.get().await.map_err(RedisAdapterError::from)?;

        let mut next = product.clone();
        next.revision = product.revision + 1;
        let json = serde_json::to_string(&next)?;

        let outcome: i64 = Script::new(COMPARE_AND_SET)
            .key(product_key(&product.uuid))
            .arg(product.revision)
            .arg(json)
            .invoke_async(&mut conn)
            .await
            .map_err(RedisAdapterError::from)?;

        match outcome {
            1 => Ok(next),
            0 => Err(RepositoryError::Conflict {
                uuid: product.uuid.clone(),
                expected: product.revision,
            }),
            _ => Err(RepositoryError::Missing(product.uuid.clone())),
        }
    }
}
