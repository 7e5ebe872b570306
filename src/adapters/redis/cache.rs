use crate::adapters::cache::CacheStore;
use crate::adapters::redis::RedisClient;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;

/// Redis-backed shared cache; the production backend. State survives process
/// restarts, which is what makes the recency cache's cold-start diff safe.
#[derive(Debug, Clone)]
pub struct RedisCacheStore {
    redis: Arc<RedisClient>,
    prefix: String,
}

impl RedisCacheStore {
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>, prefix: String) -> Self {
        Self { redis, prefix }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut conn = self.redis.connection();
        let value: Option<Vec<u8>> = conn.get(self.full_key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let mut conn = self.redis.connection();
        let _: () = conn.set(self.full_key(key), value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.redis.connection();
        let _: () = conn.del(self.full_key(key)).await?;
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.redis.ping().await
    }
}
