pub mod cache;

pub use cache::RedisCacheStore;

use std::sync::Arc;

/// Thin handle around a Redis connection manager. The manager reconnects on
/// its own; callers just clone a connection per operation.
#[derive(Debug)]
pub struct RedisClient {
    manager: redis::aio::ConnectionManager,
}

impl RedisClient {
    /// Connects to the Redis instance backing the shared cache.
    ///
    /// # Errors
    /// Returns an error if the initial connection fails.
    pub async fn new(url: &str) -> anyhow::Result<Arc<Self>> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Arc::new(Self { manager }))
    }

    #[must_use]
    pub fn connection(&self) -> redis::aio::ConnectionManager {
        self.manager.clone()
    }

    /// Pings the Redis server to check connectivity.
    ///
    /// # Errors
    /// Returns an error if the ping fails.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.connection();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
