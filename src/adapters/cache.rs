use async_trait::async_trait;
use dashmap::DashMap;

/// Byte-oriented shared cache the recency cache and the dispatch rate limiter
/// sit on. Keys carry no TTL; stale rate-limit timestamps are harmless
/// (a large elapsed time yields no wait).
#[async_trait]
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// Returns an error if the backend is unreachable.
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// # Errors
    /// Returns an error if the backend is unreachable.
    async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    /// # Errors
    /// Returns an error if the backend is unreachable.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// # Errors
    /// Returns an error if the backend is unreachable.
    async fn ping(&self) -> anyhow::Result<()>;
}

/// Process-local backend. Loses the restart-safety of the Redis store; used
/// by tests and cache-less development runs.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
