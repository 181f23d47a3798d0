use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};

/// Notified after a successful mutation so consumers holding a view of
/// "which documents are already grouped" can drop it.
///
/// Callers treat failures as non-fatal.
#[async_trait]
pub trait CacheInvalidationSink: Send + Sync {
    async fn invalidate(&self, prefix: &str) -> Result<(), anyhow::Error>;
}

/// Deletes every Redis key starting with the given prefix.
#[derive(Clone)]
pub struct RedisCacheSink {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisCacheSink {
    pub async fn new(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(url)?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl CacheInvalidationSink for RedisCacheSink {
    async fn invalidate(&self, prefix: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to scan cache keys: {}", e))?;

            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to delete cache keys: {}", e))?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(prefix = %prefix, removed = removed, "Cache invalidated");
        Ok(())
    }
}

/// Used when no cache is configured.
#[derive(Debug, Default, Clone)]
pub struct NoopCacheSink;

#[async_trait]
impl CacheInvalidationSink for NoopCacheSink {
    async fn invalidate(&self, _prefix: &str) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
