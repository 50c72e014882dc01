use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::models::product::{FormattedResult, LookupKey};

const KEY_PREFIX: &str = "upc:";

/// Key-value store with per-entry expiry. Values are opaque bytes.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Check store connectivity (for health checks).
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Redis-backed cache store.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(CacheError::Redis)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Redis)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(CacheError::Redis)?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        // SET EX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(CacheError::Redis)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await.map_err(CacheError::Redis)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let found: bool = conn.exists(key).await.map_err(CacheError::Redis)?;
        Ok(found)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(CacheError::Redis)?;
        Ok(())
    }
}

/// In-process cache store with lazy expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_entry(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let expired = match entries.get(key) {
            Some((_, expires_at)) => *expires_at <= Instant::now(),
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.live_entry(key)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.live_entry(key)?.is_some())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Typed view over a [`CacheStore`] holding serialized product records
/// under `upc:<key>`.
#[derive(Clone)]
pub struct ProductCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ProductCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn cache_key(key: &LookupKey) -> String {
        format!("{KEY_PREFIX}{key}")
    }

    /// Read a cached record. A payload that no longer deserializes is
    /// deleted and reported as absent.
    pub async fn get(&self, key: &LookupKey) -> Result<Option<FormattedResult>, CacheError> {
        let cache_key = Self::cache_key(key);
        let Some(payload) = self.store.get(&cache_key).await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<FormattedResult>(&payload) {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                tracing::warn!(upc = %key, error = %e, "Evicting corrupt cache entry");
                self.store.delete(&cache_key).await?;
                Ok(None)
            }
        }
    }

    pub async fn contains(&self, key: &LookupKey) -> Result<bool, CacheError> {
        self.store.exists(&Self::cache_key(key)).await
    }

    pub async fn put(&self, result: &FormattedResult) -> Result<(), CacheError> {
        let payload = serde_json::to_vec(result).map_err(CacheError::Serialize)?;
        let cache_key = format!("{KEY_PREFIX}{}", result.upc);
        self.store.set_ex(&cache_key, &payload, self.ttl).await
    }

    pub async fn health_check(&self) -> Result<(), CacheError> {
        self.store.ping().await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Cache lock poisoned")]
    Poisoned,
}
