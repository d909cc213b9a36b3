//! Result cache — advisory, TTL-bounded snapshots of dispatched items.
//!
//! Entries silently expire. A miss is reported as `Ok(None)`; errors are only
//! for a cache that could not be reached or returned garbage.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::time::Instant;

use courier_common::types::CachedItem;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("cache call timed out after {0:?}")]
    Timeout(Duration),
}

/// Cache keys. `Latest` is reserved for the most recently dispatched item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Item(i64),
    Latest,
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Item(id) => write!(f, "item:{}", id),
            CacheKey::Latest => write!(f, "item:latest"),
        }
    }
}

#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn put(&self, key: CacheKey, snapshot: &CachedItem, ttl: Duration) -> Result<(), CacheError>;

    async fn get(&self, key: CacheKey) -> Result<Option<CachedItem>, CacheError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Redis-backed cache using `SET key value EX ttl`.
#[derive(Clone)]
pub struct RedisResultCache {
    redis: ConnectionManager,
}

impl RedisResultCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl ResultCache for RedisResultCache {
    async fn put(&self, key: CacheKey, snapshot: &CachedItem, ttl: Duration) -> Result<(), CacheError> {
        let payload = serde_json::to_string(snapshot)?;
        let mut redis = self.redis.clone();
        redis
            .set_ex::<_, _, ()>(key.to_string(), payload, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn get(&self, key: CacheKey) -> Result<Option<CachedItem>, CacheError> {
        let mut redis = self.redis.clone();
        let payload: Option<String> = redis.get(key.to_string()).await?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// In-process cache used when Redis is unavailable.
///
/// Expiry uses `tokio::time::Instant`, so paused test clocks apply.
#[derive(Default)]
pub struct MemoryResultCache {
    entries: Mutex<HashMap<CacheKey, (Instant, CachedItem)>>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, (expires_at, _)| *expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn put(&self, key: CacheKey, snapshot: &CachedItem, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, (Instant::now() + ttl, snapshot.clone()));
        Ok(())
    }

    async fn get(&self, key: CacheKey) -> Result<Option<CachedItem>, CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match entries.get(&key) {
            Some((expires_at, snapshot)) if *expires_at > Instant::now() => {
                return Ok(Some(snapshot.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(&key);
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Read from the cache with a time bound; errors and timeouts degrade to a miss.
pub async fn read_through(
    cache: &dyn ResultCache,
    key: CacheKey,
    timeout: Duration,
) -> Option<CachedItem> {
    match tokio::time::timeout(timeout, cache.get(key)).await {
        Ok(Ok(hit)) => hit,
        Ok(Err(e)) => {
            tracing::warn!(key = %key, cache = cache.name(), error = %e, "Cache read failed");
            None
        }
        Err(_) => {
            tracing::warn!(key = %key, cache = cache.name(), ?timeout, "Cache read timed out");
            None
        }
    }
}
