//! Cache backend abstraction
//!
//! `CacheBackend` covers the key/value, set, hash and sorted-set shapes this
//! service needs from its fast tier. Two implementations exist: Redis
//! (distributed, shared across instances) and an in-process map used when no
//! Redis is configured and in tests.
//!
//! `SafeBackend` is the one place where backend failures are allowed to
//! exist. Everything above it sees `Option`/`bool` defaults: the cache tier
//! is advisory, never a correctness dependency.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    // Key/value
    async fn get(&self, key: &str) -> BackendResult<Option<String>>;
    async fn get_many(&self, keys: &[String]) -> BackendResult<Vec<Option<String>>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BackendResult<()>;
    async fn delete(&self, key: &str) -> BackendResult<()>;
    async fn delete_by_prefix(&self, prefix: &str) -> BackendResult<u64>;

    /// Atomic increment; negative deltas decrement. Missing keys start at 0.
    async fn incr_by(&self, key: &str, delta: i64) -> BackendResult<i64>;

    // Sets
    async fn set_add(&self, key: &str, member: &str) -> BackendResult<bool>;
    async fn set_remove(&self, key: &str, member: &str) -> BackendResult<bool>;
    async fn set_contains(&self, key: &str, member: &str) -> BackendResult<bool>;

    // Hashes
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> BackendResult<()>;
    async fn hash_get(&self, key: &str, field: &str) -> BackendResult<Option<String>>;
    async fn hash_delete(&self, key: &str, field: &str) -> BackendResult<()>;
    async fn hash_values(&self, key: &str) -> BackendResult<Vec<String>>;

    // Sorted sets
    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> BackendResult<()>;
    async fn sorted_set_remove(&self, key: &str, member: &str) -> BackendResult<()>;

    /// Members with scores, highest score first. `stop = -1` means "to the end".
    async fn sorted_set_rev_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> BackendResult<Vec<(String, f64)>>;
}

/// Safe-operation wrapper at the backend boundary.
///
/// Centralizes the log-and-substitute-default policy so call sites never
/// repeat try/catch: a failed read is a miss (`None`), a failed write is a
/// `false`. Callers that care fall back to the relational store.
#[derive(Clone)]
pub struct SafeBackend {
    inner: Arc<dyn CacheBackend>,
}

impl SafeBackend {
    pub fn new(inner: Arc<dyn CacheBackend>) -> Self {
        Self { inner }
    }

    fn absorb<T>(op: &'static str, key: &str, result: BackendResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(op = op, key = %key, error = %e, "cache backend operation failed");
                None
            }
        }
    }

    /// `None` = backend failure (logged); `Some(None)` = key absent.
    pub async fn get(&self, key: &str) -> Option<Option<String>> {
        Self::absorb("GET", key, self.inner.get(key).await)
    }

    pub async fn get_many(&self, keys: &[String]) -> Option<Vec<Option<String>>> {
        Self::absorb("MGET", keys.first().map_or("", |k| k.as_str()), self.inner.get_many(keys).await)
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        Self::absorb("SET", key, self.inner.set(key, value, ttl).await).is_some()
    }

    pub async fn delete(&self, key: &str) -> bool {
        Self::absorb("DEL", key, self.inner.delete(key).await).is_some()
    }

    pub async fn delete_by_prefix(&self, prefix: &str) -> Option<u64> {
        Self::absorb("DEL_PREFIX", prefix, self.inner.delete_by_prefix(prefix).await)
    }

    pub async fn incr_by(&self, key: &str, delta: i64) -> Option<i64> {
        Self::absorb("INCRBY", key, self.inner.incr_by(key, delta).await)
    }

    pub async fn set_add(&self, key: &str, member: &str) -> Option<bool> {
        Self::absorb("SADD", key, self.inner.set_add(key, member).await)
    }

    pub async fn set_remove(&self, key: &str, member: &str) -> Option<bool> {
        Self::absorb("SREM", key, self.inner.set_remove(key, member).await)
    }

    pub async fn set_contains(&self, key: &str, member: &str) -> Option<bool> {
        Self::absorb("SISMEMBER", key, self.inner.set_contains(key, member).await)
    }

    pub async fn hash_set(&self, key: &str, field: &str, value: &str) -> bool {
        Self::absorb("HSET", key, self.inner.hash_set(key, field, value).await).is_some()
    }

    pub async fn hash_get(&self, key: &str, field: &str) -> Option<Option<String>> {
        Self::absorb("HGET", key, self.inner.hash_get(key, field).await)
    }

    pub async fn hash_delete(&self, key: &str, field: &str) -> bool {
        Self::absorb("HDEL", key, self.inner.hash_delete(key, field).await).is_some()
    }

    pub async fn hash_values(&self, key: &str) -> Option<Vec<String>> {
        Self::absorb("HVALS", key, self.inner.hash_values(key).await)
    }

    pub async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> bool {
        Self::absorb("ZADD", key, self.inner.sorted_set_add(key, member, score).await).is_some()
    }

    pub async fn sorted_set_remove(&self, key: &str, member: &str) -> bool {
        Self::absorb("ZREM", key, self.inner.sorted_set_remove(key, member).await).is_some()
    }

    pub async fn sorted_set_rev_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Option<Vec<(String, f64)>> {
        Self::absorb(
            "ZREVRANGE",
            key,
            self.inner.sorted_set_rev_range(key, start, stop).await,
        )
    }
}
