//! Generic cache engine with usage-adaptive TTLs
//!
//! One instance is constructed at startup and injected into consumers; there
//! is no module-level cache state. A distributed backend is preferred when
//! configured; otherwise entries live in the bounded in-process store. Either
//! way the contract is the same: `get` never errors (a broken backend is a
//! miss), `set` reports success as a bool, and per-entity-type hit/miss
//! patterns stretch or shrink TTLs so the working set stays resident without
//! per-entity tuning.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::backend::SafeBackend;
use super::eviction::LocalStore;
use crate::config::CacheConfig;

/// Hit/miss statistics per logical entity type.
///
/// Process-lifetime state, reset only on restart.
#[derive(Debug, Clone)]
pub struct AccessPattern {
    pub hits: u64,
    pub misses: u64,
    pub last_access: Instant,
}

impl AccessPattern {
    fn new() -> Self {
        Self {
            hits: 0,
            misses: 0,
            last_access: Instant::now(),
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

pub struct CacheManager {
    distributed: Option<SafeBackend>,
    local: LocalStore,
    patterns: DashMap<String, AccessPattern>,
    namespace: String,
    default_ttl: Duration,
}

impl CacheManager {
    pub fn new(config: &CacheConfig, distributed: Option<SafeBackend>) -> Self {
        Self {
            distributed,
            local: LocalStore::new(config.max_items, config.eviction_strategy),
            patterns: DashMap::new(),
            namespace: config.namespace.clone(),
            default_ttl: config.default_ttl(),
        }
    }

    pub fn uses_local_store(&self) -> bool {
        self.distributed.is_none()
    }

    /// Deterministic namespaced key: `{ns}:cache:{segment}:{segment}:…`
    pub fn generate_key(&self, segments: &[&str]) -> String {
        format!("{}:cache:{}", self.namespace, segments.join(":"))
    }

    /// Returns the deserialized value or `None` on miss. Backend failures and
    /// undecodable payloads are misses, never errors.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, entity_type: Option<&str>) -> Option<T> {
        let raw = match &self.distributed {
            Some(backend) => backend.get(key).await.flatten(),
            None => self.local.get(key),
        };

        self.record_access(entity_type, raw.is_some());

        let raw = raw?;
        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Stores the serialized value. Returns false when serialization or the
    /// distributed backend fails; never errors.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        entity_type: Option<&str>,
    ) -> bool {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "cache serialization failed");
                return false;
            }
        };

        let ttl = self.dynamic_ttl(ttl, entity_type);
        match &self.distributed {
            Some(backend) => backend.set(key, &json, Some(ttl)).await,
            None => {
                self.local.insert(key, &json, Some(ttl));
                true
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match &self.distributed {
            Some(backend) => backend.delete(key).await,
            None => self.local.remove(key),
        }
    }

    pub async fn clear_by_prefix(&self, prefix: &str) -> u64 {
        match &self.distributed {
            Some(backend) => backend.delete_by_prefix(prefix).await.unwrap_or(0),
            None => self.local.remove_prefix(prefix),
        }
    }

    /// TTL policy: an explicit TTL wins verbatim. Otherwise frequently-hit
    /// entity types (ratio > 0.8) keep entries twice as long and rarely-hit
    /// ones (ratio < 0.2) half as long as the configured default.
    pub fn dynamic_ttl(&self, explicit: Option<Duration>, entity_type: Option<&str>) -> Duration {
        if let Some(ttl) = explicit {
            return ttl;
        }

        let Some(entity_type) = entity_type else {
            return self.default_ttl;
        };
        let Some(pattern) = self.patterns.get(entity_type) else {
            return self.default_ttl;
        };
        if pattern.hits + pattern.misses == 0 {
            return self.default_ttl;
        }

        let ratio = pattern.hit_ratio();
        if ratio > 0.8 {
            self.default_ttl * 2
        } else if ratio < 0.2 {
            self.default_ttl / 2
        } else {
            self.default_ttl
        }
    }

    pub fn access_pattern(&self, entity_type: &str) -> Option<AccessPattern> {
        self.patterns.get(entity_type).map(|p| p.clone())
    }

    fn record_access(&self, entity_type: Option<&str>, hit: bool) {
        let Some(entity_type) = entity_type else {
            return;
        };
        let mut pattern = self
            .patterns
            .entry(entity_type.to_string())
            .or_insert_with(AccessPattern::new);
        if hit {
            pattern.hits += 1;
        } else {
            pattern.misses += 1;
        }
        pattern.last_access = Instant::now();
    }

    /// One eviction pass over the in-process store; driven by the background
    /// sweeper at a fixed interval.
    pub fn sweep_local(&self) {
        if self.uses_local_store() {
            self.local.sweep();
            debug!(len = self.local.len(), "cache sweep complete");
        }
    }
}
