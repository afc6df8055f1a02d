//! In-process fallback backend
//!
//! Implements the same contract as Redis over process-local maps. Used when
//! no distributed backend is configured, and as the backend for tests. TTL
//! expiry is lazy: checked on read, reaped wholesale by the cache sweeper.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use super::backend::{BackendResult, CacheBackend};

struct KvEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl KvEntry {
    fn new(value: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            value: value.into(),
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    kv: DashMap<String, KvEntry>,
    sets: DashMap<String, HashSet<String>>,
    hashes: DashMap<String, HashMap<String, String>>,
    scores: DashMap<String, HashMap<String, f64>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        if let Some(entry) = self.kv.get(key) {
            if entry.expired() {
                drop(entry);
                self.kv.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn get_many(&self, keys: &[String]) -> BackendResult<Vec<Option<String>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BackendResult<()> {
        self.kv.insert(key.to_string(), KvEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        self.kv.remove(key);
        self.sets.remove(key);
        self.hashes.remove(key);
        self.scores.remove(key);
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> BackendResult<u64> {
        let mut deleted = 0u64;
        let matching: Vec<String> = self
            .kv
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect();
        for key in matching {
            self.kv.remove(&key);
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> BackendResult<i64> {
        let mut entry = self
            .kv
            .entry(key.to_string())
            .or_insert_with(|| KvEntry::new("0", None));
        if entry.expired() {
            *entry = KvEntry::new("0", None);
        }
        let next = entry.value.parse::<i64>().unwrap_or(0) + delta;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn set_add(&self, key: &str, member: &str) -> BackendResult<bool> {
        let mut set = self.sets.entry(key.to_string()).or_default();
        Ok(set.insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> BackendResult<bool> {
        match self.sets.get_mut(key) {
            Some(mut set) => Ok(set.remove(member)),
            None => Ok(false),
        }
    }

    async fn set_contains(&self, key: &str, member: &str) -> BackendResult<bool> {
        Ok(self.sets.get(key).is_some_and(|set| set.contains(member)))
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> BackendResult<()> {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> BackendResult<Option<String>> {
        Ok(self
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hash_delete(&self, key: &str, field: &str) -> BackendResult<()> {
        if let Some(mut hash) = self.hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn hash_values(&self, key: &str) -> BackendResult<Vec<String>> {
        Ok(self
            .hashes
            .get(key)
            .map(|h| h.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> BackendResult<()> {
        self.scores
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> BackendResult<()> {
        if let Some(mut scores) = self.scores.get_mut(key) {
            scores.remove(member);
        }
        Ok(())
    }

    async fn sorted_set_rev_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> BackendResult<Vec<(String, f64)>> {
        let mut entries: Vec<(String, f64)> = self
            .scores
            .get(key)
            .map(|s| s.iter().map(|(m, sc)| (m.clone(), *sc)).collect())
            .unwrap_or_default();

        // Highest score first, member ascending on equal scores
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let len = entries.len();
        let resolve = |i: isize| -> isize {
            if i < 0 {
                len as isize + i
            } else {
                i
            }
        };
        let first = resolve(start).max(0) as usize;
        let last = resolve(stop);
        if len == 0 || last < 0 || first > last as usize {
            return Ok(vec![]);
        }
        let last = (last as usize).min(len - 1);
        Ok(entries[first..=last].to_vec())
    }
}
