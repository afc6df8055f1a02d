//! Bounded in-process entry store with pluggable eviction
//!
//! Owned exclusively by the cache manager. Entries carry the access metadata
//! eviction needs: access count, last access time and a monotonic insertion
//! sequence used as the deterministic tie-break (earliest inserted loses).
//!
//! Locking: one mutex around the map, never held across an await point.

use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Evict least-recently-accessed entries
    #[default]
    Lru,
    /// Evict most-recently-accessed entries (for workloads where hot data
    /// churns and should not dominate capacity)
    Mru,
    /// Evict least-frequently-accessed entries
    Lfu,
    /// Evict only expired entries; no capacity-driven eviction
    Ttl,
    /// No automatic eviction; expiry is checked at read time
    None,
}

impl EvictionStrategy {
    fn capacity_driven(&self) -> bool {
        matches!(self, Self::Lru | Self::Mru | Self::Lfu)
    }
}

impl FromStr for EvictionStrategy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "mru" => Ok(Self::Mru),
            "lfu" => Ok(Self::Lfu),
            "ttl" => Ok(Self::Ttl),
            "none" => Ok(Self::None),
            other => Err(format!("unknown eviction strategy: {}", other)),
        }
    }
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
    access_count: u64,
    last_access: Instant,
    inserted_seq: u64,
}

impl CacheEntry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

pub struct LocalStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
    seq: AtomicU64,
    max_items: usize,
    strategy: EvictionStrategy,
}

impl LocalStore {
    pub fn new(max_items: usize, strategy: EvictionStrategy) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            max_items,
            strategy,
        }
    }

    /// Entries evicted per cycle for capacity-driven strategies.
    fn eviction_batch(&self) -> usize {
        ((self.max_items as f64) * 0.2).ceil() as usize
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().expect("local cache lock poisoned");
        match entries.get_mut(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                None
            }
            Some(entry) => {
                entry.access_count += 1;
                entry.last_access = Instant::now();
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    pub fn insert(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let entry = CacheEntry {
            value: value.to_string(),
            expires_at: ttl.map(|t| Instant::now() + t),
            access_count: 0,
            last_access: Instant::now(),
            inserted_seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };

        let mut entries = self.entries.lock().expect("local cache lock poisoned");
        entries.insert(key.to_string(), entry);

        // Opportunistic eviction; the entry that pushed the map over capacity
        // is not itself a candidate.
        if self.strategy.capacity_driven() && entries.len() > self.max_items {
            self.evict_locked(&mut entries, Some(key));
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().expect("local cache lock poisoned");
        entries.remove(key).is_some()
    }

    pub fn remove_prefix(&self, prefix: &str) -> u64 {
        let mut entries = self.entries.lock().expect("local cache lock poisoned");
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        (before - entries.len()) as u64
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("local cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodic pass run by the background sweeper.
    pub fn sweep(&self) {
        let mut entries = self.entries.lock().expect("local cache lock poisoned");
        match self.strategy {
            EvictionStrategy::Ttl => {
                let before = entries.len();
                entries.retain(|_, e| !e.expired());
                let purged = before - entries.len();
                if purged > 0 {
                    debug!(purged = purged, "swept expired cache entries");
                }
            }
            EvictionStrategy::None => {}
            _ => {
                if entries.len() > self.max_items {
                    self.evict_locked(&mut entries, None);
                }
            }
        }
    }

    fn evict_locked(&self, entries: &mut HashMap<String, CacheEntry>, exclude: Option<&str>) {
        let batch = self.eviction_batch();

        let mut candidates: Vec<(String, Instant, u64, u64)> = entries
            .iter()
            .filter(|(k, _)| exclude != Some(k.as_str()))
            .map(|(k, e)| (k.clone(), e.last_access, e.access_count, e.inserted_seq))
            .collect();

        match self.strategy {
            EvictionStrategy::Lru => {
                candidates.sort_by(|a, b| a.1.cmp(&b.1).then(a.3.cmp(&b.3)));
            }
            EvictionStrategy::Mru => {
                candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.3.cmp(&b.3)));
            }
            EvictionStrategy::Lfu => {
                candidates.sort_by(|a, b| a.2.cmp(&b.2).then(a.3.cmp(&b.3)));
            }
            EvictionStrategy::Ttl | EvictionStrategy::None => return,
        }

        let mut evicted = 0usize;
        for (key, _, _, _) in candidates.into_iter().take(batch) {
            entries.remove(&key);
            evicted += 1;
        }

        if evicted > 0 {
            debug!(
                evicted = evicted,
                strategy = ?self.strategy,
                len = entries.len(),
                "evicted cache entries over capacity"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_items: usize, strategy: EvictionStrategy) -> LocalStore {
        LocalStore::new(max_items, strategy)
    }

    #[test]
    fn test_eviction_batch_is_fifth_of_capacity_rounded_up() {
        assert_eq!(store(3, EvictionStrategy::Lru).eviction_batch(), 1);
        assert_eq!(store(10, EvictionStrategy::Lru).eviction_batch(), 2);
        assert_eq!(store(11, EvictionStrategy::Lru).eviction_batch(), 3);
    }

    #[test]
    fn test_lru_evicts_least_recently_accessed() {
        let store = store(3, EvictionStrategy::Lru);
        store.insert("a", "1", None);
        store.insert("b", "2", None);
        store.insert("c", "3", None);

        // a and b become recently accessed; c never touched after insert
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_some());

        store.insert("d", "4", None);

        assert_eq!(store.len(), 3);
        assert!(store.get("c").is_none());
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_some());
        assert!(store.get("d").is_some());
    }

    #[test]
    fn test_mru_evicts_most_recently_accessed() {
        let store = store(3, EvictionStrategy::Mru);
        store.insert("a", "1", None);
        store.insert("b", "2", None);
        store.insert("c", "3", None);

        // b is the most recently accessed existing entry
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_some());

        store.insert("d", "4", None);

        assert!(store.get("b").is_none());
        assert!(store.get("a").is_some());
        assert!(store.get("c").is_some());
        assert!(store.get("d").is_some());
    }

    #[test]
    fn test_lfu_evicts_least_frequently_accessed() {
        let store = store(3, EvictionStrategy::Lfu);
        store.insert("a", "1", None);
        store.insert("b", "2", None);
        store.insert("c", "3", None);

        store.get("a");
        store.get("a");
        store.get("b");

        store.insert("d", "4", None);

        assert!(store.get("c").is_none());
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_some());
    }

    #[test]
    fn test_ties_broken_by_insertion_order() {
        let store = store(3, EvictionStrategy::Lfu);
        store.insert("a", "1", None);
        store.insert("b", "2", None);
        store.insert("c", "3", None);

        // all at access_count 0: earliest inserted goes first
        store.insert("d", "4", None);

        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn test_ttl_sweep_purges_expired_only() {
        let store = store(2, EvictionStrategy::Ttl);
        store.insert("gone", "1", Some(Duration::from_millis(0)));
        store.insert("kept", "2", Some(Duration::from_secs(3600)));
        store.insert("forever", "3", None);

        std::thread::sleep(Duration::from_millis(5));
        store.sweep();

        // over capacity is fine for the TTL strategy
        assert_eq!(store.len(), 2);
        assert!(store.get("kept").is_some());
        assert!(store.get("forever").is_some());
    }

    #[test]
    fn test_none_strategy_never_evicts() {
        let store = store(2, EvictionStrategy::None);
        store.insert("a", "1", None);
        store.insert("b", "2", None);
        store.insert("c", "3", None);
        store.sweep();
        assert_eq!(store.len(), 3);

        // expiry still honored at read time
        store.insert("d", "4", Some(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.get("d").is_none());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("lru".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lru);
        assert_eq!("TTL".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Ttl);
        assert!("fifo".parse::<EvictionStrategy>().is_err());
    }
}
