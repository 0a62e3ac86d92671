//! In-memory warm store in front of the disk store.
//!
//! Holds raw record bytes keyed by record file name. Entries are disposable:
//! losing one only costs a disk read.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tracing::warn;

use super::config::CacheConfig;

const METRIC_WARM_EVICT: &str = "beacon_cache_warm_evict_total";

/// Bounded LRU of record bytes.
pub struct WarmStore {
    entries: RwLock<LruCache<String, Bytes>>,
}

impl WarmStore {
    /// Create a new warm store with the configured capacity.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.warm_capacity_non_zero())),
        }
    }

    /// Look up an entry without touching its recency.
    pub fn peek(&self, name: &str) -> Option<Bytes> {
        self.read(Some(name)).peek(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read(Some(name)).contains(name)
    }

    /// Insert or refresh an entry, evicting the least recently used one when full.
    pub fn add(&self, name: String, bytes: Bytes) {
        let evicted = self.write(Some(&name)).push(name.clone(), bytes);
        if evicted.is_some_and(|(evicted_name, _)| evicted_name != name) {
            counter!(METRIC_WARM_EVICT).increment(1);
        }
    }

    pub fn remove(&self, name: &str) {
        self.write(Some(name)).pop(name);
    }

    pub fn len(&self) -> usize {
        self.read(None).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // The LRU is only mutated through single calls, so entries stay whole
    // after a poisoning panic.
    fn read(&self, record: Option<&str>) -> RwLockReadGuard<'_, LruCache<String, Bytes>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!(record = ?record, access = "read", "warm store lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self, record: Option<&str>) -> RwLockWriteGuard<'_, LruCache<String, Bytes>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!(record = ?record, access = "write", "warm store lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}
