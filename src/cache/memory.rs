//! Bounded in-memory cache backend.
//!
//! When full, the oldest 20% of entries by insertion time are dropped before
//! a new key is stored. This approximates LRU by insertion order; reads do not
//! refresh an entry's position.

use super::{eviction_count, CacheBackend, CacheEntry, CacheKey, CacheStats, Clock, SystemClock};
use crate::config::CacheBackendKind;
use crate::error::{Result, YtAgentError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// In-memory cache backend.
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    /// Create a cache with a custom time source.
    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<CacheKey, CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|e| YtAgentError::Cache(format!("Failed to acquire lock: {}", e)))
    }
}

/// Drop the `count` oldest entries by insertion time.
fn evict_oldest(entries: &mut HashMap<CacheKey, CacheEntry>, count: usize) {
    let mut by_age: Vec<_> = entries
        .values()
        .map(|e| (e.inserted_at, e.key.clone()))
        .collect();
    by_age.sort_by(|a, b| a.0.cmp(&b.0));

    for (_, key) in by_age.into_iter().take(count) {
        entries.remove(&key);
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn kind(&self) -> CacheBackendKind {
        CacheBackendKind::Memory
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.lock()?;

        match entries.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn insert(&self, key: CacheKey, value: String, ttl: Duration) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.lock()?;

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let count = eviction_count(self.max_entries);
            evict_oldest(&mut entries, count);
            debug!("Evicted {} oldest cache entries", count);
        }

        entries.insert(key.clone(), CacheEntry::new(key, value, now, ttl));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        Ok(CacheStats {
            backend: self.kind().to_string(),
            size: self.lock()?.len(),
            max_size: self.max_entries,
        })
    }
}
