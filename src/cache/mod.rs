//! Memoizing cache in front of the retrieval tools.
//!
//! Keys are a pure function of call identity (tool name plus normalized
//! arguments). Expiry is tracked separately on each entry, so the same logical
//! call always maps to the same key no matter when it is made.
//!
//! Two backends implement [`CacheBackend`]: a bounded in-process map and a
//! persistent SQLite file. [`ToolCache`] wraps either one and adds
//! `get_or_compute`.
//!
//! Concurrent misses on the same key are not coalesced: two callers may both
//! run the computation, and the later write wins.

mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use crate::config::{CacheBackendKind, Settings};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fraction of entries dropped when a bounded backend is full (1/5 = 20%).
pub(crate) const EVICTION_DIVISOR: usize = 5;

/// Number of oldest entries to evict from a full cache of the given capacity.
pub(crate) fn eviction_count(capacity: usize) -> usize {
    (capacity / EVICTION_DIVISOR).max(1)
}

/// Deterministic digest identifying one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a call of `tool` with `args`.
    ///
    /// Object keys are sorted at every depth before hashing, so argument maps
    /// built in different orders produce the same key.
    pub fn derive(tool: &str, args: &Map<String, Value>) -> Self {
        let mut canonical = String::with_capacity(64);
        canonical.push_str("{\"args\":");
        write_canonical(&Value::Object(args.clone()), &mut canonical);
        canonical.push_str(",\"tool\":");
        write_canonical(&Value::String(tool.to_string()), &mut canonical);
        canonical.push('}');

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Hex form of the digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: String) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short prefix is enough for logs.
        write!(f, "{}", &self.0[..self.0.len().min(12)])
    }
}

/// Serialize a JSON value with object keys in sorted order.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// A stored tool result with its expiry metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: String,
    pub inserted_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    /// Create an entry stamped with `inserted_at`.
    pub fn new(key: CacheKey, value: String, inserted_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key,
            value,
            inserted_at,
            ttl,
        }
    }

    /// An entry is expired once it is strictly older than its TTL.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.inserted_at, self.ttl, now)
    }
}

pub(crate) fn is_expired(inserted_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    let age_ms = (now - inserted_at).num_milliseconds();
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    age_ms > ttl_ms
}

/// Read-only snapshot of a backend's size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Backend kind ("memory" or "sqlite").
    #[serde(rename = "type")]
    pub backend: String,
    /// Current number of entries, expired ones included until they are touched.
    pub size: usize,
    /// Entry limit.
    pub max_size: usize,
}

/// Source of "now" for TTL bookkeeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Storage behind the tool cache.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend kind.
    fn kind(&self) -> CacheBackendKind;

    /// Fetch an unexpired value. Expired entries are dropped and reported as absent.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>>;

    /// Store a value, evicting the oldest entries first if the backend is full.
    async fn insert(&self, key: CacheKey, value: String, ttl: Duration) -> Result<()>;

    /// Remove every entry.
    async fn clear(&self) -> Result<()>;

    /// Current size and limit.
    async fn stats(&self) -> Result<CacheStats>;
}

/// Memoization layer shared by every query.
#[derive(Clone)]
pub struct ToolCache {
    backend: Arc<dyn CacheBackend>,
}

impl ToolCache {
    /// Wrap an existing backend.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Build the backend selected in the settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let max_entries = settings.cache.max_entries;
        let backend: Arc<dyn CacheBackend> = match settings.cache.backend {
            CacheBackendKind::Memory => Arc::new(MemoryCache::new(max_entries)),
            CacheBackendKind::Sqlite => {
                Arc::new(SqliteCache::new(&settings.cache_path(), max_entries)?)
            }
        };
        debug!("Using {} cache backend", settings.cache.backend);
        Ok(Self::new(backend))
    }

    /// Return the cached value for `key`, or run `compute` and cache its result.
    ///
    /// A failing `compute` is returned as-is and nothing is stored. Backend
    /// failures never fail the call: a broken read counts as a miss and a
    /// broken write is skipped.
    pub async fn get_or_compute<F, Fut>(&self, key: &CacheKey, ttl: Duration, compute: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        match self.backend.get(key).await {
            Ok(Some(value)) => {
                debug!("Cache hit for {}", key);
                return Ok(value);
            }
            Ok(None) => debug!("Cache miss for {}", key),
            Err(e) => warn!("Cache read failed for {}: {}", key, e),
        }

        let value = compute().await?;

        if let Err(e) = self.backend.insert(key.clone(), value.clone(), ttl).await {
            warn!("Cache write failed for {}: {}", key, e);
        }

        Ok(value)
    }

    /// Remove every entry.
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }

    /// Current size and limit.
    pub async fn stats(&self) -> Result<CacheStats> {
        self.backend.stats().await
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use super::Clock;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Clock that only moves when told to.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += chrono::Duration::from_std(by).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::YtAgentError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_key_ignores_argument_order() {
        let mut a = Map::new();
        a.insert("video_id".to_string(), json!("dQw4w9WgXcQ"));
        a.insert("language".to_string(), json!("en"));

        let mut b = Map::new();
        b.insert("language".to_string(), json!("en"));
        b.insert("video_id".to_string(), json!("dQw4w9WgXcQ"));

        assert_eq!(
            CacheKey::derive("fetch_transcript", &a),
            CacheKey::derive("fetch_transcript", &b)
        );
    }

    #[test]
    fn test_key_sorts_nested_objects() {
        let a = args(json!({"filter": {"b": 1, "a": [ {"y": 2, "x": 1} ]}}));
        let b = args(json!({"filter": {"a": [ {"x": 1, "y": 2} ], "b": 1}}));
        assert_eq!(CacheKey::derive("t", &a), CacheKey::derive("t", &b));
    }

    #[test]
    fn test_key_distinguishes_calls() {
        let a = args(json!({"query": "rust"}));
        let b = args(json!({"query": "go"}));
        assert_ne!(CacheKey::derive("search_youtube", &a), CacheKey::derive("search_youtube", &b));
        assert_ne!(CacheKey::derive("search_youtube", &a), CacheKey::derive("other_tool", &a));
        assert_eq!(CacheKey::derive("search_youtube", &a).as_str().len(), 64);
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let clock = test_clock::ManualClock::new();
        let entry = CacheEntry::new(
            CacheKey::from_raw("k".to_string()),
            "v".to_string(),
            clock.now(),
            Duration::from_secs(10),
        );

        clock.advance(Duration::from_millis(9_999));
        assert!(!entry.is_expired_at(clock.now()));
        clock.advance(Duration::from_millis(2));
        assert!(entry.is_expired_at(clock.now()));
    }

    #[tokio::test]
    async fn test_get_or_compute_hits_skip_compute() {
        let cache = ToolCache::new(Arc::new(MemoryCache::new(10)));
        let key = CacheKey::derive("search_youtube", &args(json!({"query": "rust"})));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_compute(&key, Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("results".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "results");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    async fn hammer(cache: ToolCache, max_entries: usize) {
        let mut tasks = Vec::new();
        for worker in 0..8 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..25 {
                    let n = (worker * 7 + i) % 30;
                    let key = CacheKey::derive("search_youtube", &args(json!({"query": format!("q{}", n)})));
                    let value = cache
                        .get_or_compute(&key, Duration::from_secs(60), || async move {
                            tokio::task::yield_now().await;
                            Ok(format!("results for q{}", n))
                        })
                        .await
                        .unwrap();
                    assert_eq!(value, format!("results for q{}", n));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stats = cache.stats().await.unwrap();
        assert!(stats.size >= 1);
        assert!(stats.size <= max_entries, "{} entries over a limit of {}", stats.size, max_entries);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_memory_cache_stays_bounded() {
        hammer(ToolCache::new(Arc::new(MemoryCache::new(10))), 10).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sqlite_cache_stays_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteCache::new(&dir.path().join("cache.db"), 10).unwrap();
        hammer(ToolCache::new(Arc::new(backend)), 10).await;
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = ToolCache::new(Arc::new(MemoryCache::new(10)));
        let key = CacheKey::derive("fetch_transcript", &args(json!({"video_id": "x"})));
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_compute(&key, Duration::from_secs(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(YtAgentError::tool("fetch_transcript", "boom"))
            })
            .await;
        assert!(first.is_err());

        let second = cache
            .get_or_compute(&key, Duration::from_secs(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("transcript".to_string())
            })
            .await
            .unwrap();

        assert_eq!(second, "transcript");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().await.unwrap().size, 1);
    }

    #[test]
    fn test_eviction_count() {
        assert_eq!(eviction_count(1000), 200);
        assert_eq!(eviction_count(10), 2);
        assert_eq!(eviction_count(3), 1);
    }
}
