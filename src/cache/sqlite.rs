//! SQLite-backed persistent cache.
//!
//! Survives restarts and can be shared by several processes pointing at the
//! same file. Uses the same oldest-20%-first eviction as the memory backend.

use super::{eviction_count, is_expired, CacheBackend, CacheKey, CacheStats, Clock, SystemClock};
use crate::config::CacheBackendKind;
use crate::error::{Result, YtAgentError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    inserted_at INTEGER NOT NULL,
    ttl_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_inserted_at ON cache_entries(inserted_at);
"#;

/// SQLite cache backend.
pub struct SqliteCache {
    conn: Mutex<Connection>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl SqliteCache {
    /// Open (or create) a cache database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path, max_entries: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite cache at {:?}", path);

        Ok(Self::from_connection(conn, max_entries, Arc::new(SystemClock)))
    }

    /// Create an in-memory SQLite cache (useful for testing).
    pub fn in_memory(max_entries: usize) -> Result<Self> {
        Self::in_memory_with_clock(max_entries, Arc::new(SystemClock))
    }

    /// In-memory database with a custom time source.
    pub fn in_memory_with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn, max_entries, clock))
    }

    fn from_connection(conn: Connection, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            conn: Mutex::new(conn),
            max_entries: max_entries.max(1),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| YtAgentError::Cache(format!("Failed to acquire lock: {}", e)))
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[async_trait]
impl CacheBackend for SqliteCache {
    fn kind(&self) -> CacheBackendKind {
        CacheBackendKind::Sqlite
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        let now = self.clock.now();
        let conn = self.lock()?;

        let row: Option<(String, i64, i64)> = conn
            .query_row(
                "SELECT value, inserted_at, ttl_ms FROM cache_entries WHERE key = ?1",
                params![key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((value, inserted_at, ttl_ms)) => {
                let ttl = Duration::from_millis(ttl_ms.max(0) as u64);
                if is_expired(millis_to_datetime(inserted_at), ttl, now) {
                    conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key.as_str()])?;
                    debug!("Dropped expired entry");
                    Ok(None)
                } else {
                    Ok(Some(value))
                }
            }
            None => Ok(None),
        }
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn insert(&self, key: CacheKey, value: String, ttl: Duration) -> Result<()> {
        let now = self.clock.now();
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM cache_entries WHERE key = ?1",
                params![key.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        let count: i64 = tx.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;

        if !exists && count as usize >= self.max_entries {
            let evict = eviction_count(self.max_entries) as i64;
            let removed = tx.execute(
                r#"
                DELETE FROM cache_entries WHERE key IN (
                    SELECT key FROM cache_entries ORDER BY inserted_at ASC LIMIT ?1
                )
                "#,
                params![evict],
            )?;
            debug!("Evicted {} oldest cache entries", removed);
        }

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        tx.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries (key, value, inserted_at, ttl_ms)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![key.as_str(), value, now.timestamp_millis(), ttl_ms],
        )?;

        tx.commit()?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM cache_entries", [])?;
        info!("Cleared {} cache entries", removed);
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;

        Ok(CacheStats {
            backend: self.kind().to_string(),
            size: count as usize,
            max_size: self.max_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_clock::ManualClock;

    fn key(n: usize) -> CacheKey {
        CacheKey::from_raw(format!("key-{}", n))
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let clock = Arc::new(ManualClock::new());
        let cache = SqliteCache::in_memory_with_clock(10, clock.clone()).unwrap();

        cache
            .insert(key(1), "transcript".to_string(), Duration::from_secs(86_400))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(86_399));
        assert_eq!(cache.get(&key(1)).await.unwrap().as_deref(), Some("transcript"));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get(&key(1)).await.unwrap(), None);
        assert_eq!(cache.stats().await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_evicts_oldest_when_full() {
        let clock = Arc::new(ManualClock::new());
        let cache = SqliteCache::in_memory_with_clock(5, clock.clone()).unwrap();

        for n in 0..5 {
            cache.insert(key(n), "v".to_string(), Duration::from_secs(60)).await.unwrap();
            clock.advance(Duration::from_secs(1));
        }
        cache.insert(key(5), "v".to_string(), Duration::from_secs(60)).await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.size, 5);
        assert_eq!(cache.get(&key(0)).await.unwrap(), None);
        assert!(cache.get(&key(1)).await.unwrap().is_some());
        assert!(cache.get(&key(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let cache = SqliteCache::new(&path, 100).unwrap();
            cache.insert(key(1), "kept".to_string(), Duration::from_secs(3600)).await.unwrap();
        }

        let reopened = SqliteCache::new(&path, 100).unwrap();
        assert_eq!(reopened.get(&key(1)).await.unwrap().as_deref(), Some("kept"));

        let stats = reopened.stats().await.unwrap();
        assert_eq!(stats.backend, "sqlite");
        assert_eq!(stats.size, 1);

        reopened.clear().await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().size, 0);
    }
}
