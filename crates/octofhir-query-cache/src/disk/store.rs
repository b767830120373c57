//! SQLite-backed population store.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};

use crate::config::DiskCacheConfig;
use crate::error::{CacheError, CacheResult};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS population_cache (
    query TEXT PRIMARY KEY NOT NULL,
    population BLOB NOT NULL,
    expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_population_cache_expires_at ON population_cache(expires_at);
"#;

/// Key-value store of encoded populations with a per-entry expiry.
///
/// Keys are rendered query strings, values the population binary encoding.
/// Expired rows are invisible to reads and removed by [`DiskStore::purge_expired`].
pub struct DiskStore {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
    ttl: Duration,
}

impl DiskStore {
    /// Open (or create) the store described by `config`.
    pub fn open(config: &DiskCacheConfig) -> CacheResult<Self> {
        Self::open_at(&config.path, config.ttl(), config.max_connections)
    }

    /// Open (or create) a store file with an explicit entry TTL.
    pub fn open_at(path: &Path, ttl: Duration, max_connections: u32) -> CacheResult<Self> {
        let open_error = |message: String| CacheError::Open {
            path: path.display().to_string(),
            message,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| open_error(e.to_string()))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
        });

        let pool = Pool::builder()
            .max_size(max_connections)
            .build(manager)
            .map_err(|e| open_error(e.to_string()))?;

        let store = Self {
            pool,
            path: path.to_path_buf(),
            ttl,
        };
        store.connection()?.execute_batch(SCHEMA)?;

        tracing::info!(path = %store.path.display(), ttl_secs = ttl.as_secs(), "Opened disk cache");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn connection(&self) -> CacheResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Read the stored bytes for `key` unless the entry has expired.
    pub fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let conn = self.connection()?;
        let value = conn
            .query_row(
                "SELECT population FROM population_cache WHERE query = ?1 AND expires_at > ?2",
                params![key, now_millis()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Store `bytes` under `key`, replacing any previous entry and restarting its TTL.
    pub fn put(&self, key: &str, bytes: &[u8]) -> CacheResult<()> {
        let expires_at = now_millis().saturating_add(duration_millis(self.ttl));
        self.connection()?.execute(
            "INSERT INTO population_cache (query, population, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(query) DO UPDATE SET population = excluded.population, expires_at = excluded.expires_at",
            params![key, bytes, expires_at],
        )?;
        Ok(())
    }

    /// Delete every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> CacheResult<usize> {
        let removed = self.connection()?.execute(
            "DELETE FROM population_cache WHERE expires_at <= ?1",
            params![now_millis()],
        )?;
        Ok(removed)
    }

    /// Number of live (unexpired) entries.
    pub fn entry_count(&self) -> CacheResult<u64> {
        let count: i64 = self.connection()?.query_row(
            "SELECT COUNT(*) FROM population_cache WHERE expires_at > ?1",
            params![now_millis()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Delete every entry, returning how many were removed.
    pub fn clear(&self) -> CacheResult<usize> {
        Ok(self.connection()?.execute("DELETE FROM population_cache", [])?)
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_millis)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(dir: &Path, ttl: Duration) -> DiskStore {
        DiskStore::open_at(&dir.join("populations.db"), ttl, 2).unwrap()
    }

    #[test]
    fn test_put_get_and_overwrite() {
        let dir = tempdir().unwrap();
        let store = open(dir.path(), Duration::from_secs(60));

        assert_eq!(store.get("Condition?code=a|b").unwrap(), None);

        store.put("Condition?code=a|b", &[0, 2, b'p', b'1']).unwrap();
        store.put("Condition?code=a|b", &[0]).unwrap();

        assert_eq!(store.get("Condition?code=a|b").unwrap(), Some(vec![0]));
        assert_eq!(store.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_expired_entries_are_invisible_and_purged() {
        let dir = tempdir().unwrap();
        let store = open(dir.path(), Duration::from_millis(20));

        store.put("Patient", &[0]).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(store.get("Patient").unwrap(), None);
        assert_eq!(store.entry_count().unwrap(), 0);
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.purge_expired().unwrap(), 0);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = open(dir.path(), Duration::from_secs(60));
            store.put("Observation?code=x|y", &[0, 1, b'a']).unwrap();
        }

        let store = open(dir.path(), Duration::from_secs(60));
        assert_eq!(
            store.get("Observation?code=x|y").unwrap(),
            Some(vec![0, 1, b'a'])
        );
        assert_eq!(store.clear().unwrap(), 1);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let store = DiskStore::open_at(&path, Duration::from_secs(1), 1).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }
}
