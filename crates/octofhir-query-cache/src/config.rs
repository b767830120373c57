//! Cache tier configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for both cache tiers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub memory: MemoryCacheConfig,

    #[serde(default)]
    pub disk: DiskCacheConfig,
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.memory.validate()?;
        self.disk.validate()
    }
}

/// Configuration for the in-memory (tier 1) cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Enable the in-memory tier
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Upper bound of the summed entry weights (query length + population footprint)
    #[serde(default = "default_max_weight_bytes")]
    pub max_weight_bytes: u64,

    /// Entries are dropped this long after they were written
    #[serde(default = "default_expire_after_write")]
    pub expire_after_write_secs: u64,

    /// Entries older than this are served stale while being recomputed
    #[serde(default = "default_refresh_after_write")]
    pub refresh_after_write_secs: u64,
}

impl MemoryCacheConfig {
    pub fn expire_after_write(&self) -> Duration {
        Duration::from_secs(self.expire_after_write_secs)
    }

    pub fn refresh_after_write(&self) -> Duration {
        Duration::from_secs(self.refresh_after_write_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.max_weight_bytes == 0 {
            return Err("cache.memory.max_weight_bytes must be positive".to_string());
        }
        if self.refresh_after_write_secs >= self.expire_after_write_secs {
            return Err(format!(
                "cache.memory.refresh_after_write_secs ({}) must be below expire_after_write_secs ({})",
                self.refresh_after_write_secs, self.expire_after_write_secs
            ));
        }
        Ok(())
    }
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_weight_bytes: default_max_weight_bytes(),
            expire_after_write_secs: default_expire_after_write(),
            refresh_after_write_secs: default_refresh_after_write(),
        }
    }
}

/// Configuration for the disk-backed (tier 2) cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskCacheConfig {
    /// Enable the disk tier
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// SQLite database file
    #[serde(default = "default_disk_path")]
    pub path: PathBuf,

    /// Time to live of every written entry
    #[serde(default = "default_disk_ttl")]
    pub ttl_secs: u64,

    /// Number of background writer tasks
    #[serde(default = "default_write_threads")]
    pub write_threads: usize,

    /// Pending writes beyond this are dropped
    #[serde(default = "default_write_queue_capacity")]
    pub write_queue_capacity: usize,

    /// Maximum number of pooled SQLite connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Interval of the background purge of expired entries
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl DiskCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.ttl_secs == 0 {
            return Err("cache.disk.ttl_secs must be positive".to_string());
        }
        if self.write_threads == 0 || self.write_queue_capacity == 0 {
            return Err(
                "cache.disk.write_threads and write_queue_capacity must be positive".to_string(),
            );
        }
        if self.max_connections == 0 {
            return Err("cache.disk.max_connections must be positive".to_string());
        }
        if self.purge_interval_secs == 0 {
            return Err("cache.disk.purge_interval_secs must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path: default_disk_path(),
            ttl_secs: default_disk_ttl(),
            write_threads: default_write_threads(),
            write_queue_capacity: default_write_queue_capacity(),
            max_connections: default_max_connections(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_weight_bytes() -> u64 {
    256 * 1024 * 1024
}

fn default_expire_after_write() -> u64 {
    48 * 60 * 60
}

fn default_refresh_after_write() -> u64 {
    24 * 60 * 60
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("cache/populations.db")
}

fn default_disk_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_write_threads() -> usize {
    4
}

fn default_write_queue_capacity() -> usize {
    1_024
}

fn default_max_connections() -> u32 {
    8
}

fn default_purge_interval() -> u64 {
    60 * 60
}
