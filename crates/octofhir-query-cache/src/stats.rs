//! Cache statistics for operational introspection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Point-in-time statistics of the in-memory tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryCacheStats {
    pub entry_count: u64,
    /// Sum of entry weights in bytes
    pub memory_usage_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub load_successes: u64,
    pub load_failures: u64,
    /// Cumulative time spent loading from the next tier
    pub total_load_time: Duration,
    /// Refresh-ahead recomputations started
    pub refreshes: u64,
}

impl MemoryCacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits, self.misses)
    }
}

/// Point-in-time statistics of the disk tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiskCacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Stored values that failed to decode (counted as misses too)
    pub decode_failures: u64,
    pub writes: u64,
    pub write_failures: u64,
    /// Writes dropped because the write queue was full or closed
    pub dropped_writes: u64,
}

impl DiskCacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits, self.misses)
    }
}

/// Statistics of every enabled tier.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub memory: Option<MemoryCacheStats>,
    pub disk: Option<DiskCacheStats>,
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        (hits as f64 / total as f64) * 100.0
    }
}

/// Lock-free counters shared between a tier and its background tasks.
#[derive(Debug, Default)]
pub(crate) struct Counter(AtomicU64);

impl Counter {
    pub(crate) fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = MemoryCacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 75.0);
        assert_eq!(DiskCacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_counter() {
        let counter = Counter::default();
        counter.incr();
        counter.add(4);
        assert_eq!(counter.get(), 5);
    }
}
