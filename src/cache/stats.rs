//! Cache statistics
//!
//! Purely observational counters; no cache behavior depends on them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-shard operation counters
#[derive(Debug, Default)]
pub(crate) struct ShardCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub expirations: AtomicU64,
    pub flushes: AtomicU64,
    pub flush_failures: AtomicU64,
}

impl ShardCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time statistics for one shard
#[derive(Debug, Clone, Default)]
pub struct ShardStats {
    /// Payload bytes currently cached
    pub used_bytes: usize,
    /// Entries currently cached
    pub entries: usize,
    /// Read hits
    pub hits: u64,
    /// Read misses (after any populate attempt)
    pub misses: u64,
    /// Entries evicted for capacity
    pub evictions: u64,
    /// Entries removed by TTL expiry
    pub expirations: u64,
    /// Successful backend flushes
    pub flushes: u64,
    /// Failed backend flushes (entry rescheduled)
    pub flush_failures: u64,
}

impl ShardStats {
    pub(crate) fn from_counters(
        counters: &ShardCounters,
        used_bytes: usize,
        entries: usize,
    ) -> Self {
        Self {
            used_bytes,
            entries,
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            expirations: counters.expirations.load(Ordering::Relaxed),
            flushes: counters.flushes.load(Ordering::Relaxed),
            flush_failures: counters.flush_failures.load(Ordering::Relaxed),
        }
    }
}

/// Aggregated statistics across all shards
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Payload bytes currently cached
    pub used_bytes: usize,
    /// Entries currently cached
    pub entries: usize,
    /// Read hits
    pub hits: u64,
    /// Read misses
    pub misses: u64,
    /// Entries evicted for capacity
    pub evictions: u64,
    /// Entries removed by TTL expiry
    pub expirations: u64,
    /// Successful backend flushes
    pub flushes: u64,
    /// Failed backend flushes
    pub flush_failures: u64,
    /// Per-shard breakdown
    pub shards: Vec<ShardStats>,
}

impl CacheStats {
    /// Aggregate per-shard snapshots.
    pub(crate) fn aggregate(shards: Vec<ShardStats>) -> Self {
        let mut total = CacheStats::default();
        for shard in &shards {
            total.used_bytes += shard.used_bytes;
            total.entries += shard.entries;
            total.hits += shard.hits;
            total.misses += shard.misses;
            total.evictions += shard.evictions;
            total.expirations += shard.expirations;
            total.flushes += shard.flushes;
            total.flush_failures += shard.flush_failures;
        }
        total.shards = shards;
        total
    }

    /// Hit ratio over all reads so far (0.0 when no reads happened)
    pub fn hit_ratio(&self) -> f64 {
        let total = (self.hits + self.misses) as f64;
        if total == 0.0 {
            0.0
        } else {
            self.hits as f64 / total
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_roundtrip() {
        let counters = ShardCounters::default();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        counters.record_eviction();
        counters.record_flush();
        counters.record_flush_failure();
        counters.record_expiration();

        let stats = ShardStats::from_counters(&counters, 128, 3);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.flush_failures, 1);
        assert_eq!(stats.used_bytes, 128);
        assert_eq!(stats.entries, 3);
    }

    #[test]
    fn test_aggregate() {
        let a = ShardStats {
            used_bytes: 100,
            entries: 2,
            hits: 5,
            misses: 1,
            ..ShardStats::default()
        };
        let b = ShardStats {
            used_bytes: 50,
            entries: 1,
            hits: 3,
            misses: 3,
            ..ShardStats::default()
        };

        let total = CacheStats::aggregate(vec![a, b]);
        assert_eq!(total.used_bytes, 150);
        assert_eq!(total.entries, 3);
        assert_eq!(total.hits, 8);
        assert_eq!(total.misses, 4);
        assert_eq!(total.shards.len(), 2);
        assert!((total.hit_ratio() - 8.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_hit_ratio_no_reads() {
        assert_eq!(CacheStats::default().hit_ratio(), 0.0);
    }
}
