//! Cache configuration
//!
//! Loaded by the node's configuration layer and handed to
//! [`CacheManager::new`](crate::CacheManager::new). A `total_bytes` of zero
//! disables the cache entirely; the node then runs every command against the
//! backend directly.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of independent cache shards
pub const DEFAULT_SHARD_COUNT: usize = 16;

/// Default delay from first dirtying of an entry to its scheduled flush
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 30;

/// Cache layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total RAM budget across all shards, in bytes. 0 disables the cache.
    pub total_bytes: usize,
    /// Number of independent shards
    pub shard_count: usize,
    /// Delay from first dirtying of an entry to its scheduled flush, seconds
    pub sync_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            total_bytes: 0,
            shard_count: DEFAULT_SHARD_COUNT,
            sync_timeout_secs: DEFAULT_SYNC_TIMEOUT_SECS,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with the given memory budget and defaults for
    /// the remaining fields.
    pub fn with_total_bytes(total_bytes: usize) -> Self {
        Self {
            total_bytes,
            ..Self::default()
        }
    }

    /// Whether the cache should be constructed at all
    pub fn is_enabled(&self) -> bool {
        self.total_bytes > 0
    }

    /// Validate field ranges.
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(Error::Config("shard_count must be at least 1".into()));
        }
        Ok(())
    }

    /// Memory budget of a single shard
    pub fn per_shard_bytes(&self) -> usize {
        self.total_bytes / self.shard_count
    }
}

// =============================================================================
// Tests
// =============================================================================
