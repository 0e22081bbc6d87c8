//! Cache manager
//!
//! Owns the shards and their maintenance workers, routes commands by record
//! identifier, and tears the whole layer down in order on shutdown: stop
//! workers, join them, then flush what is still dirty.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::entry::ReadSnapshot;
use super::shard::CacheShard;
use super::stats::CacheStats;
use super::RecordId;
use crate::backend::Backend;
use crate::config::CacheConfig;
use crate::digest::{Digester, Sha512Digester};
use crate::error::{Error, Result};
use crate::io::{IoAttributes, IoFlags};

/// The node's in-memory write-through cache
pub struct CacheManager {
    shards: Vec<Arc<CacheShard>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheManager {
    /// Build the cache described by `config`, or `None` when the config
    /// disables it (`total_bytes == 0`).
    ///
    /// The node composes the result as an optional member; command dispatch
    /// reports "not supported" when no cache was built.
    pub fn from_config(
        config: &CacheConfig,
        backend: Arc<dyn Backend>,
        digester: Arc<dyn Digester>,
    ) -> Result<Option<Self>> {
        config.validate()?;
        if !config.is_enabled() {
            debug!("cache disabled by configuration");
            return Ok(None);
        }
        Self::new(config, backend, digester).map(Some)
    }

    /// Build an enabled cache.
    pub fn new(
        config: &CacheConfig,
        backend: Arc<dyn Backend>,
        digester: Arc<dyn Digester>,
    ) -> Result<Self> {
        config.validate()?;
        if !config.is_enabled() {
            return Err(Error::Config(
                "cache.total_bytes is 0, the cache is disabled".into(),
            ));
        }

        let per_shard = config.per_shard_bytes();
        let mut shards = Vec::with_capacity(config.shard_count);
        let mut workers = Vec::with_capacity(config.shard_count);

        for index in 0..config.shard_count {
            let shard = Arc::new(CacheShard::new(
                index,
                per_shard,
                config.sync_timeout_secs,
                backend.clone(),
                digester.clone(),
            ));

            let spawn = std::thread::Builder::new()
                .name(format!("cache-shard-{index}"))
                .spawn({
                    let shard = shard.clone();
                    move || shard.run_maintenance()
                });

            match spawn {
                Ok(handle) => {
                    workers.push(handle);
                    shards.push(shard);
                }
                Err(err) => {
                    // Unwind the shards whose workers already started
                    for shard in &shards {
                        shard.stop();
                    }
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(Error::Internal(format!(
                        "failed to spawn maintenance worker: {err}"
                    )));
                }
            }
        }

        info!(
            shards = config.shard_count,
            per_shard_bytes = per_shard,
            sync_timeout_secs = config.sync_timeout_secs,
            "cache initialized"
        );

        Ok(Self {
            shards,
            workers: Mutex::new(workers),
        })
    }

    /// Create over the in-memory backend and default digester (for testing).
    pub fn in_memory(config: &CacheConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(crate::backend::MemoryBackend::new()),
            Arc::new(Sha512Digester),
        )
    }

    fn shard(&self, id: &RecordId) -> &CacheShard {
        &self.shards[id.shard_index(self.shards.len())]
    }

    /// Write `data` into the record's shard.
    pub fn write(&self, id: &RecordId, io: &IoAttributes, data: &[u8]) -> Result<()> {
        self.shard(id).write(id, io, data)
    }

    /// Read the record from its shard; `Ok(None)` is a miss.
    pub fn read(&self, id: &RecordId, flags: IoFlags) -> Result<Option<ReadSnapshot>> {
        self.shard(id).read(id, flags)
    }

    /// Remove the record from its shard, cascading to the backend as the
    /// flags dictate.
    pub fn remove(&self, id: &RecordId, flags: IoFlags) -> Result<()> {
        self.shard(id).remove(id, flags)
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Aggregated statistics across all shards
    pub fn stats(&self) -> CacheStats {
        CacheStats::aggregate(self.shards.iter().map(|shard| shard.stats()).collect())
    }

    /// Stop and join every maintenance worker, then flush all remaining
    /// dirty entries to the backend. Idempotent; `Drop` calls it too.
    pub fn shutdown(&self) {
        for shard in &self.shards {
            shard.stop();
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            let _ = handle.join();
        }

        for shard in &self.shards {
            shard.clear();
        }

        debug!("cache shut down");
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Tests
// =============================================================================
