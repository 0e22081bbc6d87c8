//! Backend store interface
//!
//! The durable store behind the cache: populate-on-miss reads from it, dirty
//! entries flush to it, and TTL-expired entries marked remove-from-disk are
//! deleted from it.
//!
//! # Design
//!
//! - Blocking calls: the cache invokes the backend while holding a shard
//!   lock, so the expected latency class is local disk
//! - Implementations must be thread-safe and self-contained: a backend must
//!   never call back into the cache, or it would deadlock on the shard lock
//! - `MemoryBackend` is the in-process reference implementation used by the
//!   test suites

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;

use crate::cache::{RecordId, RecordTimestamp};
use crate::error::Result;

/// A record as stored in the backend
#[derive(Debug, Clone)]
pub struct BackendRecord {
    /// Payload bytes
    pub payload: Bytes,
    /// Timestamp carried with the record
    pub timestamp: RecordTimestamp,
    /// Opaque user tag carried with the record
    pub user_flags: u64,
}

impl BackendRecord {
    /// Create a record with an empty timestamp and no user flags.
    pub fn new(payload: Bytes) -> Self {
        Self {
            payload,
            timestamp: RecordTimestamp::EMPTY,
            user_flags: 0,
        }
    }
}

/// Durable store trait
pub trait Backend: Send + Sync {
    /// Read a record. `Ok(None)` means the key is absent.
    fn read(&self, id: &RecordId) -> Result<Option<BackendRecord>>;

    /// Write (replace) a record.
    fn write(&self, id: &RecordId, record: BackendRecord) -> Result<()>;

    /// Remove a record. `Ok(false)` means the key was absent.
    fn remove(&self, id: &RecordId) -> Result<bool>;
}

/// Backend statistics
#[derive(Debug, Clone, Default)]
pub struct BackendStats {
    /// Records currently stored
    pub record_count: u64,
    /// Payload bytes currently stored
    pub total_bytes: u64,
    /// Read operations served
    pub reads: u64,
    /// Write operations served
    pub writes: u64,
    /// Remove operations served
    pub removes: u64,
}

/// In-memory backend for tests and embedding
///
/// Uses DashMap so concurrent shards never contend on a single lock.
pub struct MemoryBackend {
    records: DashMap<RecordId, BackendRecord>,
    total_bytes: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    removes: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
            total_bytes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            removes: AtomicU64::new(0),
        }
    }
}

impl MemoryBackend {
    /// Create a new empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current statistics
    pub fn stats(&self) -> BackendStats {
        BackendStats {
            record_count: self.records.len() as u64,
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
        }
    }
}

impl Backend for MemoryBackend {
    fn read(&self, id: &RecordId) -> Result<Option<BackendRecord>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.get(id).map(|r| r.clone()))
    }

    fn write(&self, id: &RecordId, record: BackendRecord) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);

        let size = record.payload.len() as u64;
        let old = self.records.insert(*id, record);

        if let Some(old_record) = old {
            let old_size = old_record.payload.len() as u64;
            if size > old_size {
                self.total_bytes.fetch_add(size - old_size, Ordering::Relaxed);
            } else {
                self.total_bytes.fetch_sub(old_size - size, Ordering::Relaxed);
            }
        } else {
            self.total_bytes.fetch_add(size, Ordering::Relaxed);
        }

        Ok(())
    }

    fn remove(&self, id: &RecordId) -> Result<bool> {
        self.removes.fetch_add(1, Ordering::Relaxed);

        if let Some((_, record)) = self.records.remove(id) {
            self.total_bytes
                .fetch_sub(record.payload.len() as u64, Ordering::Relaxed);
            return Ok(true);
        }
        Ok(false)
    }
}

// =============================================================================
// Tests
// =============================================================================
