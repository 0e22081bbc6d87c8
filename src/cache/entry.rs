//! Cache entry types

use bytes::Bytes;

use super::RecordId;

/// Per-record timestamp, carried opaquely from writes and handed back on
/// reads. The all-zero value is the "empty" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordTimestamp {
    /// Seconds component
    pub secs: u64,
    /// Nanoseconds component
    pub nanos: u32,
}

impl RecordTimestamp {
    /// The empty-timestamp sentinel
    pub const EMPTY: RecordTimestamp = RecordTimestamp { secs: 0, nanos: 0 };

    /// Create a timestamp from its components.
    pub const fn new(secs: u64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Whether this is the empty sentinel
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

/// Current wall-clock time as whole seconds since the Unix epoch
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// One cached record with its scheduling metadata
///
/// The payload is an immutable shared buffer: writes build a replacement
/// buffer and reseat the field, so a snapshot handed out by an earlier read
/// keeps observing the bytes it was given.
#[derive(Debug)]
pub struct CacheEntry {
    id: RecordId,
    payload: Bytes,
    /// Absolute expiry time in epoch seconds; 0 means no TTL
    lifetime: u64,
    /// Absolute flush deadline in epoch seconds; 0 means clean
    synctime: u64,
    timestamp: RecordTimestamp,
    user_flags: u64,
    remove_from_disk: bool,
    /// Current position key in the shard's recency order
    lru_seq: u64,
}

impl CacheEntry {
    /// Create an entry with the given payload and no scheduling state.
    pub fn new(id: RecordId, payload: Bytes, remove_from_disk: bool) -> Self {
        Self {
            id,
            payload,
            lifetime: 0,
            synctime: 0,
            timestamp: RecordTimestamp::EMPTY,
            user_flags: 0,
            remove_from_disk,
            lru_seq: 0,
        }
    }

    /// Record identifier
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// Shared handle to the current payload
    pub fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Replace the payload buffer.
    pub fn reseat_payload(&mut self, payload: Bytes) {
        self.payload = payload;
    }

    /// Absolute expiry time; 0 means no TTL
    pub fn lifetime(&self) -> u64 {
        self.lifetime
    }

    pub fn set_lifetime(&mut self, lifetime: u64) {
        self.lifetime = lifetime;
    }

    /// Absolute flush deadline; 0 means clean
    pub fn synctime(&self) -> u64 {
        self.synctime
    }

    pub fn set_synctime(&mut self, synctime: u64) {
        self.synctime = synctime;
    }

    pub fn clear_synctime(&mut self) {
        self.synctime = 0;
    }

    /// Whether a flush to the backend is pending
    pub fn is_dirty(&self) -> bool {
        self.synctime != 0
    }

    pub fn timestamp(&self) -> RecordTimestamp {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: RecordTimestamp) {
        self.timestamp = timestamp;
    }

    pub fn user_flags(&self) -> u64 {
        self.user_flags
    }

    pub fn set_user_flags(&mut self, user_flags: u64) {
        self.user_flags = user_flags;
    }

    /// Whether TTL expiry and explicit delete cascade to the backend
    pub fn remove_from_disk(&self) -> bool {
        self.remove_from_disk
    }

    pub(crate) fn lru_seq(&self) -> u64 {
        self.lru_seq
    }

    pub(crate) fn set_lru_seq(&mut self, seq: u64) {
        self.lru_seq = seq;
    }
}

/// Immutable view of a payload returned to a reader
///
/// Valid for as long as the caller holds it, independent of any later
/// mutation or eviction of the entry it came from.
#[derive(Debug, Clone)]
pub struct ReadSnapshot {
    /// Payload bytes as of the read
    pub payload: Bytes,
    /// Entry timestamp as of the read
    pub timestamp: RecordTimestamp,
    /// Entry user flags as of the read
    pub user_flags: u64,
}

// =============================================================================
// Tests
// =============================================================================
