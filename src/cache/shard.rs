//! Cache shard
//!
//! One independent partition of the cache: a multi-indexed entry table
//! behind a single mutex, plus the maintenance worker that expires and
//! flushes entries in the background.
//!
//! # Design
//!
//! - One `Mutex<ShardState>` serializes writes, reads, deletes,
//!   populate-from-disk, and the worker's per-element critical sections
//! - Four cooperating indices share the entry table: the primary `HashMap`,
//!   the LRU order (a `BTreeMap` keyed by a monotonic sequence number), and
//!   two `BTreeSet`s ordered by absolute expiry and flush deadline
//! - Backend calls run while the lock is held; the backend is expected to be
//!   local-disk latency class and must never reenter the cache
//! - Capacity is a soft bound within a single write: a payload larger than
//!   the shard empties it and stays resident anyway

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use super::entry::{unix_now, CacheEntry, ReadSnapshot};
use super::stats::{ShardCounters, ShardStats};
use super::{RecordId, MAINTENANCE_INTERVAL};
use crate::backend::{Backend, BackendRecord};
use crate::digest::Digester;
use crate::error::{Error, Result};
use crate::io::{IoAttributes, IoFlags};

/// Entry table and indices, guarded by the shard lock
struct ShardState {
    /// Primary index
    entries: HashMap<RecordId, CacheEntry>,
    /// Recency order: ascending sequence number, head = least recently used
    lru: BTreeMap<u64, RecordId>,
    next_lru_seq: u64,
    /// Entries with a TTL, ordered by absolute expiry
    lifetime_index: BTreeSet<(u64, RecordId)>,
    /// Dirty entries, ordered by flush deadline
    sync_index: BTreeSet<(u64, RecordId)>,
    /// Sum of cached payload sizes
    used_bytes: usize,
    /// Memory budget for this shard
    max_bytes: usize,
}

impl ShardState {
    fn new(max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: BTreeMap::new(),
            next_lru_seq: 0,
            lifetime_index: BTreeSet::new(),
            sync_index: BTreeSet::new(),
            used_bytes: 0,
            max_bytes,
        }
    }

    /// Take the entry out of the LRU order, leaving it in the primary index.
    fn detach_lru(&mut self, id: &RecordId) {
        if let Some(entry) = self.entries.get(id) {
            self.lru.remove(&entry.lru_seq());
        }
    }

    /// Queue the entry at the most-recently-used end.
    fn attach_lru_tail(&mut self, id: &RecordId) {
        let seq = self.next_lru_seq;
        self.next_lru_seq += 1;
        if let Some(entry) = self.entries.get_mut(id) {
            entry.set_lru_seq(seq);
            self.lru.insert(seq, *id);
        }
    }

    /// Move an entry to the most-recently-used end.
    fn touch(&mut self, id: &RecordId) {
        self.detach_lru(id);
        self.attach_lru_tail(id);
    }

    /// Mark an entry dirty with the given flush deadline.
    fn set_dirty_deadline(&mut self, id: &RecordId, synctime: u64) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.set_synctime(synctime);
            self.sync_index.insert((synctime, *id));
        }
    }

    /// Deindex a dirty entry and clear its deadline without flushing.
    fn clear_dirty(&mut self, id: &RecordId) {
        if let Some(entry) = self.entries.get_mut(id) {
            if entry.is_dirty() {
                self.sync_index.remove(&(entry.synctime(), *id));
                entry.clear_synctime();
            }
        }
    }

    /// Move a dirty entry to a new flush deadline.
    fn reschedule_dirty(&mut self, id: &RecordId, synctime: u64) {
        if let Some(entry) = self.entries.get_mut(id) {
            if entry.is_dirty() {
                self.sync_index.remove(&(entry.synctime(), *id));
            }
            entry.set_synctime(synctime);
            self.sync_index.insert((synctime, *id));
        }
    }

    /// Replace an entry's TTL. A zero `lifetime` clears it so the lifetime
    /// index holds exactly the entries with a TTL.
    fn reset_lifetime(&mut self, id: &RecordId, lifetime: u64) {
        if let Some(entry) = self.entries.get_mut(id) {
            if entry.lifetime() != 0 {
                self.lifetime_index.remove(&(entry.lifetime(), *id));
            }
            entry.set_lifetime(lifetime);
            if lifetime != 0 {
                self.lifetime_index.insert((lifetime, *id));
            }
        }
    }

    /// Insert a freshly created entry, evicting for capacity first.
    fn insert_new(&mut self, mut entry: CacheEntry, backend: &dyn Backend, counters: &ShardCounters) {
        let id = *entry.id();
        let size = entry.size();

        if self.used_bytes + size > self.max_bytes {
            self.evict_for(size, backend, counters);
        }

        self.used_bytes += size;

        let seq = self.next_lru_seq;
        self.next_lru_seq += 1;
        entry.set_lru_seq(seq);
        self.lru.insert(seq, id);
        self.entries.insert(id, entry);
    }

    /// Remove an entry from every index and drop it, flushing first if it is
    /// dirty. Capacity eviction, TTL expiry, delete, and teardown all funnel
    /// through here so dirty data reaches the backend before the only cached
    /// copy disappears.
    fn erase(&mut self, id: &RecordId, backend: &dyn Backend, counters: &ShardCounters) {
        let entry = match self.entries.remove(id) {
            Some(entry) => entry,
            None => return,
        };

        self.lru.remove(&entry.lru_seq());
        if entry.lifetime() != 0 {
            self.lifetime_index.remove(&(entry.lifetime(), *id));
        }
        if entry.is_dirty() {
            self.sync_index.remove(&(entry.synctime(), *id));
            let record = BackendRecord {
                payload: entry.payload(),
                timestamp: entry.timestamp(),
                user_flags: entry.user_flags(),
            };
            match backend.write(id, record) {
                Ok(()) => counters.record_flush(),
                Err(err) => {
                    counters.record_flush_failure();
                    // The entry is going away either way; nothing left to retry
                    error!(id = %id, error = %err, "flush on erase failed, cached data lost");
                }
            }
        }
        self.used_bytes -= entry.size();
    }

    /// Evict from the LRU head until `max_bytes > used_bytes + reserve` or
    /// the shard is empty. Always erases at least one entry.
    fn evict_for(&mut self, reserve: usize, backend: &dyn Backend, counters: &ShardCounters) {
        while let Some((_, id)) = self.lru.iter().next().map(|(seq, id)| (*seq, *id)) {
            self.erase(&id, backend, counters);
            counters.record_eviction();

            if self.max_bytes > reserve + self.used_bytes {
                break;
            }
        }
    }

    /// Load a record from the backend into the table.
    ///
    /// Returns whether an entry was created; absence in the backend is a
    /// plain miss, any other backend error propagates.
    fn populate_from_disk(
        &mut self,
        id: &RecordId,
        remove_from_disk: bool,
        backend: &dyn Backend,
        counters: &ShardCounters,
    ) -> Result<bool> {
        let record = match backend.read(id)? {
            Some(record) => record,
            None => return Ok(false),
        };

        let mut entry = CacheEntry::new(*id, record.payload, remove_from_disk);
        entry.set_timestamp(record.timestamp);
        entry.set_user_flags(record.user_flags);
        self.insert_new(entry, backend, counters);
        Ok(true)
    }
}

/// One independent cache partition
pub(crate) struct CacheShard {
    index: usize,
    state: Mutex<ShardState>,
    backend: Arc<dyn Backend>,
    digester: Arc<dyn Digester>,
    sync_timeout_secs: u64,
    counters: ShardCounters,
    stop_flag: AtomicBool,
    wait_lock: Mutex<()>,
    wakeup: Condvar,
}

impl CacheShard {
    pub fn new(
        index: usize,
        max_bytes: usize,
        sync_timeout_secs: u64,
        backend: Arc<dyn Backend>,
        digester: Arc<dyn Digester>,
    ) -> Self {
        Self {
            index,
            state: Mutex::new(ShardState::new(max_bytes)),
            backend,
            digester,
            sync_timeout_secs,
            counters: ShardCounters::default(),
            stop_flag: AtomicBool::new(false),
            wait_lock: Mutex::new(()),
            wakeup: Condvar::new(),
        }
    }

    /// Write `data` into the record, creating or populating it as the flags
    /// allow.
    pub fn write(&self, id: &RecordId, io: &IoAttributes, data: &[u8]) -> Result<()> {
        let cache = io.flags.contains(IoFlags::CACHE);
        let cache_only = io.flags.contains(IoFlags::CACHE_ONLY);
        let append = io.flags.contains(IoFlags::APPEND);
        let remove_from_disk = io.flags.contains(IoFlags::CACHE_REMOVE_FROM_DISK);

        let mut state = self.state.lock();

        if !state.entries.contains_key(id) {
            // Uncached key without the cache flag falls through to the
            // backend request path
            if !cache {
                return Err(Error::NotSupported("cache flag not set on write miss"));
            }

            if !cache_only {
                state.populate_from_disk(id, remove_from_disk, &*self.backend, &self.counters)?;
            }

            if !state.entries.contains_key(id) {
                state.insert_new(
                    CacheEntry::new(*id, Bytes::new(), remove_from_disk),
                    &*self.backend,
                    &self.counters,
                );
            }
        }

        let (old_size, old_payload) = match state.entries.get(id) {
            Some(entry) => (entry.size(), entry.payload()),
            None => return Err(Error::Internal("entry vanished under the shard lock".into())),
        };

        if io.flags.contains(IoFlags::COMPARE_AND_SWAP) && old_size != 0 {
            // An empty payload means the record does not exist on the node
            // yet, so there is nothing to compare against
            let checksum = self.digester.digest(&old_payload);
            if checksum != io.parent {
                warn!(id = %id, "compare-and-swap digest mismatch");
                return Err(Error::Stale { id: id.to_string() });
            }
        }

        let offset = io.offset as usize;
        let new_size = if append {
            old_size + data.len()
        } else {
            offset + data.len()
        };

        // Recount the entry at its new size, making room first and requeueing
        // it at the recently-used end
        state.used_bytes -= old_size;
        state.detach_lru(id);
        if state.used_bytes + new_size > state.max_bytes {
            state.evict_for(new_size.saturating_mul(2), &*self.backend, &self.counters);
        }
        state.attach_lru_tail(id);
        state.used_bytes += new_size;

        let new_payload = if append {
            let mut buf = BytesMut::with_capacity(new_size);
            buf.extend_from_slice(&old_payload);
            buf.extend_from_slice(data);
            buf.freeze()
        } else {
            // Keep the prefix, zero-fill any gap, land `data` at the offset;
            // the final length is exactly offset + data.len()
            let mut buf = BytesMut::with_capacity(new_size);
            let keep = old_payload.len().min(new_size);
            buf.extend_from_slice(&old_payload[..keep]);
            buf.resize(new_size, 0);
            buf[offset..].copy_from_slice(data);
            buf.freeze()
        };

        if let Some(entry) = state.entries.get_mut(id) {
            entry.reseat_payload(new_payload);
        }

        let already_dirty = state.entries.get(id).map(CacheEntry::is_dirty).unwrap_or(false);
        if !already_dirty && !cache_only {
            let synctime = unix_now() + self.sync_timeout_secs;
            state.set_dirty_deadline(id, synctime);
        }

        let lifetime = if io.start != 0 {
            unix_now() + io.start
        } else {
            0
        };
        state.reset_lifetime(id, lifetime);

        if let Some(entry) = state.entries.get_mut(id) {
            entry.set_timestamp(io.timestamp);
            entry.set_user_flags(io.user_flags);
        }

        Ok(())
    }

    /// Read the record, populating from the backend if the flags allow.
    ///
    /// `Ok(None)` is a miss; the snapshot stays valid across later writes
    /// and evictions.
    pub fn read(&self, id: &RecordId, flags: IoFlags) -> Result<Option<ReadSnapshot>> {
        let cache = flags.contains(IoFlags::CACHE);
        let cache_only = flags.contains(IoFlags::CACHE_ONLY);

        let mut state = self.state.lock();

        if !state.entries.contains_key(id) && cache && !cache_only {
            state.populate_from_disk(id, false, &*self.backend, &self.counters)?;
        }

        if !state.entries.contains_key(id) {
            self.counters.record_miss();
            return Ok(None);
        }

        state.touch(id);
        self.counters.record_hit();

        let snapshot = state.entries.get(id).map(|entry| ReadSnapshot {
            payload: entry.payload(),
            timestamp: entry.timestamp(),
            user_flags: entry.user_flags(),
        });
        Ok(snapshot)
    }

    /// Remove the record, cascading to the backend as the flags and the
    /// entry's sticky remove-from-disk marker dictate.
    pub fn remove(&self, id: &RecordId, flags: IoFlags) -> Result<()> {
        let cache_only = flags.contains(IoFlags::CACHE_ONLY);

        let mut cascade = false;
        let found;
        {
            let mut state = self.state.lock();
            let (present, is_dirty, remove_from_disk) = match state.entries.get(id) {
                Some(entry) => (true, entry.is_dirty(), entry.remove_from_disk()),
                None => (false, false, false),
            };
            found = present;

            if present {
                cascade = remove_from_disk || !cache_only;
                if is_dirty && !cache_only {
                    // The delete supersedes the pending write; a cache-only
                    // delete instead leaves the deadline in place so the
                    // erase below demotes the data to the backend
                    state.clear_dirty(id);
                }
                state.erase(id, &*self.backend, &self.counters);
            }
        }

        let mut result = if found { Ok(()) } else { Err(Error::NotFound) };

        if cascade {
            match self.backend.remove(id) {
                // Absence on disk does not override the in-memory result
                Ok(_) => {}
                Err(err) => result = Err(err),
            }
        }

        result
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> ShardStats {
        let state = self.state.lock();
        ShardStats::from_counters(&self.counters, state.used_bytes, state.entries.len())
    }

    /// Erase every entry, flushing dirty ones. Called on teardown after the
    /// worker has stopped.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let ids: Vec<RecordId> = state.lru.values().copied().collect();
        for id in ids {
            state.erase(&id, &*self.backend, &self.counters);
        }
    }

    /// Signal the maintenance worker to exit its next wait or pass boundary.
    pub fn stop(&self) {
        let _guard = self.wait_lock.lock();
        self.stop_flag.store(true, Ordering::SeqCst);
        self.wakeup.notify_all();
    }

    fn should_stop(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    /// Maintenance worker body: expire, flush, cascade deletes, sleep.
    pub fn run_maintenance(&self) {
        debug!(shard = self.index, "maintenance worker started");

        while !self.should_stop() {
            let mut to_remove = Vec::new();

            self.expiry_pass(&mut to_remove);
            self.sync_pass();

            for id in &to_remove {
                if let Err(err) = self.backend.remove(id) {
                    warn!(id = %id, error = %err, "backend remove after expiry failed");
                }
            }

            let mut guard = self.wait_lock.lock();
            if self.should_stop() {
                break;
            }
            let _ = self.wakeup.wait_for(&mut guard, MAINTENANCE_INTERVAL);
        }

        debug!(shard = self.index, "maintenance worker stopped");
    }

    /// Erase entries whose TTL has passed, collecting ids whose backend row
    /// must go too. The lock is retaken per element so a long expiry burst
    /// cannot starve command dispatchers.
    fn expiry_pass(&self, to_remove: &mut Vec<RecordId>) {
        loop {
            if self.should_stop() {
                return;
            }

            let mut state = self.state.lock();
            let now = unix_now();

            let (lifetime, id) = match state.lifetime_index.iter().next() {
                Some(&(lifetime, id)) => (lifetime, id),
                None => return,
            };
            if lifetime > now {
                return;
            }

            if let Some(entry) = state.entries.get(&id) {
                if entry.remove_from_disk() {
                    to_remove.push(id);
                }
            }

            state.erase(&id, &*self.backend, &self.counters);
            self.counters.record_expiration();
        }
    }

    /// Flush dirty entries whose deadline has passed. A failed flush keeps
    /// the entry dirty and reschedules it instead of dropping the marker.
    fn sync_pass(&self) {
        loop {
            if self.should_stop() {
                return;
            }

            let mut state = self.state.lock();
            let now = unix_now();

            let (synctime, id) = match state.sync_index.iter().next() {
                Some(&(synctime, id)) => (synctime, id),
                None => return,
            };
            if synctime > now {
                return;
            }

            let record = match state.entries.get(&id) {
                Some(entry) => BackendRecord {
                    payload: entry.payload(),
                    timestamp: entry.timestamp(),
                    user_flags: entry.user_flags(),
                },
                None => {
                    // Index row without an entry; drop it and move on
                    state.sync_index.remove(&(synctime, id));
                    continue;
                }
            };

            match self.backend.write(&id, record) {
                Ok(()) => {
                    self.counters.record_flush();
                    state.clear_dirty(&id);
                }
                Err(err) => {
                    self.counters.record_flush_failure();
                    warn!(id = %id, error = %err, "flush failed, rescheduling");
                    state.reschedule_dirty(&id, now + self.retry_backoff_secs());
                }
            }
        }
    }

    /// Backoff before retrying a failed flush. The configured sync timeout,
    /// but at least one worker interval so a zero timeout cannot spin.
    fn retry_backoff_secs(&self) -> u64 {
        self.sync_timeout_secs.max(MAINTENANCE_INTERVAL.as_secs())
    }

    #[cfg(test)]
    fn assert_invariants(&self) {
        let state = self.state.lock();

        let payload_total: usize = state.entries.values().map(CacheEntry::size).sum();
        assert_eq!(state.used_bytes, payload_total, "used_bytes out of sync");
        assert!(state.used_bytes <= state.max_bytes || state.entries.len() == 1);
        assert_eq!(state.entries.len(), state.lru.len(), "primary/lru mismatch");

        for entry in state.entries.values() {
            assert_eq!(state.lru.get(&entry.lru_seq()), Some(entry.id()));
            assert_eq!(
                entry.lifetime() != 0,
                state.lifetime_index.contains(&(entry.lifetime(), *entry.id())),
                "lifetime index mismatch"
            );
            assert_eq!(
                entry.is_dirty(),
                state.sync_index.contains(&(entry.synctime(), *entry.id())),
                "sync index mismatch"
            );
        }
        assert_eq!(state.lifetime_index.len(), {
            state.entries.values().filter(|e| e.lifetime() != 0).count()
        });
        assert_eq!(state.sync_index.len(), {
            state.entries.values().filter(|e| e.is_dirty()).count()
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
