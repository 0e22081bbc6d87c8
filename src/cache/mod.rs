//! In-Memory Write-Through Cache
//!
//! Sharded LRU+TTL cache absorbing hot key/value traffic in front of the
//! durable backend store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          Cache Manager                               │
//! │                 route: first id word mod shard count                 │
//! ├────────────────────┬────────────────────┬────────────────────────────┤
//! │      Shard 0       │      Shard 1       │           ...              │
//! │ ┌────────────────┐ │ ┌────────────────┐ │                            │
//! │ │ primary index  │ │ │ primary index  │ │  per shard:                │
//! │ │ LRU order      │ │ │ LRU order      │ │  - one mutex               │
//! │ │ lifetime index │ │ │ lifetime index │ │  - byte accounting         │
//! │ │ sync index     │ │ │ sync index     │ │  - maintenance worker      │
//! │ └────────────────┘ │ └────────────────┘ │    (expire + flush, ~1 s)  │
//! └────────────────────┴────────────────────┴────────────────────────────┘
//!                                │
//!                                ▼
//!                     Backend store (durable)
//! ```
//!
//! # Design
//!
//! - Shards share nothing; a key's shard owns it exclusively
//! - Entries are reachable through four cooperating indices sharing one
//!   table slot
//! - Dirty entries flush to the backend before the only cached copy is
//!   dropped, whatever dropped it (eviction, TTL, delete, teardown)
//! - Read snapshots are reference-counted payload handles, immune to later
//!   writes

mod entry;
mod id;
mod manager;
mod shard;
mod stats;

pub use entry::{ReadSnapshot, RecordTimestamp};
pub use id::RecordId;
pub use manager::CacheManager;
pub use stats::{CacheStats, ShardStats};

use std::time::Duration;

/// Width of a record identifier in bytes
pub const ID_SIZE: usize = 64;

/// Cadence of the per-shard maintenance worker
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_width_matches_digest() {
        // Identifiers are SHA-512 outputs
        assert_eq!(ID_SIZE, 64);
    }

    #[test]
    fn test_maintenance_cadence() {
        assert_eq!(MAINTENANCE_INTERVAL, Duration::from_secs(1));
    }
}
