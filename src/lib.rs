//! dkv-cache - In-Memory Write-Through Cache for a Distributed KV Storage Node
//!
//! The caching layer that sits between a storage node's command dispatchers
//! and its durable backend store. Hot records live in RAM across a fixed set
//! of independent shards; dirty data flushes to the backend on a deadline,
//! entries expire after configurable lifetimes, and capacity pressure evicts
//! in LRU order without ever dropping the only copy of dirty data.
//!
//! # Architecture
//!
//! ```text
//! wire layer ──▶ dispatch ──▶ CacheManager ──▶ shards (lock + indices + worker)
//!                                                  │
//!                                                  ▼
//!                                           Backend store
//! ```
//!
//! # Modules
//!
//! - [`cache`] - the engine: manager, shards, entries, statistics
//! - [`backend`] - the durable store trait and the in-memory reference impl
//! - [`dispatch`] - command boundary consumed by the wire layer
//! - [`io`] - per-command IO attributes and flags
//! - [`digest`] - payload digests for compare-and-swap
//! - [`config`] - cache configuration
//! - [`error`] - error types
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use dkv_cache::{
//!     CacheConfig, CacheManager, IoAttributes, IoFlags, MemoryBackend, RecordId,
//!     Sha512Digester,
//! };
//!
//! let config = CacheConfig {
//!     total_bytes: 64 * 1024 * 1024,
//!     ..CacheConfig::default()
//! };
//! let backend = Arc::new(MemoryBackend::new());
//! let cache = CacheManager::new(&config, backend, Arc::new(Sha512Digester))?;
//!
//! let id = RecordId::from_bytes(b"some digest-derived identifier");
//! let io = IoAttributes::with_flags(IoFlags::CACHE | IoFlags::CACHE_ONLY);
//! cache.write(&id, &io, b"hot value")?;
//!
//! let snapshot = cache.read(&id, IoFlags::CACHE_ONLY)?.expect("cached");
//! assert_eq!(snapshot.payload.as_ref(), b"hot value");
//!
//! cache.shutdown();
//! # Ok::<(), dkv_cache::Error>(())
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod digest;
pub mod dispatch;
pub mod error;
pub mod io;

// Re-export commonly used types
pub use backend::{Backend, BackendRecord, BackendStats, MemoryBackend};
pub use cache::{
    CacheManager, CacheStats, ReadSnapshot, RecordId, RecordTimestamp, ShardStats, ID_SIZE,
};
pub use config::CacheConfig;
pub use digest::{Digester, Sha512Digester};
pub use dispatch::{dispatch, Command, ReplySink};
pub use error::{Error, Result};
pub use io::{IoAttributes, IoFlags};
