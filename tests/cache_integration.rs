//! Cache layer integration tests
//!
//! End-to-end scenarios over a live cache: single-shard command semantics,
//! background flush and expiry through the real maintenance workers, and
//! teardown durability.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use dkv_cache::digest::{digest_id, Sha512Digester};
use dkv_cache::{
    Backend, BackendRecord, CacheConfig, CacheManager, Digester, Error, IoAttributes, IoFlags,
    MemoryBackend, RecordId,
};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Single shard, 1000 byte budget, 1 s sync timeout: the configuration the
/// command-semantics scenarios assume
fn scenario_config() -> CacheConfig {
    CacheConfig {
        total_bytes: 1000,
        shard_count: 1,
        sync_timeout_secs: 1,
    }
}

fn make_id(name: &[u8]) -> RecordId {
    RecordId::from_bytes(name)
}

fn write_io(flags: IoFlags) -> IoAttributes {
    IoAttributes::with_flags(flags)
}

/// Poll the backend until `predicate` holds or `timeout` elapses.
fn wait_for(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    predicate()
}

// =============================================================================
// Command Semantics (single shard)
// =============================================================================

mod command_semantics {
    use super::*;

    #[test]
    fn test_simple_put_get() {
        init_tracing();
        let cache = CacheManager::in_memory(&scenario_config()).expect("cache");
        let id = make_id(b"A");

        cache
            .write(
                &id,
                &write_io(IoFlags::CACHE | IoFlags::CACHE_ONLY),
                b"hello",
            )
            .expect("write");

        let snapshot = cache
            .read(&id, IoFlags::CACHE_ONLY)
            .expect("read")
            .expect("hit");
        assert_eq!(snapshot.payload.as_ref(), b"hello");
        assert_eq!(cache.stats().used_bytes, 5);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = CacheManager::in_memory(&scenario_config()).expect("cache");
        let (a, b) = (make_id(b"A"), make_id(b"B"));
        let flags = IoFlags::CACHE | IoFlags::CACHE_ONLY;

        cache.write(&a, &write_io(flags), &[0u8; 600]).expect("write a");
        cache.write(&b, &write_io(flags), &[1u8; 600]).expect("write b");

        assert_eq!(cache.stats().used_bytes, 600);
        assert!(cache.read(&a, IoFlags::CACHE_ONLY).expect("read").is_none());
        assert!(cache.read(&b, IoFlags::CACHE_ONLY).expect("read").is_some());
    }

    #[test]
    fn test_cas_mismatch_leaves_payload() {
        let cache = CacheManager::in_memory(&scenario_config()).expect("cache");
        let digester = Sha512Digester;
        let id = make_id(b"C");
        let flags = IoFlags::CACHE | IoFlags::CACHE_ONLY;

        cache.write(&id, &write_io(flags), b"aaaa").expect("write");

        let mut io = write_io(flags | IoFlags::COMPARE_AND_SWAP);
        io.parent = digester.digest(b"zzzz");
        let err = cache.write(&id, &io, b"bbbb").unwrap_err();
        assert!(matches!(err, Error::Stale { .. }));

        let snapshot = cache
            .read(&id, IoFlags::CACHE_ONLY)
            .expect("read")
            .expect("hit");
        assert_eq!(snapshot.payload.as_ref(), b"aaaa");
    }

    #[test]
    fn test_append() {
        let cache = CacheManager::in_memory(&scenario_config()).expect("cache");
        let id = make_id(b"D");
        let flags = IoFlags::CACHE | IoFlags::CACHE_ONLY;

        cache.write(&id, &write_io(flags), b"foo").expect("write");
        cache
            .write(&id, &write_io(flags | IoFlags::APPEND), b"bar")
            .expect("append");

        let snapshot = cache
            .read(&id, IoFlags::CACHE_ONLY)
            .expect("read")
            .expect("hit");
        assert_eq!(snapshot.payload.as_ref(), b"foobar");
    }

    #[test]
    fn test_cache_only_roundtrip_never_touches_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = CacheManager::new(
            &scenario_config(),
            backend.clone(),
            Arc::new(Sha512Digester),
        )
        .expect("cache");
        let id = make_id(b"ram");
        let flags = IoFlags::CACHE | IoFlags::CACHE_ONLY;

        cache.write(&id, &write_io(flags), b"X").expect("write");
        cache
            .write(&id, &write_io(flags | IoFlags::APPEND), b"Y")
            .expect("append");
        cache.read(&id, IoFlags::CACHE_ONLY).expect("read").expect("hit");
        cache.shutdown();

        let stats = backend.stats();
        assert_eq!(stats.reads, 0);
        // Teardown flushes dirty entries only; cache-only writes are not dirty
        assert_eq!(stats.writes, 0);
    }
}

// =============================================================================
// Background Flush and Expiry (live workers)
// =============================================================================

mod maintenance {
    use super::*;

    #[test]
    fn test_dirty_entry_flushes_within_deadline() {
        init_tracing();
        let backend = Arc::new(MemoryBackend::new());
        let cache = CacheManager::new(
            &scenario_config(),
            backend.clone(),
            Arc::new(Sha512Digester),
        )
        .expect("cache");
        let id = make_id(b"flush-me");

        cache
            .write(&id, &write_io(IoFlags::CACHE), b"durable soon")
            .expect("write");

        // sync_timeout (1 s) + worker cadence (1 s) + slack
        let flushed = wait_for(Duration::from_secs(4), || {
            backend
                .read(&id)
                .expect("backend read")
                .map(|record| record.payload.as_ref() == b"durable soon")
                .unwrap_or(false)
        });
        assert!(flushed, "dirty entry never reached the backend");

        // The entry stays cached after its flush
        assert!(cache.read(&id, IoFlags::CACHE_ONLY).expect("read").is_some());
    }

    #[test]
    fn test_ttl_expiry_with_disk_cascade() {
        init_tracing();
        let backend = Arc::new(MemoryBackend::new());
        let id = make_id(b"E");
        backend
            .write(&id, BackendRecord::new(Bytes::from_static(b"x")))
            .expect("seed backend");

        let cache = CacheManager::new(
            &scenario_config(),
            backend.clone(),
            Arc::new(Sha512Digester),
        )
        .expect("cache");

        let mut io = write_io(IoFlags::CACHE | IoFlags::CACHE_REMOVE_FROM_DISK);
        io.start = 1;
        cache.write(&id, &io, b"y").expect("write");

        let gone = wait_for(Duration::from_secs(4), || {
            backend.read(&id).expect("backend read").is_none()
        });
        assert!(gone, "TTL expiry never cascaded to the backend");

        // A populating read now misses both cache and disk
        assert!(cache.read(&id, IoFlags::CACHE).expect("read").is_none());
    }

    #[test]
    fn test_ttl_expiry_without_cascade_keeps_backend_row() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = CacheManager::new(
            &scenario_config(),
            backend.clone(),
            Arc::new(Sha512Digester),
        )
        .expect("cache");
        let id = make_id(b"ttl-ram");

        let mut io = write_io(IoFlags::CACHE | IoFlags::CACHE_ONLY);
        io.start = 1;
        cache.write(&id, &io, b"transient").expect("write");

        let expired = wait_for(Duration::from_secs(4), || {
            cache
                .read(&id, IoFlags::CACHE_ONLY)
                .expect("read")
                .is_none()
        });
        assert!(expired, "TTL entry never expired from cache");
        assert_eq!(backend.stats().removes, 0);
    }
}

// =============================================================================
// Teardown Durability
// =============================================================================

mod shutdown {
    use super::*;

    #[test]
    fn test_dirty_flush_on_shutdown() {
        let backend = Arc::new(MemoryBackend::new());
        let config = CacheConfig {
            // Deadline far away: only the shutdown path can flush this
            sync_timeout_secs: 3600,
            ..scenario_config()
        };
        let cache =
            CacheManager::new(&config, backend.clone(), Arc::new(Sha512Digester)).expect("cache");
        let id = make_id(b"F");

        cache
            .write(&id, &write_io(IoFlags::CACHE), b"payload")
            .expect("write");
        cache.shutdown();

        let record = backend.read(&id).expect("backend read").expect("present");
        assert_eq!(record.payload.as_ref(), b"payload");
    }

    #[test]
    fn test_dirty_flush_on_drop() {
        let backend = Arc::new(MemoryBackend::new());
        let config = CacheConfig {
            sync_timeout_secs: 3600,
            ..scenario_config()
        };
        let id = make_id(b"G");

        {
            let cache = CacheManager::new(&config, backend.clone(), Arc::new(Sha512Digester))
                .expect("cache");
            cache
                .write(&id, &write_io(IoFlags::CACHE), b"scoped")
                .expect("write");
        }

        let record = backend.read(&id).expect("backend read").expect("present");
        assert_eq!(record.payload.as_ref(), b"scoped");
    }
}

// =============================================================================
// Concurrency
// =============================================================================

mod concurrency {
    use super::*;

    #[test]
    fn test_concurrent_dispatchers_per_key_order() {
        let config = CacheConfig {
            total_bytes: 8 * 1024 * 1024,
            shard_count: 16,
            sync_timeout_secs: 1,
        };
        let backend = Arc::new(MemoryBackend::new());
        let cache = Arc::new(
            CacheManager::new(&config, backend.clone(), Arc::new(Sha512Digester)).expect("cache"),
        );
        let digester = Sha512Digester;

        let handles: Vec<_> = (0..8u8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                let id = digest_id(&digester, &[t]);
                std::thread::spawn(move || {
                    let flags = IoFlags::CACHE | IoFlags::CACHE_ONLY;
                    cache
                        .write(&id, &write_io(flags), b"")
                        .expect("initial write");
                    for _ in 0..100 {
                        cache
                            .write(&id, &write_io(flags | IoFlags::APPEND), b".")
                            .expect("append");
                    }
                    let snapshot = cache
                        .read(&id, IoFlags::CACHE_ONLY)
                        .expect("read")
                        .expect("hit");
                    assert_eq!(snapshot.payload.len(), 100);
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("thread join");
        }

        assert_eq!(cache.stats().entries, 8);
        cache.shutdown();
    }

    #[test]
    fn test_snapshot_stable_under_concurrent_writes() {
        let cache = Arc::new(CacheManager::in_memory(&scenario_config()).expect("cache"));
        let id = make_id(b"hot");
        let flags = IoFlags::CACHE | IoFlags::CACHE_ONLY;

        cache
            .write(&id, &write_io(flags), &[0xaa; 64])
            .expect("write");

        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for round in 0..200u8 {
                    cache
                        .write(&id, &write_io(flags), &[round; 64])
                        .expect("rewrite");
                }
            })
        };

        // Every snapshot must be internally consistent: 64 identical bytes
        for _ in 0..200 {
            let snapshot = cache
                .read(&id, IoFlags::CACHE_ONLY)
                .expect("read")
                .expect("hit");
            let first = snapshot.payload[0];
            assert!(snapshot.payload.iter().all(|&b| b == first));
        }

        writer.join().expect("writer join");
    }
}
