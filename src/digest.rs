//! Payload digests for compare-and-swap
//!
//! The node's transform function reduced to the one capability the cache
//! needs: hashing a payload into an identifier-width checksum that
//! conditional writes compare against their `parent` attribute.

use sha2::{Digest, Sha512};

use crate::cache::{RecordId, ID_SIZE};

/// Digest provider trait
///
/// Implementations must be thread-safe; the cache digests payloads while
/// holding a shard lock.
pub trait Digester: Send + Sync {
    /// Digest `data` into an identifier-width checksum.
    fn digest(&self, data: &[u8]) -> [u8; ID_SIZE];
}

/// SHA-512 digester (the default node transform; its 64-byte output is
/// exactly one identifier wide)
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha512Digester;

impl Digester for Sha512Digester {
    fn digest(&self, data: &[u8]) -> [u8; ID_SIZE] {
        let output = Sha512::digest(data);
        let mut checksum = [0u8; ID_SIZE];
        checksum.copy_from_slice(&output);
        checksum
    }
}

/// Digest `data` and wrap the checksum as a [`RecordId`].
///
/// Identifiers in this system are digest outputs, so this is also how
/// content-addressed ids are derived.
pub fn digest_id<D: Digester + ?Sized>(digester: &D, data: &[u8]) -> RecordId {
    RecordId::new(digester.digest(data))
}

// =============================================================================
// Tests
// =============================================================================
