//! Wire-level IO attributes
//!
//! The parsed per-command attribute block the dispatch layer hands to the
//! cache. Field meanings follow the node's wire protocol: `start` is
//! reinterpreted as a TTL in seconds on writes, and `parent` carries the
//! expected payload digest for conditional writes.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::cache::{RecordTimestamp, ID_SIZE};

/// Command flag bitmask
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct IoFlags(u32);

impl IoFlags {
    /// No flags set
    pub const NONE: IoFlags = IoFlags(0);
    /// Permit cache use; without it a miss falls through to the backend path
    pub const CACHE: IoFlags = IoFlags(1 << 0);
    /// Do not populate from or flush to the backend
    pub const CACHE_ONLY: IoFlags = IoFlags(1 << 1);
    /// TTL expiry and explicit delete also remove the record from the backend
    pub const CACHE_REMOVE_FROM_DISK: IoFlags = IoFlags(1 << 2);
    /// Append to the existing payload instead of writing at an offset
    pub const APPEND: IoFlags = IoFlags(1 << 3);
    /// Require the cached payload digest to match `parent`
    pub const COMPARE_AND_SWAP: IoFlags = IoFlags(1 << 4);

    /// Reconstruct from raw wire bits.
    pub const fn from_bits(bits: u32) -> Self {
        IoFlags(bits)
    }

    /// Raw wire bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every flag in `other` is set in `self`
    pub const fn contains(self, other: IoFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for IoFlags {
    type Output = IoFlags;

    fn bitor(self, rhs: IoFlags) -> IoFlags {
        IoFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for IoFlags {
    fn bitor_assign(&mut self, rhs: IoFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for IoFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(IoFlags::CACHE) {
            names.push("CACHE");
        }
        if self.contains(IoFlags::CACHE_ONLY) {
            names.push("CACHE_ONLY");
        }
        if self.contains(IoFlags::CACHE_REMOVE_FROM_DISK) {
            names.push("CACHE_REMOVE_FROM_DISK");
        }
        if self.contains(IoFlags::APPEND) {
            names.push("APPEND");
        }
        if self.contains(IoFlags::COMPARE_AND_SWAP) {
            names.push("COMPARE_AND_SWAP");
        }
        write!(f, "IoFlags({})", names.join("|"))
    }
}

/// Per-command IO attributes
#[derive(Debug, Clone, Copy)]
pub struct IoAttributes {
    /// Byte offset within the payload (writes and reads)
    pub offset: u64,
    /// Payload byte count; on reads 0 means "to the end"
    pub size: u64,
    /// Command flags
    pub flags: IoFlags,
    /// TTL in seconds for writes; 0 means no TTL
    pub start: u64,
    /// Record timestamp: stored on write, returned on read
    pub timestamp: RecordTimestamp,
    /// Opaque user tag stored alongside the timestamp
    pub user_flags: u64,
    /// Expected payload digest for compare-and-swap writes
    pub parent: [u8; ID_SIZE],
}

impl Default for IoAttributes {
    fn default() -> Self {
        Self {
            offset: 0,
            size: 0,
            flags: IoFlags::NONE,
            start: 0,
            timestamp: RecordTimestamp::EMPTY,
            user_flags: 0,
            parent: [0u8; ID_SIZE],
        }
    }
}

impl IoAttributes {
    /// Attributes carrying only the given flags.
    pub fn with_flags(flags: IoFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
