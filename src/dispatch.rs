//! Command dispatch boundary
//!
//! Entry point for the node's wire layer: takes a parsed command, runs it
//! against the cache, and hands results to the reply sink. The wire protocol
//! itself (framing, acks, transport) lives outside this crate; the sink
//! trait is the seam.

use bytes::Bytes;
use tracing::error;

use crate::cache::{CacheManager, RecordId};
use crate::error::{Error, Result};
use crate::io::{IoAttributes, IoFlags};

/// Cache-addressable commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Store payload bytes
    Write,
    /// Fetch a payload slice
    Read,
    /// Remove a record
    Delete,
}

/// Where command results go
///
/// Implemented by the wire layer; a READ delivers its payload slice here and
/// a successful WRITE delivers a file-info acknowledgement.
pub trait ReplySink {
    /// Deliver the sliced payload of a READ, with `io` updated to carry the
    /// record's timestamp, user flags, and effective size.
    fn send_read_data(&mut self, io: &IoAttributes, data: Bytes) -> Result<()>;

    /// Acknowledge a completed WRITE.
    fn send_write_ack(&mut self, io: &IoAttributes) -> Result<()>;
}

/// Run one command against the cache.
///
/// `cache` is `None` when the node's configuration disabled the cache; every
/// command then reports "not supported" and the node falls back to its
/// direct backend path. Internal errors are logged and surfaced as
/// "not found", the contract the wire layer has always exposed.
pub fn dispatch(
    cache: Option<&CacheManager>,
    command: Command,
    id: &RecordId,
    io: &mut IoAttributes,
    payload: &[u8],
    sink: &mut dyn ReplySink,
) -> Result<()> {
    let Some(cache) = cache else {
        error!(id = %id, "cache is not supported");
        return Err(Error::NotSupported("cache is disabled"));
    };

    let result = match command {
        Command::Write => cache
            .write(id, io, payload)
            .and_then(|()| sink.send_write_ack(io)),
        Command::Read => read_command(cache, id, io, sink),
        Command::Delete => cache.remove(id, io.flags),
    };

    result.map_err(|err| match err {
        Error::Internal(reason) => {
            error!(id = %id, ?command, reason = %reason, "cache operation failed");
            Error::NotFound
        }
        other => other,
    })
}

fn read_command(
    cache: &CacheManager,
    id: &RecordId,
    io: &mut IoAttributes,
    sink: &mut dyn ReplySink,
) -> Result<()> {
    let snapshot = match cache.read(id, io.flags)? {
        Some(snapshot) => snapshot,
        None => {
            if !io.flags.contains(IoFlags::CACHE) {
                // Let the dispatcher retry against the backend path
                return Err(Error::NotSupported("cache flag not set on read miss"));
            }
            return Err(Error::NotFound);
        }
    };

    io.timestamp = snapshot.timestamp;
    io.user_flags = snapshot.user_flags;

    let cached = snapshot.payload.len();
    if io.offset + io.size > cached as u64 {
        error!(
            id = %id,
            offset = io.offset,
            size = io.size,
            cached,
            "cache read with invalid offset/size"
        );
        return Err(Error::InvalidArgument {
            offset: io.offset,
            size: io.size,
            cached,
        });
    }
    if io.size == 0 {
        io.size = cached as u64 - io.offset;
    }

    let start = io.offset as usize;
    let end = start + io.size as usize;
    sink.send_read_data(io, snapshot.payload.slice(start..end))
}

// =============================================================================
// Tests
// =============================================================================
