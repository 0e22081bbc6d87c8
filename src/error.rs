//! Error types for the cache layer

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache layer
#[derive(Error, Debug)]
pub enum Error {
    /// Cache is disabled, or the operation needs the backend but the
    /// command did not permit cache use for an uncached key
    #[error("operation not supported by the cache: {0}")]
    NotSupported(&'static str),

    /// Key is not present in the cache (and no backend cascade applied)
    #[error("record not found")]
    NotFound,

    /// Compare-and-swap precondition failed: cached payload digest does
    /// not match the supplied parent digest
    #[error("compare-and-swap digest mismatch for {id}")]
    Stale { id: String },

    /// READ range lies outside the cached payload
    #[error("invalid range: offset {offset} + size {size} exceeds cached size {cached}")]
    InvalidArgument {
        offset: u64,
        size: u64,
        cached: usize,
    },

    /// Underlying store failed for read/write/remove
    #[error("backend {op} failed: {reason}")]
    Backend { op: &'static str, reason: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Construct a backend error for the given operation.
    pub fn backend(op: &'static str, reason: impl Into<String>) -> Self {
        Error::Backend {
            op,
            reason: reason.into(),
        }
    }

    /// True for the "key absent" outcome, which several paths treat as a
    /// soft miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

// =============================================================================
// Tests
// =============================================================================
