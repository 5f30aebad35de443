//! Watch Cache Error Hierarchy
//!
//! Defines the error types surfaced by the event-windowing, serialization-caching,
//! lease and backing store layers.

use std::sync::Arc;
use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by user supplied encode functions and backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// History window failures (eviction, stale start revisions)
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Object wrapping and encoding failures
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// TTL lease failures reported by the backing store
    #[error(transparent)]
    Lease(#[from] LeaseError),

    /// Backing store request failures
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Unrecoverable failures caused by a broken caller contract
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// Whether the caller has to drop its watch and restart from a full list.
    pub fn is_invalidated(&self) -> bool {
        matches!(
            self,
            Error::Watch(WatchError::Invalidated { .. }) | Error::Watch(WatchError::TooOldRevision { .. })
        )
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WatchError {
    /// Events the reader had not consumed yet were evicted from history
    #[error("Watch interval invalidated: cursor {cursor} fell behind oldest retained index {oldest}")]
    Invalidated { cursor: u64, oldest: u64 },

    /// The requested start revision is older than anything retained
    #[error("Too old resource version: {requested} (oldest retained: {oldest})")]
    TooOldRevision { requested: u64, oldest: u64 },

    /// Write path delivered a revision that does not advance the cache
    #[error("Revision regression: cache at {current}, incoming event at {incoming}")]
    RevisionRegression { current: u64, incoming: u64 },

    /// The cache did not observe the requested revision in time
    #[error("Timed out after {timeout:?} waiting for revision {revision} (cache at {current})")]
    NotFresh {
        revision: u64,
        current: u64,
        timeout: Duration,
    },
}

/// A memoized encode failure.
///
/// Cloned out of the per-format memoization cell to every caller that hits it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Failed to encode object as {format}: {source}")]
pub struct EncodeError {
    pub format: Arc<str>,
    #[source]
    pub source: Arc<dyn std::error::Error + Send + Sync>,
}

impl EncodeError {
    pub fn new(
        format: &str,
        source: BoxError,
    ) -> Self {
        Self {
            format: Arc::from(format),
            source: Arc::from(source),
        }
    }
}

// Serialization is classified separately (it crosses the cache and transport boundary)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The caller supplied writer rejected the memoized bytes
    #[error("Failed to write encoded object: {0}")]
    Write(#[from] std::io::Error),

    /// Object does not expose the metadata accessors required for caching
    #[error("Object of type {type_name} does not carry object metadata")]
    MissingMetadata { type_name: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    #[error("Lease grant for ttl {ttl:?} failed: {source}")]
    GrantFailed {
        ttl: Duration,
        #[source]
        source: BoxError,
    },

    #[error("Lease ttl must be positive, got {0:?}")]
    InvalidTtl(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Transactional write precondition failed
    #[error("Revision conflict on {key} (expected: {expected}, actual: {actual})")]
    Conflict { key: String, expected: u64, actual: u64 },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}
