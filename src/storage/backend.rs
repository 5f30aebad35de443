//! Backing store primitives consumed by the watch cache.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Object;
use crate::Result;

/// Backing store lease handle; objects attached to it expire together
pub type LeaseId = i64;

/// Lease-grant primitive of the backing store.
///
/// May incur a network round trip. Implementations own their retry policy.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LeaseGranter: Send + Sync + 'static {
    async fn grant(
        &self,
        ttl: Duration,
    ) -> Result<LeaseId>;
}

/// Revisioned key-value store holding the authoritative objects.
///
/// Every successful mutation is assigned a strictly increasing revision.
#[async_trait]
pub trait Backend<T: Object>: Send + Sync + 'static {
    /// Returns the object and the revision it was last modified at.
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<(T, u64)>>;

    /// Returns every object under `prefix` together with the store revision.
    async fn list(
        &self,
        prefix: &str,
    ) -> Result<(Vec<(String, T)>, u64)>;

    /// Writes `object` under `key`.
    ///
    /// `expected_revision`: `Some(0)` requires the key to be absent, `Some(r)` requires
    /// its current modification revision to be `r`. Returns the revision of the write.
    async fn put(
        &self,
        key: &str,
        object: T,
        expected_revision: Option<u64>,
        lease: Option<LeaseId>,
    ) -> Result<u64>;

    /// Removes `key`, returning the previous object and the revision of the delete.
    async fn delete(
        &self,
        key: &str,
    ) -> Result<(T, u64)>;
}
