//! Read-through facade over a backing store.
//!
//! Writes go to the [`Backend`] first and are then appended to the
//! [`WatchCache`], one at a time so revisions reach the history in order.
//! Reads and watches are served from memory; a list that needs a revision the
//! cache has not reached yet waits for it only as long as the shared
//! [`TimeBudget`] allows, then falls back to the backend.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;

use crate::Backend;
use crate::CacheableObject;
use crate::LeaseCoordinator;
use crate::LeaseGranter;
use crate::LeaseId;
use crate::LogThrottle;
use crate::Object;
use crate::Result;
use crate::TimeBudget;
use crate::WatchCache;
use crate::WatchCacheNodeConfig;
use crate::WatchOptions;
use crate::Watcher;


pub struct Cacher<T, B>
where
    T: Object,
    B: Backend<T> + LeaseGranter,
{
    backend: Arc<B>,
    watch_cache: Arc<WatchCache<T>>,
    leases: LeaseCoordinator,
    list_budget: Mutex<TimeBudget>,
    /// Serializes backend writes with their append to the history
    write_lock: tokio::sync::Mutex<()>,
}

impl<T, B> std::fmt::Debug for Cacher<T, B>
where
    T: Object,
    B: Backend<T> + LeaseGranter,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Cacher")
            .field("watch_cache", &self.watch_cache)
            .field("leases", &self.leases)
            .finish_non_exhaustive()
    }
}

impl<T, B> Cacher<T, B>
where
    T: Object,
    B: Backend<T> + LeaseGranter,
{
    pub fn new(
        backend: Arc<B>,
        config: &WatchCacheNodeConfig,
    ) -> Self {
        let granter: Arc<dyn LeaseGranter> = backend.clone();
        let log_throttle = Arc::new(LogThrottle::new(config.diagnostics.invalidation_log_interval()));
        Self {
            watch_cache: Arc::new(WatchCache::new(&config.watch_cache).with_log_throttle(log_throttle)),
            leases: LeaseCoordinator::new(granter, config.lease.clone()),
            list_budget: Mutex::new(TimeBudget::from_config(&config.list_budget)),
            write_lock: tokio::sync::Mutex::new(()),
            backend,
        }
    }

    pub fn watch_cache(&self) -> &Arc<WatchCache<T>> {
        &self.watch_cache
    }

    pub fn lease_coordinator(&self) -> &LeaseCoordinator {
        &self.leases
    }

    pub fn revision(&self) -> u64 {
        self.watch_cache.revision()
    }

    /// Loads the whole backend content into the cache.
    pub async fn init(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let (objects, revision) = self.backend.list("").await?;
        let count = objects.len();
        self.watch_cache.replace(objects, revision)?;
        info!(objects = count, revision, "cacher initialized");
        Ok(())
    }

    async fn lease_for(
        &self,
        ttl: Option<Duration>,
    ) -> Result<Option<LeaseId>> {
        match ttl {
            Some(ttl) => Ok(Some(self.leases.get_lease(ttl).await?)),
            None => Ok(None),
        }
    }

    /// Creates `key`; fails with a conflict if it exists.
    pub async fn create(
        &self,
        key: &str,
        object: T,
        ttl: Option<Duration>,
    ) -> Result<Arc<CacheableObject<T>>> {
        self.put(key, object, Some(0), ttl).await
    }

    /// Overwrites `key`, optionally only if it was last modified at `expected_revision`.
    pub async fn update(
        &self,
        key: &str,
        object: T,
        expected_revision: Option<u64>,
        ttl: Option<Duration>,
    ) -> Result<Arc<CacheableObject<T>>> {
        self.put(key, object, expected_revision, ttl).await
    }

    async fn put(
        &self,
        key: &str,
        mut object: T,
        expected_revision: Option<u64>,
        ttl: Option<Duration>,
    ) -> Result<Arc<CacheableObject<T>>> {
        let _guard = self.write_lock.lock().await;
        let lease = self.lease_for(ttl).await?;

        let revision = self
            .backend
            .put(key, object.clone(), expected_revision, lease)
            .await?;
        if let Some(meta) = object.meta_mut() {
            meta.resource_version = revision;
        }

        let event = self.watch_cache.update(key, object)?;
        debug!(key, revision, ?lease, event_type = ?event.event_type, "object written");
        Ok(event.object.clone())
    }

    /// Deletes `key`, returning the removed object stamped with the delete revision.
    pub async fn delete(
        &self,
        key: &str,
    ) -> Result<Arc<CacheableObject<T>>> {
        let _guard = self.write_lock.lock().await;
        let (mut previous, revision) = self.backend.delete(key).await?;

        if let Some(event) = self.watch_cache.delete(key, revision)? {
            return Ok(event.object.clone());
        }

        if let Some(meta) = previous.meta_mut() {
            meta.resource_version = revision;
        }
        Ok(Arc::new(CacheableObject::new(previous)?))
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<Arc<CacheableObject<T>>> {
        self.watch_cache.get(key).0
    }

    pub fn watch(
        &self,
        options: WatchOptions,
    ) -> Result<Watcher<T>> {
        self.watch_cache.watch(options)
    }

    /// Objects under `prefix` as of at least `min_revision`.
    ///
    /// Waits for the cache to catch up no longer than the list budget allows;
    /// past that, lists the backend directly.
    pub async fn list(
        &self,
        prefix: &str,
        min_revision: u64,
    ) -> Result<(Vec<Arc<CacheableObject<T>>>, u64)> {
        if self.watch_cache.revision() >= min_revision {
            return Ok(self.watch_cache.list(prefix));
        }

        let allowance = self.list_budget.lock().take_available();
        let started = Instant::now();
        let fresh = self.watch_cache.wait_until_fresh(min_revision, allowance).await;
        self.list_budget.lock().return_remaining(allowance, started.elapsed());

        if fresh.is_ok() {
            return Ok(self.watch_cache.list(prefix));
        }

        debug!(
            prefix,
            min_revision,
            cache_revision = self.watch_cache.revision(),
            ?allowance,
            "cache not fresh within budget, listing backend"
        );
        let (objects, revision) = self.backend.list(prefix).await?;
        let objects = objects
            .into_iter()
            .map(|(_, object)| CacheableObject::new(object).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok((objects, revision))
    }
}
