use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use super::Backend;
use super::LeaseGranter;
use super::LeaseId;
use crate::BackendError;
use crate::LeaseError;
use crate::Object;
use crate::Result;

#[derive(Debug)]
struct StoredObject<T> {
    object: T,
    mod_revision: u64,
    lease: Option<LeaseId>,
}

#[derive(Debug)]
struct MemState<T> {
    revision: u64,
    entries: BTreeMap<String, StoredObject<T>>,
    leases: HashMap<LeaseId, Instant>,
}

/// In-memory revisioned store.
///
/// Stamps `resource_version` on every stored object. Lease expiry is recorded but
/// never enforced.
#[derive(Debug)]
pub struct MemBackend<T: Object> {
    state: RwLock<MemState<T>>,
    next_lease_id: AtomicI64,
    grants: AtomicU64,
    unavailable: AtomicBool,
}

impl<T: Object> Default for MemBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Object> MemBackend<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemState {
                revision: 0,
                entries: BTreeMap::new(),
                leases: HashMap::new(),
            }),
            next_lease_id: AtomicI64::new(1),
            grants: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent request fail with `BackendError::Unavailable`.
    pub fn set_unavailable(
        &self,
        unavailable: bool,
    ) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of leases granted so far.
    pub fn grant_count(&self) -> u64 {
        self.grants.load(Ordering::SeqCst)
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// Lease the object under `key` is attached to.
    pub fn lease_of(
        &self,
        key: &str,
    ) -> Option<LeaseId> {
        self.state.read().entries.get(key).and_then(|s| s.lease)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("memory backend switched off".into()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Object> LeaseGranter for MemBackend<T> {
    async fn grant(
        &self,
        ttl: Duration,
    ) -> Result<LeaseId> {
        if ttl.is_zero() {
            return Err(LeaseError::InvalidTtl(ttl).into());
        }
        if let Err(e) = self.check_available() {
            return Err(LeaseError::GrantFailed {
                ttl,
                source: Box::new(e),
            }
            .into());
        }

        let id = self.next_lease_id.fetch_add(1, Ordering::SeqCst);
        self.state.write().leases.insert(id, Instant::now() + ttl);
        self.grants.fetch_add(1, Ordering::SeqCst);
        debug!(lease_id = id, ?ttl, "lease granted");
        Ok(id)
    }
}

#[async_trait]
impl<T: Object> Backend<T> for MemBackend<T> {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<(T, u64)>> {
        self.check_available()?;
        let state = self.state.read();
        Ok(state.entries.get(key).map(|s| (s.object.clone(), s.mod_revision)))
    }

    async fn list(
        &self,
        prefix: &str,
    ) -> Result<(Vec<(String, T)>, u64)> {
        self.check_available()?;
        let state = self.state.read();
        let objects = state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, stored)| (key.clone(), stored.object.clone()))
            .collect();
        Ok((objects, state.revision))
    }

    async fn put(
        &self,
        key: &str,
        mut object: T,
        expected_revision: Option<u64>,
        lease: Option<LeaseId>,
    ) -> Result<u64> {
        self.check_available()?;
        let mut state = self.state.write();

        if let Some(expected) = expected_revision {
            let actual = state.entries.get(key).map(|s| s.mod_revision).unwrap_or(0);
            if actual != expected {
                return Err(BackendError::Conflict {
                    key: key.to_string(),
                    expected,
                    actual,
                }
                .into());
            }
        }

        if let Some(id) = lease {
            if !state.leases.contains_key(&id) {
                return Err(BackendError::NotFound(format!("lease {}", id)).into());
            }
        }

        state.revision += 1;
        let revision = state.revision;
        if let Some(meta) = object.meta_mut() {
            meta.resource_version = revision;
        }
        state.entries.insert(
            key.to_string(),
            StoredObject {
                object,
                mod_revision: revision,
                lease,
            },
        );
        trace!(key, revision, ?lease, "object stored");
        Ok(revision)
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<(T, u64)> {
        self.check_available()?;
        let mut state = self.state.write();

        let Some(stored) = state.entries.remove(key) else {
            return Err(BackendError::NotFound(key.to_string()).into());
        };
        state.revision += 1;
        trace!(key, revision = state.revision, "object deleted");
        Ok((stored.object, state.revision))
    }
}
