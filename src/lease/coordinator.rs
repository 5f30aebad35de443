use std::sync::Arc;
use std::time::Duration;

use autometrics::autometrics;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use crate::metrics::LEASE_GRANTS;
use crate::metrics::LEASE_OBJECTS_ATTACHED;
use crate::LeaseError;
use crate::LeaseGranter;
use crate::LeaseId;
use crate::LeaseReuseConfig;
use crate::Result;
use crate::API_SLO;

/// Most recently granted lease. Superseded, never retained, on each new grant.
#[derive(Debug, Default)]
struct LeaseRecord {
    id: LeaseId,
    /// `None` until the first grant
    expiration: Option<Instant>,
    attached: u64,
}

/// Hands out a shared lease to writes whose TTL fits into it.
///
/// Every decision is taken under one lock, including the grant round trip, so
/// writers serialize here when a new lease is needed. No retries are performed.
pub struct LeaseCoordinator {
    granter: Arc<dyn LeaseGranter>,
    config: LeaseReuseConfig,
    record: Mutex<LeaseRecord>,
}

impl std::fmt::Debug for LeaseCoordinator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LeaseCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LeaseCoordinator {
    pub fn new(
        granter: Arc<dyn LeaseGranter>,
        config: LeaseReuseConfig,
    ) -> Self {
        Self {
            granter,
            config,
            record: Mutex::new(LeaseRecord::default()),
        }
    }

    /// Extra lifetime requested on top of `ttl` so later writes can reuse the lease.
    fn reuse_slack(
        &self,
        ttl: Duration,
    ) -> Duration {
        ttl.mul_f64(self.config.reuse_percent)
            .min(self.config.reuse_duration())
    }

    /// Returns a lease living at least `ttl`, reusing the current one when possible.
    ///
    /// Reuse requires the current lease to outlive `now + ttl` but not by more
    /// than the reuse slack, and to have fewer than `max_objects_per_lease`
    /// objects attached. Each call attaches one object whatever the outcome.
    #[autometrics(objective = API_SLO)]
    pub async fn get_lease(
        &self,
        ttl: Duration,
    ) -> Result<LeaseId> {
        let now = Instant::now();
        let reuse_slack = self.reuse_slack(ttl);
        let granted_ttl = ttl.checked_add(reuse_slack).ok_or(LeaseError::InvalidTtl(ttl))?;
        let deadline = now.checked_add(ttl).ok_or(LeaseError::InvalidTtl(ttl))?;
        let granted_expiration = now.checked_add(granted_ttl).ok_or(LeaseError::InvalidTtl(ttl))?;

        let mut record = self.record.lock().await;
        let valid = record.expiration.is_some_and(|expiration| deadline < expiration);
        let sufficient = record
            .expiration
            .is_some_and(|expiration| granted_expiration > expiration);

        record.attached += 1;
        if valid && sufficient && record.attached <= self.config.max_objects_per_lease {
            trace!(lease_id = record.id, attached = record.attached, "lease reused");
            return Ok(record.id);
        }

        let id = self.granter.grant(granted_ttl).await?;
        LEASE_GRANTS.inc();

        if record.expiration.is_some() {
            LEASE_OBJECTS_ATTACHED.observe((record.attached - 1) as f64);
        }
        debug!(
            lease_id = id,
            previous_lease_id = record.id,
            previous_attached = record.attached - 1,
            ?granted_ttl,
            "new lease granted"
        );

        *record = LeaseRecord {
            id,
            expiration: Some(granted_expiration),
            attached: 1,
        };
        Ok(id)
    }

    /// Current lease and the number of objects attached to it.
    pub async fn current_lease(&self) -> Option<(LeaseId, u64)> {
        let record = self.record.lock().await;
        record.expiration.map(|_| (record.id, record.attached))
    }
}
