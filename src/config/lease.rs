//! Lease reuse configuration
//!
//! Controls how aggressively writes with a TTL share one backend lease.
//!
//! ```toml
//! [lease]
//! reuse_duration_secs = 60
//! reuse_percent = 0.05
//! max_objects_per_lease = 1000
//! ```

use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_LEASE_MAX_OBJECTS;
use crate::constants::DEFAULT_LEASE_REUSE_DURATION_SECS;
use crate::constants::DEFAULT_LEASE_REUSE_PERCENT;
use crate::Error;
use crate::Result;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LeaseReuseConfig {
    /// Upper bound of the extra lifetime requested on each grant (seconds)
    ///
    /// The slack actually used is `min(reuse_duration_secs, reuse_percent * ttl)`.
    #[serde(default = "default_reuse_duration_secs")]
    pub reuse_duration_secs: u64,

    /// Fraction of the requested ttl added as reuse slack
    ///
    /// Range: 0.0-1.0
    #[serde(default = "default_reuse_percent")]
    pub reuse_percent: f64,

    /// Maximum number of objects attached to one lease before a fresh grant is forced
    #[serde(default = "default_max_objects_per_lease")]
    pub max_objects_per_lease: u64,
}

impl Default for LeaseReuseConfig {
    fn default() -> Self {
        Self {
            reuse_duration_secs: default_reuse_duration_secs(),
            reuse_percent: default_reuse_percent(),
            max_objects_per_lease: default_max_objects_per_lease(),
        }
    }
}

impl LeaseReuseConfig {
    pub fn reuse_duration(&self) -> Duration {
        Duration::from_secs(self.reuse_duration_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.reuse_percent) {
            return Err(Error::Config(ConfigError::Message(format!(
                "lease.reuse_percent must be between 0 and 1, got {}",
                self.reuse_percent
            ))));
        }

        if self.max_objects_per_lease == 0 {
            return Err(Error::Config(ConfigError::Message(
                "lease.max_objects_per_lease must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_reuse_duration_secs() -> u64 {
    DEFAULT_LEASE_REUSE_DURATION_SECS
}

fn default_reuse_percent() -> f64 {
    DEFAULT_LEASE_REUSE_PERCENT
}

fn default_max_objects_per_lease() -> u64 {
    DEFAULT_LEASE_MAX_OBJECTS
}
