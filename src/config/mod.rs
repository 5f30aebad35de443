//! Configuration management for the watch cache.
//!
//! Provides hierarchical configuration loading from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. Config file named by `CONFIG_PATH`
//! 3. Runtime override files (`with_override_config`)
//! 4. Environment variables with `WATCHCACHE__` prefix (highest priority)

mod budget;
mod diagnostics;
mod lease;
mod watch_cache;
pub use budget::*;
pub use diagnostics::*;
pub use lease::*;
pub use watch_cache::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "WATCHCACHE";

/// Main configuration container for the watch cache subsystems
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct WatchCacheNodeConfig {
    /// Event history and interval window sizing
    #[serde(default)]
    pub watch_cache: WatchCacheConfig,
    /// Lease reuse tuning
    #[serde(default)]
    pub lease: LeaseReuseConfig,
    /// Allowance for the list fallback path
    #[serde(default)]
    pub list_budget: ListBudgetConfig,
    /// Rate limits for diagnostic logging
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl Debug for WatchCacheNodeConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchCacheNodeConfig")
            .field("watch_cache", &self.watch_cache)
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

impl WatchCacheNodeConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Type defaults
    /// 2. Configuration file from `CONFIG_PATH` (if set)
    /// 3. Environment variables with `WATCHCACHE__` prefix
    ///
    /// Callers MUST call `validate()` before using the configuration.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        self.watch_cache.validate()?;
        self.lease.validate()?;
        self.list_budget.validate()?;
        self.diagnostics.validate()?;
        Ok(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
