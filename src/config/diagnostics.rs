use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_INVALIDATION_LOG_INTERVAL;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DiagnosticsConfig {
    /// Minimum spacing between unexpected cache invalidation log lines (milliseconds)
    #[serde(default = "default_invalidation_log_interval_ms")]
    pub invalidation_log_interval_ms: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            invalidation_log_interval_ms: default_invalidation_log_interval_ms(),
        }
    }
}

impl DiagnosticsConfig {
    pub fn invalidation_log_interval(&self) -> Duration {
        Duration::from_millis(self.invalidation_log_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.invalidation_log_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "diagnostics.invalidation_log_interval_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_invalidation_log_interval_ms() -> u64 {
    DEFAULT_INVALIDATION_LOG_INTERVAL.as_millis() as u64
}
