use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_EVENT_LOG_CAPACITY;
use crate::constants::DEFAULT_INTERVAL_WINDOW_SIZE;
use crate::Error;
use crate::Result;

/// Sizing of the in-memory event history
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchCacheConfig {
    /// Number of events retained before the oldest is evicted
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Number of events copied out of the log per refill of an interval
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

impl Default for WatchCacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            window_size: default_window_size(),
        }
    }
}

impl WatchCacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch_cache.capacity must be greater than 0".into(),
            )));
        }

        if self.window_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch_cache.window_size must be greater than 0".into(),
            )));
        }

        if self.window_size > self.capacity {
            return Err(Error::Config(ConfigError::Message(format!(
                "watch_cache.window_size {} exceeds capacity {}",
                self.window_size, self.capacity
            ))));
        }

        Ok(())
    }
}

fn default_capacity() -> usize {
    DEFAULT_EVENT_LOG_CAPACITY
}

fn default_window_size() -> usize {
    DEFAULT_INTERVAL_WINDOW_SIZE
}
