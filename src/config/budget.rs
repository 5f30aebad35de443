use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_BUDGET_REFRESH_PER_SECOND;
use crate::constants::DEFAULT_MAX_BUDGET;
use crate::Error;
use crate::Result;

/// Allowance the list path may spend waiting before it falls back to the backend
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ListBudgetConfig {
    /// Budget accrued per elapsed second (milliseconds)
    #[serde(default = "default_refresh_per_second_ms")]
    pub refresh_per_second_ms: u64,

    /// Cap of the accrued budget (milliseconds)
    #[serde(default = "default_max_budget_ms")]
    pub max_budget_ms: u64,
}

impl Default for ListBudgetConfig {
    fn default() -> Self {
        Self {
            refresh_per_second_ms: default_refresh_per_second_ms(),
            max_budget_ms: default_max_budget_ms(),
        }
    }
}

impl ListBudgetConfig {
    pub fn refresh_per_second(&self) -> Duration {
        Duration::from_millis(self.refresh_per_second_ms)
    }

    pub fn max_budget(&self) -> Duration {
        Duration::from_millis(self.max_budget_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_budget_ms < self.refresh_per_second_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "list_budget.max_budget_ms {} should not be less than refresh_per_second_ms {}",
                self.max_budget_ms, self.refresh_per_second_ms
            ))));
        }

        Ok(())
    }
}

fn default_refresh_per_second_ms() -> u64 {
    DEFAULT_BUDGET_REFRESH_PER_SECOND.as_millis() as u64
}

fn default_max_budget_ms() -> u64 {
    DEFAULT_MAX_BUDGET.as_millis() as u64
}
