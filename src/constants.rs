use std::time::Duration;

// -
// Watch history

/// Default number of events retained by the event log
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 1024;

/// Number of events an interval copies out of the log per lock acquisition
pub const DEFAULT_INTERVAL_WINDOW_SIZE: usize = 100;

// -
// List budget

/// Budget accrued per elapsed second
pub const DEFAULT_BUDGET_REFRESH_PER_SECOND: Duration = Duration::from_millis(50);

/// Upper bound of the accrued budget
pub const DEFAULT_MAX_BUDGET: Duration = Duration::from_millis(100);

// -
// Lease reuse

pub const DEFAULT_LEASE_REUSE_DURATION_SECS: u64 = 60;
pub const DEFAULT_LEASE_REUSE_PERCENT: f64 = 0.05;
pub const DEFAULT_LEASE_MAX_OBJECTS: u64 = 1000;

// -
// Diagnostics

/// Minimum spacing between two unexpected-invalidation log lines
pub const DEFAULT_INVALIDATION_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Serialization identifiers
pub const FORMAT_JSON: &str = "application/json";
pub const FORMAT_BINCODE: &str = "application/x-bincode";
