//! Event-windowing and serialization-caching layer of a control plane storage stack.
//!
//! Sits between client-facing read/write/watch requests and a revisioned key-value
//! store with a lease-based TTL primitive:
//!
//! - [`EventLog`] and [`IntervalReader`] serve watches out of a bounded in-memory history
//! - [`CacheableObject`] memoizes per-format encodings shared by many consumers
//! - [`TimeBudget`] bounds wall-clock time spent before falling back to an expensive list
//! - [`LeaseCoordinator`] amortizes lease grants across many writes
//!
//! [`Cacher`] wires them together on top of a [`Backend`].

mod budget;
mod cache;
mod cacher;
mod config;
mod constants;
mod errors;
mod lease;
mod metrics;
mod storage;
mod watch;

pub use budget::*;
pub use cache::*;
pub use cacher::*;
pub use crate::config::*;
pub use constants::*;
pub use errors::*;
pub use lease::*;
pub use metrics::*;
pub use storage::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
