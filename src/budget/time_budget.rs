use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::ListBudgetConfig;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Continuously refilling allowance of wall-clock time.
///
/// Single owner, sequential use: `take_available` hands the whole accrued budget
/// to the caller, so a second concurrent taker would get nothing. Mutation
/// requires `&mut self`; share it behind a lock held for the take/return cycle.
#[derive(Debug)]
pub struct TimeBudget {
    budget: Duration,
    max_budget: Duration,
    refresh_per_second: Duration,
    last_refill: Instant,
}

impl TimeBudget {
    pub fn new(
        refresh_per_second: Duration,
        max_budget: Duration,
    ) -> Self {
        Self {
            budget: Duration::ZERO,
            max_budget,
            refresh_per_second,
            last_refill: Instant::now(),
        }
    }

    pub fn from_config(config: &ListBudgetConfig) -> Self {
        Self::new(config.refresh_per_second(), config.max_budget())
    }

    /// Refills for the time elapsed since the last access and hands out everything.
    pub fn take_available(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.last_refill = now;

        let refill_nanos = self.refresh_per_second.as_nanos() * elapsed.as_nanos() / NANOS_PER_SEC;
        let refill = Duration::from_nanos(u64::try_from(refill_nanos).unwrap_or(u64::MAX));
        self.budget = self.budget.saturating_add(refill).min(self.max_budget);

        let available = std::mem::take(&mut self.budget);
        trace!(?available, ?elapsed, "time budget taken");
        available
    }

    /// Gives back time the caller did not spend.
    pub fn return_unused(
        &mut self,
        unused: Duration,
    ) {
        self.budget = self.budget.saturating_add(unused).min(self.max_budget);
    }

    /// Returns `allowance - spent`; an overspent allowance returns nothing.
    pub fn return_remaining(
        &mut self,
        allowance: Duration,
        spent: Duration,
    ) {
        if let Some(unused) = allowance.checked_sub(spent) {
            self.return_unused(unused);
        }
    }
}
