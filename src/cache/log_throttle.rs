use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use lazy_static::lazy_static;
use parking_lot::Mutex;

use crate::constants::DEFAULT_INVALIDATION_LOG_INTERVAL;

lazy_static! {
    /// Process-wide throttle for unexpected cache invalidation diagnostics
    static ref INVALIDATION_LOG_THROTTLE: Arc<LogThrottle> =
        Arc::new(LogThrottle::new(DEFAULT_INVALIDATION_LOG_INTERVAL));
}

/// Returns the process-wide invalidation log throttle.
pub fn invalidation_log_throttle() -> Arc<LogThrottle> {
    INVALIDATION_LOG_THROTTLE.clone()
}

/// Admits at most one log line per `interval`.
#[derive(Debug)]
pub struct LogThrottle {
    interval: Duration,
    last_logged: Mutex<Option<Instant>>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: Mutex::new(None),
        }
    }

    /// Decides whether a line may be logged at `now`, recording it if so.
    pub fn should_log(
        &self,
        now: Instant,
    ) -> bool {
        let mut last = self.last_logged.lock();
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_is_admitted() {
        let throttle = LogThrottle::new(Duration::from_secs(1));
        assert!(throttle.should_log(Instant::now()));
    }

    #[test]
    fn test_calls_inside_interval_are_suppressed() {
        let throttle = LogThrottle::new(Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(throttle.should_log(t0));
        assert!(!throttle.should_log(t0 + Duration::from_millis(10)));
        assert!(!throttle.should_log(t0 + Duration::from_millis(999)));
        assert!(throttle.should_log(t0 + Duration::from_secs(1)));
        assert!(!throttle.should_log(t0 + Duration::from_millis(1500)));
    }

    #[test]
    fn test_clock_going_backwards_is_suppressed() {
        let throttle = LogThrottle::new(Duration::from_secs(1));
        let t0 = Instant::now() + Duration::from_secs(5);

        assert!(throttle.should_log(t0));
        assert!(!throttle.should_log(t0 - Duration::from_secs(3)));
    }
}
