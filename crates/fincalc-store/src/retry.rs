//! Bounded exponential backoff for upstream adapter calls.

use std::time::Duration;

/// Retry schedule for a failing upstream call.
///
/// Delays grow geometrically from `initial_delay` by `multiplier`, capped at
/// `max_delay`. Once `max_attempts` calls have failed the error escalates;
/// there is no unbounded retry.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Geometric growth factor between retries.
    pub multiplier: f64,
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// Returns the delay to sleep after the given failed attempt
    /// (zero-based), or `None` when the attempt budget is spent.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            return None;
        }

        let scale = self.multiplier.powf(f64::from(attempt));
        let seconds = self.initial_delay.as_secs_f64() * scale;
        let capped = seconds.min(self.max_delay.as_secs_f64());
        Some(Duration::from_secs_f64(capped))
    }
}
