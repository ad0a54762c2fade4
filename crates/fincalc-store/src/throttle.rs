//! Per-adapter token-bucket rate limiting.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket guarding one upstream adapter.
///
/// Each registered adapter gets its own throttle so a burst against one
/// source cannot starve the others. This is independent of any user-facing
/// request rate limit, which is enforced before the engine runs.
#[derive(Debug)]
pub struct AdapterThrottle {
    limiter: DirectRateLimiter,
}

impl AdapterThrottle {
    /// Creates a throttle allowing `per_second` calls per second with a burst
    /// of the same size. A zero limit is clamped to one.
    #[must_use]
    pub fn per_second(per_second: u32) -> Self {
        let cells = NonZeroU32::new(per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(cells)),
        }
    }

    /// Creates a throttle with an explicit interval between calls.
    #[must_use]
    pub fn with_interval(interval: Duration) -> Self {
        let quota = Quota::with_period(interval.max(Duration::from_millis(1)))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Waits until the bucket has budget for one call.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Non-blocking probe, used by tests.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}
