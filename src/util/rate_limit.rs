//! Per-connection rate limiting

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Max inbound WebSocket messages per second per connection
pub const INPUT_RATE_LIMIT: u32 = 120;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Limiter {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    RateLimiter::direct(quota)
}

/// Inbound message limiter owned by one connection's reader loop
pub struct PlayerRateLimiter {
    input_limiter: Limiter,
}

impl PlayerRateLimiter {
    pub fn new() -> Self {
        Self::with_limit(INPUT_RATE_LIMIT)
    }

    pub fn with_limit(per_second: u32) -> Self {
        Self {
            input_limiter: create_limiter(per_second),
        }
    }

    /// Check if an input message is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter.check().is_ok()
    }
}

impl Default for PlayerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
