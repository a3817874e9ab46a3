//! Per-user request rate limiting

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use tracing::warn;

use crate::error::{ApiError, ApiResult};

/// Keyed limiter over user ids. A budget of zero disables limiting.
pub struct UserRateLimiter {
    limiter: Option<DefaultKeyedRateLimiter<String>>,
}

impl UserRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let limiter = NonZeroU32::new(requests_per_minute)
            .map(|n| RateLimiter::keyed(Quota::per_minute(n)));
        Self { limiter }
    }

    /// Spend one request from `user_id`'s budget
    pub fn check(&self, user_id: &str) -> ApiResult<()> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        limiter.check_key(&user_id.to_string()).map_err(|_| {
            warn!(user_id, "Rate limit exceeded");
            ApiError::TooManyRequests
        })
    }

    /// Drop state for keys whose budget has fully refilled
    pub fn retain_recent(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    /// Users with limiter state held in memory
    pub fn tracked_users(&self) -> usize {
        self.limiter.as_ref().map_or(0, |limiter| limiter.len())
    }
}
