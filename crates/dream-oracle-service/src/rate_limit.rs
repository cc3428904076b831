//! Per-user request rate limiting using the governor crate.
//!
//! One limiter is built from configuration at startup and held in
//! [`AppState`](crate::state::AppState); every authenticated request is
//! charged against its user's key.

use std::num::NonZeroU32;

use governor::clock::Clock;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use dream_oracle_core::UserId;

use crate::error::ApiError;

/// Keyed rate limiter over user IDs.
pub struct UserRateLimiter {
    limiter: DefaultKeyedRateLimiter<UserId>,
}

impl UserRateLimiter {
    /// Allow `requests` per minute per user, with bursts up to the same count.
    ///
    /// A zero quota is raised to one request per minute.
    #[must_use]
    pub fn per_minute(requests: u32) -> Self {
        let requests = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);

        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(requests)),
        }
    }

    /// Charge one request to `user_id`.
    pub fn check(&self, user_id: &UserId) -> Result<(), ApiError> {
        self.limiter.check_key(user_id).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.limiter.clock().now());
            tracing::debug!(user_id = %user_id, wait_ms = wait.as_millis(), "Rate limit exceeded");
            ApiError::RateLimited {
                retry_after_secs: wait.as_secs().max(1),
            }
        })
    }

    /// Drop state for users whose quota has fully replenished.
    pub fn shrink(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of users currently tracked.
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.limiter.len()
    }
}

impl std::fmt::Debug for UserRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRateLimiter")
            .field("tracked_users", &self.tracked_users())
            .finish()
    }
}
