//! Rate limiting for REST balance requests

use governor::{DefaultDirectRateLimiter, Quota};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::warn;

const FALLBACK_REQUESTS_PER_MINUTE: NonZeroU32 = nonzero!(60u32);

/// Per-minute quota on REST balance fetches
#[derive(Clone)]
pub struct RestRateLimiter {
    limiter: Arc<DefaultDirectRateLimiter>,
    requests_per_minute: NonZeroU32,
}

impl std::fmt::Debug for RestRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRateLimiter")
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

impl RestRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_minute).unwrap_or_else(|| {
            warn!(
                requests_per_minute,
                fallback = FALLBACK_REQUESTS_PER_MINUTE.get(),
                "Invalid REST rate limit, using fallback"
            );
            FALLBACK_REQUESTS_PER_MINUTE
        });

        Self {
            limiter: Arc::new(DefaultDirectRateLimiter::direct(Quota::per_minute(rate))),
            requests_per_minute: rate,
        }
    }

    /// Take a permit if one is available (non-blocking)
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute.get()
    }
}

impl Default for RestRateLimiter {
    fn default() -> Self {
        Self::new(FALLBACK_REQUESTS_PER_MINUTE.get())
    }
}
