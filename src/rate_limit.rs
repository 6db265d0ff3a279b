/// Rate limiting for token issuance
///
/// An in-process keyed limiter (sliding window per client IP) for the
/// request-access endpoint. Acceptable for a single instance; a
/// multi-instance deployment needs a shared counter instead.
use crate::error::{GateError, GateResult};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

/// Issuance limiter configuration
#[derive(Debug, Clone)]
pub struct IssuanceLimitConfig {
    /// Max issuance attempts per IP within the window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for IssuanceLimitConfig {
    fn default() -> Self {
        Self {
            limit: 5,        // 5 issuance attempts
            window_secs: 900, // per 15-minute window
        }
    }
}

/// Per-IP issuance rate limiter
#[derive(Clone)]
pub struct IssuanceLimiter {
    limiter: Arc<GovernorLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>>,
    clock: DefaultClock,
}

impl IssuanceLimiter {
    pub fn new(config: IssuanceLimitConfig) -> Self {
        let limit = NonZeroU32::new(config.limit).unwrap_or(NonZeroU32::new(5).unwrap());
        let period = Duration::from_secs(config.window_secs.max(1)) / limit.get();

        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_minute(limit))
            .allow_burst(limit);

        Self {
            limiter: Arc::new(GovernorLimiter::keyed(quota)),
            clock: DefaultClock::default(),
        }
    }

    /// Check the limit for a client IP. On rejection the error carries the
    /// wait duration for a Retry-After header.
    pub fn check_ip(&self, ip: &str) -> GateResult<()> {
        match self.limiter.check_key(&ip.to_string()) {
            Ok(_) => Ok(()),
            Err(not_until) => Err(GateError::RateLimited {
                retry_after: not_until.wait_time_from(self.clock.now()),
            }),
        }
    }
}
