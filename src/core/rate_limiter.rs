//! Process-wide admission control for upstream calls.
//!
//! Every request passes through [`AdmissionGate::acquire`] once, before the
//! upstream is contacted. [`RateLimiter`] implements it as a token bucket via
//! the governor crate and waits rather than rejecting when the bucket is empty.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;

use crate::core::config::RateLimitConfig;

type DirectLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Gate a request must pass before the upstream call is issued.
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Suspend until the request may proceed.
    async fn acquire(&self);
}

/// Token-bucket admission gate shared by all requests.
pub struct RateLimiter {
    /// `None` when rate limiting is disabled.
    limiter: Option<DirectLimiter>,
}

impl RateLimiter {
    /// Create a limiter from configuration; `requests_per_second = 0` disables it.
    pub fn new(config: &RateLimitConfig) -> Self {
        let limiter = NonZeroU32::new(config.requests_per_second).map(|rps| {
            let quota = Quota::per_second(rps)
                .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(nonzero!(10u32)));
            GovernorRateLimiter::direct(quota)
        });

        if let Some(rps) = NonZeroU32::new(config.requests_per_second) {
            tracing::info!(
                requests_per_second = rps.get(),
                burst_size = config.burst_size,
                "Admission rate limiting enabled"
            );
        }

        Self { limiter }
    }

    /// A gate that never waits.
    pub fn disabled() -> Self {
        Self { limiter: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Take a permit without waiting. Always succeeds when disabled.
    pub fn try_acquire(&self) -> bool {
        self.limiter
            .as_ref()
            .map(|limiter| limiter.check().is_ok())
            .unwrap_or(true)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::disabled()
    }
}

#[async_trait]
impl AdmissionGate for RateLimiter {
    async fn acquire(&self) {
        let Some(limiter) = self.limiter.as_ref() else {
            return;
        };
        if limiter.check().is_ok() {
            return;
        }
        tracing::debug!("Admission gate saturated, waiting for a permit");
        limiter.until_ready().await;
    }
}
