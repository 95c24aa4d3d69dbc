//! Rate limiting for port probes.
//!
//! Provides token bucket rate limiting so a target with a configured
//! `rate_limit` spreads its port probes over time instead of only being
//! bounded by the worker pool width.

use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = GovLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A shared probes-per-second limiter.
///
/// Clones share one bucket, so the TCP and UDP scans of a target draw from
/// the same budget.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    /// Create a limiter allowing `rate` probes per second.
    pub fn new(rate: NonZeroU32) -> Self {
        Self {
            limiter: Arc::new(GovLimiter::direct(Quota::per_second(rate))),
        }
    }

    /// Wait until a token is available.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn rate(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_burst_is_immediate() {
        let limiter = RateLimiter::new(rate(1000));
        let started = Instant::now();
        for _ in 0..100 {
            limiter.wait().await;
        }
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_clones_share_budget() {
        let limiter = RateLimiter::new(rate(10));
        let clone = limiter.clone();

        let started = Instant::now();
        for _ in 0..10 {
            limiter.wait().await;
            clone.wait().await;
        }
        // 20 tokens from one bucket of 10/s: the burst plus ~1s of refill.
        assert!(started.elapsed() >= Duration::from_millis(900));
    }
}
