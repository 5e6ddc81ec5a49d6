//! Upstream read limiter shared by all providers.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Default reads per second across all providers.
pub const DEFAULT_READS_PER_SEC: u32 = 20;

type Direct = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket in front of every upstream read.
#[derive(Debug, Clone)]
pub struct UpstreamLimiter {
    reads: Arc<Direct>,
    per_sec: u32,
}

impl UpstreamLimiter {
    /// `reads_per_sec` of 0 is treated as 1.
    pub fn per_second(reads_per_sec: u32) -> Self {
        let rate = NonZeroU32::new(reads_per_sec).unwrap_or(NonZeroU32::MIN);
        Self {
            reads: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
            per_sec: rate.get(),
        }
    }

    pub fn reads_per_sec(&self) -> u32 {
        self.per_sec
    }

    /// Wait for a read slot.
    pub async fn acquire(&self) {
        self.reads.until_ready().await;
    }

    /// Take a read slot if one is free right now.
    pub fn try_acquire(&self) -> bool {
        self.reads.check().is_ok()
    }
}

impl Default for UpstreamLimiter {
    fn default() -> Self {
        Self::per_second(DEFAULT_READS_PER_SEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_bounded_by_quota() {
        let limiter = UpstreamLimiter::per_second(3);
        let granted = (0..10).filter(|_| limiter.try_acquire()).count();
        assert_eq!(granted, 3, "burst capacity equals the per-second quota");
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        assert_eq!(UpstreamLimiter::per_second(0).reads_per_sec(), 1);
        assert_eq!(UpstreamLimiter::default().reads_per_sec(), DEFAULT_READS_PER_SEC);
    }

    #[tokio::test]
    async fn test_acquire_within_quota_does_not_wait() {
        let limiter = UpstreamLimiter::per_second(5);
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(!limiter.try_acquire(), "bucket should be drained");
    }
}
