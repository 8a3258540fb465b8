//! Core rate limiting decision engine.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::clock::Clock;
use crate::error::Result;
use crate::hooks::ThrottleHooks;

use super::info::{RateLimitInfo, ThrottleInfo};
use super::store::RateWindowStore;

/// The core rate limiter: advances window state in the store and decides
/// whether a request fits its window.
///
/// Thread-safe and cheap to share across tasks; all state lives in the
/// store.
pub struct RateLimiter {
    /// Shared cache holding window state per key
    store: Arc<dyn RateWindowStore>,
    /// Hook set consulted before state is written back
    hooks: Arc<dyn ThrottleHooks>,
    /// Time source, read once per decision
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter over `store`, with `hooks` and `clock` applied to
    /// every decision.
    pub fn new(
        store: Arc<dyn RateWindowStore>,
        hooks: Arc<dyn ThrottleHooks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            hooks,
            clock,
        }
    }

    /// Count one request of `weight` calls against `throttle` and return
    /// the resulting window state.
    ///
    /// Opens a fresh window when none is live for the key, increments the
    /// live one otherwise, and writes the state back with the remainder
    /// of the window as its TTL. Callers read the verdict off the
    /// returned state via [`RateLimitInfo::limit_exceeded`].
    pub async fn rate_limit(&self, throttle: &ThrottleInfo, weight: u64) -> Result<RateLimitInfo> {
        let now = self.clock.epoch_secs();

        trace!(
            key = %throttle.key(),
            weight = weight,
            "Checking rate limit"
        );

        let fresh = RateLimitInfo::new(
            throttle.limit(),
            weight,
            now.saturating_add(throttle.period()),
        );
        let mut info = self.store.increment(throttle.key(), fresh, weight, now).await?;

        if info.calls() == weight {
            debug!(
                key = %throttle.key(),
                reset = info.reset_timestamp(),
                "Opened new rate limit window"
            );
        }

        if info.limit_exceeded() {
            debug!(
                key = %throttle.key(),
                calls = info.calls(),
                limit = info.limit(),
                "Rate limit exceeded"
            );
        }

        let mut ttl = Duration::from_secs(info.reset_timestamp().saturating_sub(now));
        self.hooks.before_persist(throttle, &mut info, &mut ttl);

        self.store.set(throttle.key(), info.clone(), ttl).await?;

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::hooks::NoopHooks;
    use crate::ratelimit::memory::MemoryStore;

    fn limiter_at(now: u64) -> (RateLimiter, Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let limiter = RateLimiter::new(store.clone(), Arc::new(NoopHooks), clock.clone());
        (limiter, store, clock)
    }

    #[tokio::test]
    async fn test_first_request_opens_window() {
        let (limiter, _store, _clock) = limiter_at(100);
        let throttle = ThrottleInfo::new("client", 60, 60);

        let info = limiter.rate_limit(&throttle, 1).await.unwrap();

        assert!(!info.limit_exceeded());
        assert_eq!(info.calls(), 1);
        assert_eq!(info.remaining(), 59);
        assert_eq!(info.reset_timestamp(), 160);
    }

    #[tokio::test]
    async fn test_exactly_limit_requests_are_allowed() {
        let (limiter, _store, _clock) = limiter_at(0);
        let throttle = ThrottleInfo::new("client", 5, 60);

        for _ in 0..5 {
            let info = limiter.rate_limit(&throttle, 1).await.unwrap();
            assert!(!info.limit_exceeded());
        }

        let info = limiter.rate_limit(&throttle, 1).await.unwrap();
        assert!(info.limit_exceeded());
        assert_eq!(info.calls(), 6);
        assert_eq!(info.remaining(), 0);
    }

    #[tokio::test]
    async fn test_window_resets_after_period() {
        let (limiter, _store, clock) = limiter_at(0);
        let throttle = ThrottleInfo::new("client", 1, 60);

        let info = limiter.rate_limit(&throttle, 1).await.unwrap();
        assert!(!info.limit_exceeded());
        assert_eq!(info.reset_timestamp(), 60);

        clock.set(1);
        let info = limiter.rate_limit(&throttle, 1).await.unwrap();
        assert!(info.limit_exceeded());

        // Still the same window right up to its reset timestamp.
        clock.set(60);
        let info = limiter.rate_limit(&throttle, 1).await.unwrap();
        assert!(info.limit_exceeded());
        assert_eq!(info.calls(), 3);

        clock.set(61);
        let info = limiter.rate_limit(&throttle, 1).await.unwrap();
        assert!(!info.limit_exceeded());
        assert_eq!(info.calls(), 1);
        assert_eq!(info.reset_timestamp(), 121);
    }

    #[tokio::test]
    async fn test_mid_window_write_back_keeps_remaining_ttl() {
        let (limiter, store, clock) = limiter_at(0);
        let throttle = ThrottleInfo::new("client", 5, 60);

        limiter.rate_limit(&throttle, 1).await.unwrap();

        clock.set(30);
        limiter.rate_limit(&throttle, 1).await.unwrap();

        // The write at t=30 must not push expiry past the window reset.
        clock.set(60);
        assert!(store.get("client").await.unwrap().is_some());
        clock.set(61);
        assert!(store.get("client").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_limit_rejects_first_request() {
        let (limiter, _store, _clock) = limiter_at(0);
        let throttle = ThrottleInfo::new("client", 0, 60);

        let info = limiter.rate_limit(&throttle, 1).await.unwrap();
        assert!(info.limit_exceeded());
        assert_eq!(info.remaining(), 0);
    }

    #[tokio::test]
    async fn test_weight_counts_multiple_calls() {
        let (limiter, _store, _clock) = limiter_at(0);
        let throttle = ThrottleInfo::new("client", 10, 60);

        let info = limiter.rate_limit(&throttle, 4).await.unwrap();
        assert_eq!(info.calls(), 4);
        assert_eq!(info.remaining(), 6);

        let info = limiter.rate_limit(&throttle, 4).await.unwrap();
        assert_eq!(info.calls(), 8);

        let info = limiter.rate_limit(&throttle, 4).await.unwrap();
        assert!(info.limit_exceeded());
        assert_eq!(info.remaining(), 0);
    }

    #[tokio::test]
    async fn test_live_window_keeps_its_limit() {
        let (limiter, _store, clock) = limiter_at(0);

        let opened = ThrottleInfo::new("client", 5, 60);
        limiter.rate_limit(&opened, 1).await.unwrap();

        // A policy change mid-window does not rewrite the open window.
        let raised = ThrottleInfo::new("client", 10, 60);
        let info = limiter.rate_limit(&raised, 1).await.unwrap();
        assert_eq!(info.limit(), 5);

        clock.set(61);
        let info = limiter.rate_limit(&raised, 1).await.unwrap();
        assert_eq!(info.limit(), 10);
    }

    #[tokio::test]
    async fn test_separate_keys_have_separate_windows() {
        let (limiter, _store, _clock) = limiter_at(0);

        let first = ThrottleInfo::new("10.0.0.1", 60, 60);
        let second = ThrottleInfo::new("10.0.0.2", 60, 60);

        limiter.rate_limit(&first, 5).await.unwrap();
        let info = limiter.rate_limit(&second, 3).await.unwrap();

        assert_eq!(info.calls(), 3);
    }

    #[tokio::test]
    async fn test_before_persist_mutations_are_stored() {
        struct Pinning;

        impl ThrottleHooks for Pinning {
            fn before_persist(
                &self,
                _throttle: &ThrottleInfo,
                info: &mut RateLimitInfo,
                ttl: &mut Duration,
            ) {
                info.set_calls(99);
                *ttl = Duration::from_secs(5);
            }
        }

        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let limiter = RateLimiter::new(store.clone(), Arc::new(Pinning), clock.clone());
        let throttle = ThrottleInfo::new("client", 60, 60);

        let info = limiter.rate_limit(&throttle, 1).await.unwrap();
        assert_eq!(info.calls(), 99);

        let stored = store.get("client").await.unwrap().unwrap();
        assert_eq!(stored.calls(), 99);

        // The shortened TTL is what the store honors.
        clock.set(5);
        assert!(store.get("client").await.unwrap().is_some());
        clock.set(6);
        assert!(store.get("client").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_requests_still_count() {
        let (limiter, _store, _clock) = limiter_at(0);
        let throttle = ThrottleInfo::new("client", 2, 60);

        for _ in 0..5 {
            limiter.rate_limit(&throttle, 1).await.unwrap();
        }

        let info = limiter.rate_limit(&throttle, 1).await.unwrap();
        assert_eq!(info.calls(), 6);
        assert_eq!(info.remaining(), 0);
    }
}
