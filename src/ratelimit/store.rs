//! Store trait abstracting the shared cache that holds window state.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

use super::info::RateLimitInfo;

/// A keyed cache holding one [`RateLimitInfo`] per client, with TTL expiry.
///
/// This trait abstracts over the in-process [`MemoryStore`] and shared
/// backends such as the Redis store so the limiter works with either.
///
/// [`MemoryStore`]: super::MemoryStore
#[async_trait]
pub trait RateWindowStore: Send + Sync {
    /// Read the window state stored under `key`, if any is live.
    async fn get(&self, key: &str) -> Result<Option<RateLimitInfo>>;

    /// Write window state under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: RateLimitInfo, ttl: Duration) -> Result<()>;

    /// Atomically advance the window stored under `key`.
    ///
    /// If no live entry exists at `now`, or the stored window has lapsed
    /// (`now` is past its reset timestamp), `fresh` becomes the stored
    /// state. Otherwise `weight` is added to the stored call count.
    /// Returns the post-update state.
    ///
    /// Implementations must make the transition atomic per key: two
    /// concurrent calls for the same key must observe distinct,
    /// correctly incremented counts.
    async fn increment(
        &self,
        key: &str,
        fresh: RateLimitInfo,
        weight: u64,
        now: u64,
    ) -> Result<RateLimitInfo>;

    /// Whether this store can serve atomic, TTL'd, high-frequency counters.
    ///
    /// Stores that cannot (for example disk-backed caches) return `false`
    /// and are rejected when the middleware is built.
    fn supports_counters(&self) -> bool {
        true
    }
}
