//! Value objects for throttle policy and persisted window state.

use serde::{Deserialize, Serialize};

/// Separator used when appending policy segments to a cache key.
const KEY_SEPARATOR: &str = ".";

/// Per-request throttle policy: the cache key to count under and the
/// window bounds to enforce.
///
/// Built fresh for every request from the resolved identity and the
/// configured limits, then optionally adjusted by the policy hook before
/// the limiter runs. Mutating it never touches configuration state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleInfo {
    /// Cache key, typically the client identity
    key: String,
    /// Maximum calls allowed within one window
    limit: u64,
    /// Window length in seconds
    period: u64,
}

impl ThrottleInfo {
    /// Create a policy for `key` allowing `limit` calls per `period` seconds.
    pub fn new(key: impl Into<String>, limit: u64, period: u64) -> Self {
        Self {
            key: key.into(),
            limit,
            period,
        }
    }

    /// The cache key requests are counted under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Maximum calls allowed within one window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length in seconds.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Replace the cache key.
    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = key.into();
    }

    /// Replace the limit.
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = limit;
    }

    /// Replace the period.
    pub fn set_period(&mut self, period: u64) {
        self.period = period;
    }

    /// Append a segment to the cache key, separated by a dot.
    ///
    /// Lets policy hooks track subsets of traffic independently, e.g.
    /// `append_key("post")` to count POST requests on their own window.
    pub fn append_key(&mut self, segment: &str) {
        self.key.push_str(KEY_SEPARATOR);
        self.key.push_str(segment);
    }
}

/// Window state persisted in the store for one cache key.
///
/// Serialized as-is by stores that keep structured values (the Redis
/// backend stores it as JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Limit the window was opened with
    limit: u64,
    /// Calls observed so far in this window
    calls: u64,
    /// Epoch second at which the window lapses
    reset_timestamp: u64,
}

impl RateLimitInfo {
    /// Create window state with an initial call count.
    pub fn new(limit: u64, calls: u64, reset_timestamp: u64) -> Self {
        Self {
            limit,
            calls,
            reset_timestamp,
        }
    }

    /// Limit the window was opened with.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Calls observed so far in this window.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Epoch second at which the window lapses.
    pub fn reset_timestamp(&self) -> u64 {
        self.reset_timestamp
    }

    /// Calls still allowed in this window, clamped at zero.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.calls)
    }

    /// Whether the window's limit has been exceeded.
    ///
    /// Exactly `limit` calls are allowed; the check trips on the call after.
    pub fn limit_exceeded(&self) -> bool {
        self.calls > self.limit
    }

    /// Replace the limit.
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = limit;
    }

    /// Replace the call count.
    pub fn set_calls(&mut self, calls: u64) {
        self.calls = calls;
    }

    /// Replace the reset timestamp.
    pub fn set_reset_timestamp(&mut self, reset_timestamp: u64) {
        self.reset_timestamp = reset_timestamp;
    }

    /// Add `weight` calls to the window.
    pub fn increment_calls(&mut self, weight: u64) {
        self.calls = self.calls.saturating_add(weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_key_uses_dot_separator() {
        let mut throttle = ThrottleInfo::new("10.0.0.1", 60, 60);
        throttle.append_key("post");
        assert_eq!(throttle.key(), "10.0.0.1.post");

        throttle.append_key("upload");
        assert_eq!(throttle.key(), "10.0.0.1.post.upload");
    }

    #[test]
    fn test_remaining_never_negative() {
        let mut info = RateLimitInfo::new(5, 3, 100);
        assert_eq!(info.remaining(), 2);

        info.set_calls(5);
        assert_eq!(info.remaining(), 0);

        info.set_calls(9);
        assert_eq!(info.remaining(), 0);
    }

    #[test]
    fn test_limit_exceeded_is_strictly_greater() {
        let mut info = RateLimitInfo::new(5, 5, 100);
        assert!(!info.limit_exceeded());

        info.increment_calls(1);
        assert!(info.limit_exceeded());
    }

    #[test]
    fn test_zero_limit_exceeded_by_first_call() {
        let info = RateLimitInfo::new(0, 1, 100);
        assert!(info.limit_exceeded());
        assert_eq!(info.remaining(), 0);
    }

    #[test]
    fn test_increment_calls_by_weight() {
        let mut info = RateLimitInfo::new(10, 1, 100);
        info.increment_calls(4);
        assert_eq!(info.calls(), 5);
        assert_eq!(info.remaining(), 5);
    }

    #[test]
    fn test_serde_round_trip() {
        let info = RateLimitInfo::new(60, 2, 1_700_000_060);
        let json = serde_json::to_string(&info).unwrap();
        let back: RateLimitInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
