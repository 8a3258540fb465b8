//! Override points invoked around the rate limiting decision.

use std::time::Duration;

use axum::body::Body;
use http::Request;

use crate::ratelimit::{RateLimitInfo, ThrottleInfo};

/// Hooks called at fixed points while a request is rate limited.
///
/// Per request the order is [`skip`](ThrottleHooks::skip), then
/// [`identity`](ThrottleHooks::identity), then
/// [`throttle`](ThrottleHooks::throttle), and finally
/// [`before_persist`](ThrottleHooks::before_persist) once the decision has
/// been made. Every method has a no-op default, so implementations
/// override only the points they care about.
pub trait ThrottleHooks: Send + Sync {
    /// Return `true` to bypass rate limiting for this request.
    ///
    /// Skipped requests are forwarded untouched: nothing is counted and
    /// no rate limit headers are added.
    fn skip(&self, _request: &Request<Body>) -> bool {
        false
    }

    /// Override the identity this request is counted under.
    ///
    /// Returning `None` falls through to the configured identity resolver.
    fn identity(&self, _request: &Request<Body>) -> Option<String> {
        None
    }

    /// Adjust the throttle policy before the limiter runs.
    ///
    /// Only this request's policy is affected; the configured defaults
    /// stay untouched.
    fn throttle(&self, _request: &Request<Body>, _throttle: &mut ThrottleInfo) {}

    /// Adjust window state and TTL right before they are written back.
    ///
    /// The policy is read-only here because the decision that produced
    /// `info` was already made from it.
    fn before_persist(
        &self,
        _throttle: &ThrottleInfo,
        _info: &mut RateLimitInfo,
        _ttl: &mut Duration,
    ) {
    }
}

/// Hook set that overrides nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl ThrottleHooks for NoopHooks {}
