//! Turnstile - Fixed-Window HTTP Rate Limiting Middleware
//!
//! This crate implements fixed-window request rate limiting as a tower
//! middleware: each request is counted against a per-identity window held
//! in a pluggable cache store, and either forwarded with rate limit
//! headers or rejected with a 429. Hooks allow skipping requests,
//! overriding identities, segmenting policies and adjusting persisted
//! state.

pub mod clock;
pub mod config;
pub mod error;
pub mod hooks;
pub mod identity;
pub mod middleware;
pub mod ratelimit;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HeaderNames, ThrottleConfig};
pub use error::{Result, ThrottleError};
pub use hooks::{NoopHooks, ThrottleHooks};
pub use middleware::{ThrottleLayer, ThrottleLayerBuilder, ThrottleService, WeightFn};
pub use ratelimit::{MemoryStore, RateLimitInfo, RateLimiter, RateWindowStore, ThrottleInfo};

#[cfg(feature = "redis")]
pub use ratelimit::RedisStore;
