//! Rate limiting logic and window state management.

mod info;
mod limiter;
mod memory;
mod store;

#[cfg(feature = "redis")]
mod redis;

pub use info::{RateLimitInfo, ThrottleInfo};
pub use limiter::RateLimiter;
pub use memory::MemoryStore;
pub use store::RateWindowStore;

#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
