//! Time source abstraction for window arithmetic.

use std::sync::atomic::{AtomicU64, Ordering};

/// A source of the current time in seconds since the Unix epoch.
///
/// The limiter reads the clock exactly once per decision and derives the
/// window reset and TTL from that single value. Injecting the clock keeps
/// window arithmetic deterministic in tests.
pub trait Clock: Send + Sync {
    /// Current time in seconds since the Unix epoch.
    fn epoch_secs(&self) -> u64;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_secs(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// A clock that only moves when told to.
///
/// Useful for tests and replays that need to cross window boundaries
/// without sleeping.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock pinned at `now` epoch seconds.
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Move the clock to an absolute time.
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Advance the clock by `secs`.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn epoch_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
