//! In-memory window store backed by a concurrent hash map.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;

use super::info::RateLimitInfo;
use super::store::RateWindowStore;

/// An in-process store for single-instance deployments and tests.
///
/// Entries expire lazily: reads treat an entry whose TTL has lapsed as
/// absent, and [`purge_expired`](MemoryStore::purge_expired) reclaims the
/// memory. Per-key atomicity comes from the map's entry locking.
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    info: RateLimitInfo,
    /// Epoch second after which the entry no longer exists
    expires_at: u64,
}

impl MemoryStore {
    /// Create a store running on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of entries currently held, including expired ones not yet
    /// purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries whose TTL has lapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.epoch_secs();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.expires_at);
        before - self.entries.len()
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateWindowStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitInfo>> {
        let now = self.clock.epoch_secs();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| now <= entry.expires_at)
            .map(|entry| entry.info.clone()))
    }

    async fn set(&self, key: &str, value: RateLimitInfo, ttl: Duration) -> Result<()> {
        let expires_at = self.clock.epoch_secs().saturating_add(ttl.as_secs());
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                info: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn increment(
        &self,
        key: &str,
        fresh: RateLimitInfo,
        weight: u64,
        now: u64,
    ) -> Result<RateLimitInfo> {
        // The entry handle holds the shard lock, making the whole
        // transition atomic for this key.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if now > entry.expires_at || now > entry.info.reset_timestamp() {
                    *entry = StoredEntry {
                        expires_at: fresh.reset_timestamp(),
                        info: fresh,
                    };
                } else {
                    entry.info.increment_calls(weight);
                }
                Ok(entry.info.clone())
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry {
                    info: fresh.clone(),
                    expires_at: fresh.reset_timestamp(),
                });
                Ok(fresh)
            }
        }
    }
}
