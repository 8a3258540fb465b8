//! Redis-backed window store for deployments sharing limits across
//! instances behind one cache pool.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::error::{Result, ThrottleError};

use super::info::RateLimitInfo;
use super::store::RateWindowStore;

/// Lua script performing the window transition in a single round trip.
///
/// Field names must match the serde representation of [`RateLimitInfo`].
const INCREMENT_SCRIPT: &str = r#"
local value = redis.call('GET', KEYS[1])
local now = tonumber(ARGV[1])
local weight = tonumber(ARGV[2])
if value then
    local state = cjson.decode(value)
    if now <= state.reset_timestamp then
        state.calls = state.calls + weight
        local ttl = state.reset_timestamp - now
        if ttl < 1 then
            ttl = 1
        end
        local encoded = cjson.encode(state)
        redis.call('SET', KEYS[1], encoded, 'EX', ttl)
        return encoded
    end
end
redis.call('SET', KEYS[1], ARGV[3], 'EX', tonumber(ARGV[4]))
return ARGV[3]
"#;

/// Store keeping window state in Redis as JSON values with TTLs.
///
/// The connection is multiplexed, so cloning the store is cheap and every
/// operation pipelines over the same underlying link.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to Redis at `url`, e.g. `redis://127.0.0.1:6379`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(ThrottleError::store)?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(ThrottleError::store)?;
        Ok(Self { connection })
    }

    /// Build a store over an existing connection.
    pub fn with_connection(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl RateWindowStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitInfo>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await.map_err(ThrottleError::store)?;

        match value {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).map_err(ThrottleError::store)?,
            )),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: RateLimitInfo, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(&value).map_err(ThrottleError::store)?;

        // EX 0 is invalid, so short TTLs round up to one second.
        let ttl_secs = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, json, ttl_secs)
            .await
            .map_err(ThrottleError::store)?;

        Ok(())
    }

    async fn increment(
        &self,
        key: &str,
        fresh: RateLimitInfo,
        weight: u64,
        now: u64,
    ) -> Result<RateLimitInfo> {
        let mut conn = self.connection.clone();
        let fresh_json = serde_json::to_string(&fresh).map_err(ThrottleError::store)?;
        let fresh_ttl = fresh.reset_timestamp().saturating_sub(now).max(1);

        let raw: String = redis::Script::new(INCREMENT_SCRIPT)
            .key(key)
            .arg(now)
            .arg(weight)
            .arg(fresh_json)
            .arg(fresh_ttl)
            .invoke_async(&mut conn)
            .await
            .map_err(ThrottleError::store)?;

        serde_json::from_str(&raw).map_err(ThrottleError::store)
    }
}
