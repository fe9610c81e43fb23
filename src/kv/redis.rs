//! Distributed key-value store backed by Redis.
//!
//! `set_if_absent` is a single `SET NX PX`; `increment` is a Lua script so the
//! counter bump and the first-hit expiry happen in one round trip.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use std::time::Duration;
use tokio::sync::OnceCell;

use super::{KeyValueStore, StoreResult, WindowCount};

const INCREMENT_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {current, ttl}
"#;

pub struct RedisStore {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
    increment_script: Script,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            increment_script: Script::new(INCREMENT_SCRIPT),
        })
    }

    async fn connection(&self) -> StoreResult<MultiplexedConnection> {
        let conn = self
            .connection
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await?;
        Ok(conn.clone())
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().max(1) as u64
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn increment(&self, key: &str, window: Duration) -> StoreResult<WindowCount> {
        let mut conn = self.connection().await?;
        let (count, ttl_ms): (u64, i64) = self
            .increment_script
            .key(key)
            .arg(millis(window))
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowCount {
            count,
            reset_in: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }
}
