//! Redis-backed store shared by every worker process.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};

use super::{Counter, SharedStore, StoreError};

/// INCR and, for a freshly created key, PEXPIRE in one server-side step.
const INCREMENT_SCRIPT: &str = r"
local hits = redis.call('INCR', KEYS[1])
if hits == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return {hits, redis.call('PTTL', KEYS[1])}
";

/// DECR a live counter, stopping at zero. Missing keys stay missing.
const RELEASE_SCRIPT: &str = r"
local hits = tonumber(redis.call('GET', KEYS[1]) or '0')
if hits > 0 then
    return redis.call('DECR', KEYS[1])
end
return 0
";

pub struct RedisStore {
    conn: MultiplexedConnection,
    increment_script: Script,
    release_script: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend_error)?;
        Ok(Self {
            conn,
            increment_script: Script::new(INCREMENT_SCRIPT),
            release_script: Script::new(RELEASE_SCRIPT),
        })
    }
}

fn backend_error(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn millis(d: Duration) -> u64 {
    d.as_millis().clamp(1, u64::MAX as u128) as u64
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<Counter, StoreError> {
        let mut conn = self.conn.clone();
        let (hits, pttl): (i64, i64) = self
            .increment_script
            .key(key)
            .arg(millis(window))
            .invoke_async(&mut conn)
            .await
            .map_err(backend_error)?;
        let resets_in = if pttl > 0 {
            Duration::from_millis(pttl as u64)
        } else {
            window
        };
        Ok(Counter {
            hits: hits.max(0) as u64,
            resets_in,
        })
    }

    async fn release(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .release_script
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn counter(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let hits: Option<u64> = conn.get(key).await.map_err(backend_error)?;
        Ok(hits.unwrap_or(0))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(backend_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(backend_error)?;
        Ok(())
    }

    async fn insert_new(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        conn.set_nx(key, value).await.map_err(backend_error)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(backend_error)?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
