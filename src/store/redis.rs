//! Redis-backed stores for multi-instance deployments.
//!
//! Replay entries and locks are plain keys with a PX expiry, so Redis
//! handles eviction and `purge_expired` is a no-op.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use crate::store::{LockStore, ReplayStore, StoreError};

const COMPARE_AND_DELETE: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Shared replay set and lock table in one Redis database.
pub struct RedisStore {
    conn: MultiplexedConnection,
    prefix: String,
    release_script: redis::Script,
}

impl RedisStore {
    pub async fn connect(url: &str, prefix: String) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        tracing::info!(prefix = %prefix, "Connected to Redis store");
        Ok(Self {
            conn,
            prefix,
            release_script: redis::Script::new(COMPARE_AND_DELETE),
        })
    }

    fn replay_key(&self, key: &str) -> String {
        format!("{}:replay:{}", self.prefix, key)
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}:lock:{}", self.prefix, key)
    }

    async fn set_nx_px(&self, key: String, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let ttl_ms = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(reply.is_some())
    }
}

fn unavailable(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl ReplayStore for RedisStore {
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.set_nx_px(self.replay_key(key), "1", ttl).await
    }

    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("EXISTS")
            .arg(self.replay_key(key))
            .query_async::<bool>(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(self.replay_key(key))
            .query_async::<()>(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    fn len_hint(&self) -> Option<usize> {
        None
    }
}

#[async_trait]
impl LockStore for RedisStore {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.set_nx_px(self.lock_key(key), token, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release_script
            .key(self.lock_key(key))
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(deleted == 1)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    fn held_hint(&self) -> Option<usize> {
        None
    }
}
