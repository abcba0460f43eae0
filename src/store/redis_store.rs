//! Redis-backed store implementation
//!
//! Ordinary commands share one multiplexed connection. The blocking
//! pop-push gets a dedicated connection per call so it never stalls the
//! shared pipeline, and cancelling the in-flight future simply drops
//! that connection.

use std::time::Duration;

use redis::{aio::MultiplexedConnection, AsyncCommands, Client};

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Store implementation over a Redis-compatible server
pub struct RedisStore {
    client: Client,
    connection: MultiplexedConnection,
    url: String,
}

impl RedisStore {
    /// Connect to the server at `url` (e.g. `redis://127.0.0.1:6379`)
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url).map_err(|e| StoreError::ConnectionFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let connection = client.get_multiplexed_async_connection().await.map_err(|e| {
            StoreError::ConnectionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            client,
            connection,
            url: url.to_string(),
        })
    }

    /// Get a fresh connection for commands that block server-side
    async fn dedicated(&self) -> StoreResult<MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await.map_err(|e| {
            StoreError::ConnectionFailed {
                url: self.url.clone(),
                reason: e.to_string(),
            }
        })
    }
}

#[async_trait::async_trait]
impl Store for RedisStore {
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        conn.lpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn rpoplpush(&self, source: &str, destination: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = redis::cmd("RPOPLPUSH")
            .arg(source)
            .arg(destination)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn brpoplpush(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>> {
        let mut conn = self.dedicated().await?;
        let value: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(source)
            .arg(destination)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn lrem(&self, key: &str, count: isize, value: &str) -> StoreResult<i64> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.lrem(key, count, value).await?;
        Ok(removed)
    }

    async fn llen(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.connection.clone();
        let len: i64 = conn.llen(key).await?;
        Ok(len)
    }

    async fn del(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed)
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        // Redis TTLs are whole seconds; round sub-second TTLs up to one.
        let seconds = ttl.as_secs().max(1);
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(seconds)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }
}
