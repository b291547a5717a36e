use crate::error::KeygateError;
use redis::aio::ConnectionManager;
use redis::{Client, FromRedisValue, RedisResult};
use std::collections::HashMap;
use tokio::sync::OnceCell;

/// Thin async wrapper over a shared, lazily established Redis connection.
///
/// The connection manager reconnects on its own, so a Redis outage shows up
/// as per-command errors rather than a dead client.
pub struct RedisClient {
    client: Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisClient {
    pub fn new(redis_url: &str) -> Result<Self, KeygateError> {
        let client = Client::open(redis_url)
            .map_err(|e| KeygateError::Redis(format!("Failed to create Redis client: {}", e)))?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, KeygateError> {
        let manager = self
            .connection
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await
            .map_err(|e| KeygateError::Redis(format!("Failed to connect to Redis: {}", e)))?;

        Ok(manager.clone())
    }

    pub async fn ping(&self) -> Result<String, KeygateError> {
        let mut conn = self.connection().await?;
        let result: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        result.map_err(|e| KeygateError::Redis(format!("Ping failed: {}", e)))
    }

    pub async fn eval_script<T>(
        &self,
        script: &str,
        keys: &[&str],
        args: &[String],
    ) -> Result<T, KeygateError>
    where
        T: FromRedisValue,
    {
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("EVAL");
        cmd.arg(script).arg(keys.len());
        for key in keys {
            cmd.arg(*key);
        }
        for arg in args {
            cmd.arg(arg);
        }

        let result: RedisResult<T> = cmd.query_async(&mut conn).await;
        result.map_err(|e| KeygateError::Redis(format!("Script execution failed: {}", e)))
    }

    /// Drops members scored strictly below `trim_below`, adds `member` and
    /// refreshes the set's expiry in one MULTI/EXEC round trip.
    pub async fn zadd_trimmed(
        &self,
        key: &str,
        score: u64,
        member: &str,
        trim_below: u64,
        expiry_millis: u64,
    ) -> Result<(), KeygateError> {
        let mut conn = self.connection().await?;

        let result: RedisResult<()> = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(format!("({}", trim_below))
            .ignore()
            .cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .ignore()
            .cmd("PEXPIRE")
            .arg(key)
            .arg(expiry_millis)
            .ignore()
            .query_async(&mut conn)
            .await;

        result.map_err(|e| KeygateError::Redis(format!("ZADD failed: {}", e)))
    }

    pub async fn zcount(&self, key: &str, min: u64, max: u64) -> Result<u64, KeygateError> {
        let mut conn = self.connection().await?;
        let result: RedisResult<u64> = redis::cmd("ZCOUNT")
            .arg(key)
            .arg(min)
            .arg(max)
            .query_async(&mut conn)
            .await;
        result.map_err(|e| KeygateError::Redis(format!("ZCOUNT failed: {}", e)))
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KeygateError> {
        let mut conn = self.connection().await?;
        let result: RedisResult<HashMap<String, String>> =
            redis::cmd("HGETALL").arg(key).query_async(&mut conn).await;
        result.map_err(|e| KeygateError::Redis(format!("HGETALL failed: {}", e)))
    }

    pub async fn delete(&self, key: &str) -> Result<bool, KeygateError> {
        let mut conn = self.connection().await?;
        let result: RedisResult<i64> = redis::cmd("DEL").arg(key).query_async(&mut conn).await;
        result
            .map(|deleted_count| deleted_count > 0)
            .map_err(|e| KeygateError::Redis(format!("DEL failed: {}", e)))
    }
}
