//! Append-only usage log with sliding-window range counts.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::UsageError;
use crate::key_generator::KeyGenerator;
use crate::redis::RedisClient;

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Append one event. Repeated calls with the same timestamp each append.
    async fn record(&self, key: &str, timestamp: u64) -> Result<(), UsageError>;

    /// Events for `key` with `window_start <= timestamp <= window_end`.
    async fn count_in_window(
        &self,
        key: &str,
        window_start: u64,
        window_end: u64,
    ) -> Result<u64, UsageError>;

    fn supports_atomic_acquire(&self) -> bool {
        false
    }

    /// Atomically count events in `[window_start, now]` and, if one more
    /// fits under `limit`, record an event at `now`. Returns whether the
    /// event was recorded.
    async fn acquire(
        &self,
        _key: &str,
        _window_start: u64,
        _now: u64,
        _limit: u64,
    ) -> Result<bool, UsageError> {
        Err(UsageError::Unsupported(self.backend_name()))
    }

    /// Drop events older than `cutoff`, returning how many were removed.
    async fn evict_before(&self, _cutoff: u64) -> Result<u64, UsageError> {
        Ok(0)
    }
}

/// Per-key ordered multiset of timestamps.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUsageStore {
    events: Arc<RwLock<HashMap<String, BTreeMap<u64, u64>>>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every retained event for `key`, regardless of window.
    pub async fn total_events(&self, key: &str) -> u64 {
        self.events
            .read()
            .await
            .get(key)
            .map(|events| events.values().sum())
            .unwrap_or(0)
    }

    fn count_range(events: Option<&BTreeMap<u64, u64>>, start: u64, end: u64) -> u64 {
        match events {
            Some(events) if start <= end => events.range(start..=end).map(|(_, n)| *n).sum(),
            _ => 0,
        }
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn record(&self, key: &str, timestamp: u64) -> Result<(), UsageError> {
        let mut events = self.events.write().await;
        *events
            .entry(key.to_string())
            .or_default()
            .entry(timestamp)
            .or_insert(0) += 1;
        Ok(())
    }

    async fn count_in_window(
        &self,
        key: &str,
        window_start: u64,
        window_end: u64,
    ) -> Result<u64, UsageError> {
        let events = self.events.read().await;
        Ok(Self::count_range(events.get(key), window_start, window_end))
    }

    fn supports_atomic_acquire(&self) -> bool {
        true
    }

    async fn acquire(
        &self,
        key: &str,
        window_start: u64,
        now: u64,
        limit: u64,
    ) -> Result<bool, UsageError> {
        let mut events = self.events.write().await;
        let used = Self::count_range(events.get(key), window_start, now);
        if used.saturating_add(1) > limit {
            return Ok(false);
        }

        *events
            .entry(key.to_string())
            .or_default()
            .entry(now)
            .or_insert(0) += 1;
        Ok(true)
    }

    async fn evict_before(&self, cutoff: u64) -> Result<u64, UsageError> {
        let mut events = self.events.write().await;
        let mut removed = 0;

        for timeline in events.values_mut() {
            let kept = timeline.split_off(&cutoff);
            removed += timeline.values().sum::<u64>();
            *timeline = kept;
        }
        events.retain(|_, timeline| !timeline.is_empty());

        Ok(removed)
    }
}

const ACQUIRE_SCRIPT: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[1])
local used = redis.call('ZCOUNT', KEYS[1], ARGV[1], ARGV[2])
if used + 1 > tonumber(ARGV[3]) then
    return 0
end
redis.call('ZADD', KEYS[1], ARGV[2], ARGV[4])
redis.call('PEXPIRE', KEYS[1], ARGV[5])
return 1
"#;

/// One sorted set per API key, scored by timestamp.
///
/// Members carry a uuid suffix so events sharing a timestamp stay distinct.
/// Every write drops events older than one retention period, and an idle
/// key expires after the same period.
pub struct RedisUsageStore {
    redis: Arc<RedisClient>,
    keys: KeyGenerator,
    retention: Duration,
}

impl RedisUsageStore {
    pub fn new(redis: Arc<RedisClient>, retention: Duration) -> Self {
        Self {
            redis,
            keys: KeyGenerator::default(),
            retention,
        }
    }

    fn member(timestamp: u64) -> String {
        format!("{}:{}", timestamp, Uuid::new_v4())
    }

    fn retention_millis(&self) -> u64 {
        (self.retention.as_millis() as u64).max(1)
    }

    /// Oldest score still inside the window that ends at `timestamp`.
    fn trim_below(&self, timestamp: u64) -> u64 {
        timestamp.saturating_sub(self.retention_millis())
    }
}

#[async_trait]
impl UsageStore for RedisUsageStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn record(&self, key: &str, timestamp: u64) -> Result<(), UsageError> {
        self.redis
            .zadd_trimmed(
                &self.keys.usage_key(key),
                timestamp,
                &Self::member(timestamp),
                self.trim_below(timestamp),
                self.retention_millis(),
            )
            .await
            .map_err(|e| UsageError::RecordFailed(e.to_string()))
    }

    async fn count_in_window(
        &self,
        key: &str,
        window_start: u64,
        window_end: u64,
    ) -> Result<u64, UsageError> {
        self.redis
            .zcount(&self.keys.usage_key(key), window_start, window_end)
            .await
            .map_err(|e| UsageError::CountFailed(e.to_string()))
    }

    fn supports_atomic_acquire(&self) -> bool {
        true
    }

    async fn acquire(
        &self,
        key: &str,
        window_start: u64,
        now: u64,
        limit: u64,
    ) -> Result<bool, UsageError> {
        let storage_key = self.keys.usage_key(key);
        let args = [
            window_start.to_string(),
            now.to_string(),
            limit.to_string(),
            Self::member(now),
            self.retention_millis().to_string(),
        ];

        let recorded: i64 = self
            .redis
            .eval_script(ACQUIRE_SCRIPT, &[storage_key.as_str()], &args)
            .await
            .map_err(|e| UsageError::RecordFailed(e.to_string()))?;

        Ok(recorded == 1)
    }
}
