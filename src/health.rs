use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use serde::{Deserialize, Serialize};

use crate::redis::RedisClient;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub storage: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub backend: String,
    pub status: String,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

const PING_TIMEOUT: Duration = Duration::from_secs(2);

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

#[derive(Clone, Default)]
pub struct HealthChecker {
    redis: Option<Arc<RedisClient>>,
}

impl HealthChecker {
    pub fn new(redis: Option<Arc<RedisClient>>) -> Self {
        // Pin uptime to the first checker, not the first probe.
        let _ = *START_TIME;
        Self { redis }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME)
            .unwrap_or_default()
            .as_secs();

        let storage = self.check_storage().await;

        // Storage down means every call is denied.
        let overall_status = if storage.status == "healthy" {
            "healthy"
        } else {
            "unhealthy"
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: now.duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            dependencies: DependencyStatus { storage },
        }
    }

    pub async fn is_ready(&self) -> bool {
        self.check_storage().await.status == "healthy"
    }

    async fn check_storage(&self) -> ServiceStatus {
        let Some(redis) = &self.redis else {
            return ServiceStatus {
                backend: "memory".to_string(),
                status: "healthy".to_string(),
                response_time_ms: 0,
                error: None,
            };
        };

        let start = Instant::now();
        let result = tokio::time::timeout(PING_TIMEOUT, redis.ping()).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => ServiceStatus {
                backend: "redis".to_string(),
                status: "healthy".to_string(),
                response_time_ms,
                error: None,
            },
            Ok(Err(e)) => ServiceStatus {
                backend: "redis".to_string(),
                status: "unavailable".to_string(),
                response_time_ms,
                error: Some(e.to_string()),
            },
            Err(_) => ServiceStatus {
                backend: "redis".to_string(),
                status: "unavailable".to_string(),
                response_time_ms,
                error: Some("Redis ping timed out".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus {
            status: "healthy".to_string(),
            timestamp: 1234567890,
            version: "1.0.0".to_string(),
            uptime_seconds: 3600,
            dependencies: DependencyStatus {
                storage: ServiceStatus {
                    backend: "redis".to_string(),
                    status: "healthy".to_string(),
                    response_time_ms: 5,
                    error: None,
                },
            },
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("1234567890"));
    }

    #[tokio::test]
    async fn test_memory_backend_is_healthy() {
        let checker = HealthChecker::new(None);
        let status = checker.check_health().await;
        assert_eq!(status.status, "healthy");
        assert_eq!(status.dependencies.storage.backend, "memory");
        assert!(checker.is_ready().await);
    }
}
