use envconfig::Envconfig;
use std::net::SocketAddr;
use std::time::Duration;

use crate::algorithms::{QuotaMode, SlidingWindow};
use crate::gate::GateConfig;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:3001")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL; empty keeps accounts and usage in memory
    #[envconfig(from = "REDIS_URL", default = "")]
    pub redis_url: String,

    /// Sliding window width in milliseconds
    #[envconfig(from = "WINDOW_MILLIS", default = "60000")]
    pub window_millis: u64,

    /// `best-effort` or `strict`
    #[envconfig(from = "QUOTA_MODE", default = "best-effort")]
    pub quota_mode: QuotaMode,

    /// Upper bound on the lookup/count phase, 0 disables it
    #[envconfig(from = "FETCH_TIMEOUT_MILLIS", default = "2000")]
    pub fetch_timeout_millis: u64,

    /// Usage eviction interval in seconds
    #[envconfig(from = "CLEANUP_INTERVAL", default = "300")]
    pub cleanup_interval_secs: u64,

    /// Seeded as an unlimited admin account at startup
    #[envconfig(from = "ADMIN_KEY")]
    pub admin_key: Option<String>,

    /// Shared secret for the request-counter endpoints
    #[envconfig(from = "REQUEST_SECRET_KEY")]
    pub request_secret_key: Option<String>,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn window(&self) -> SlidingWindow {
        SlidingWindow::from_millis(self.window_millis)
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            mode: self.quota_mode,
            fetch_timeout: match self.fetch_timeout_millis {
                0 => None,
                millis => Some(Duration::from_millis(millis)),
            },
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn uses_redis(&self) -> bool {
        !self.redis_url.trim().is_empty()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            redis_url: String::new(),
            window_millis: 60_000,
            quota_mode: QuotaMode::BestEffort,
            fetch_timeout_millis: 2_000,
            cleanup_interval_secs: 300,
            admin_key: None,
            request_secret_key: None,
            log_level: "info".to_string(),
        }
    }
}
