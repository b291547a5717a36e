use crate::algorithms::SlidingWindow;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::config_validator::ConfigValidator;
use crate::directory::{AccountDirectory, AccountStore, InMemoryAccountDirectory, RedisAccountDirectory};
use crate::error::KeygateError;
use crate::gate::AuthorizationGate;
use crate::handlers::{
    authorize, authorize_admin, create_account, delete_account, get_account, get_usage_count,
    health_check, key_metrics_report, metrics_report, readiness_check, record_usage, AppState,
    SharedState,
};
use crate::health::HealthChecker;
use crate::metrics::MetricsCollector;
use crate::middleware::logging_middleware;
use crate::redis::RedisClient;
use crate::service::RateLimitedService;
use crate::usage::{InMemoryUsageStore, RedisUsageStore, UsageStore};
use axum::routing::{get, put};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Everything the router and background tasks need, wired from a `Config`.
pub struct Components {
    pub state: SharedState,
    pub usage: Arc<dyn UsageStore>,
    pub clock: Arc<dyn Clock>,
}

fn account_views<S>(store: Arc<S>) -> (Arc<dyn AccountDirectory>, Arc<dyn AccountStore>)
where
    S: AccountStore + 'static,
{
    (
        store.clone() as Arc<dyn AccountDirectory>,
        store as Arc<dyn AccountStore>,
    )
}

/// Build storage backends, the gate, and the service facade.
///
/// An empty `REDIS_URL` selects the in-memory backends.
pub async fn build_components(config: &Config) -> Result<Components, KeygateError> {
    ConfigValidator::validate(config)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = MetricsCollector::new();
    let window = config.window();

    let (directory, accounts, usage, redis) = if config.uses_redis() {
        let redis = Arc::new(RedisClient::new(&config.redis_url)?);
        let (directory, accounts) = account_views(Arc::new(RedisAccountDirectory::new(redis.clone())));
        let usage: Arc<dyn UsageStore> = Arc::new(RedisUsageStore::new(redis.clone(), window.width));
        (directory, accounts, usage, Some(redis))
    } else {
        let (directory, accounts) = account_views(Arc::new(InMemoryAccountDirectory::new()));
        let usage: Arc<dyn UsageStore> = Arc::new(InMemoryUsageStore::new());
        (directory, accounts, usage, None)
    };

    let gate = AuthorizationGate::new(directory, usage.clone(), clock.clone(), config.gate_config())?;
    let service = RateLimitedService::new(
        gate,
        accounts,
        usage.clone(),
        clock.clone(),
        window,
        metrics.clone(),
    );

    if let Some(admin_key) = &config.admin_key {
        service.bootstrap_admin(admin_key).await?;
    }

    let state = Arc::new(AppState {
        service,
        health: HealthChecker::new(redis),
        metrics,
        request_secret: config.request_secret_key.clone(),
    });

    Ok(Components { state, usage, clock })
}

pub fn create_app(state: SharedState) -> Router {
    let mut router: Router<SharedState> = Router::new()
        // Authorization endpoints
        .route("/authorize", get(authorize))
        .route("/authorize/admin", get(authorize_admin))
        // Account registry endpoints
        .route("/accounts", put(create_account))
        .route("/accounts/:key", get(get_account).delete(delete_account))
        // Health and readiness endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_report))
        .route("/metrics/:key", get(key_metrics_report));

    if state.request_secret.is_some() {
        router = router.route("/requests/:key", get(get_usage_count).put(record_usage));
    }

    router.with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(middleware::from_fn(logging_middleware)),
    )
}

/// Periodically drop usage events that have slid out of the window.
pub fn spawn_usage_eviction(
    usage: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    window: SlidingWindow,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let cutoff = window.bounds(clock.now_millis()).start;
            match usage.evict_before(cutoff).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, cutoff, "Evicted expired usage events"),
                Err(e) => tracing::warn!(error = %e, "Usage eviction failed"),
            }
        }
    })
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
    eviction: Option<JoinHandle<()>>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, KeygateError> {
        let components = build_components(&config).await?;

        let eviction = if config.cleanup_interval_secs > 0 {
            Some(spawn_usage_eviction(
                components.usage.clone(),
                components.clock.clone(),
                config.window(),
                config.cleanup_interval(),
            ))
        } else {
            None
        };

        Ok(Self {
            app: create_app(components.state),
            bind_addr: config.bind_addr,
            eviction,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("Keygate server listening on {}", self.bind_addr);
        tracing::info!("Health check available at /health");
        tracing::info!("Readiness check available at /ready");

        // Run server with graceful shutdown
        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        if let Some(eviction) = self.eviction {
            eviction.abort();
        }

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::usage::InMemoryUsageStore;

    #[tokio::test]
    async fn test_memory_components_with_bootstrap_admin() {
        let config = Config {
            admin_key: Some("root".to_string()),
            ..Config::default()
        };

        let components = build_components(&config).await.unwrap();
        assert!(components.state.service.authorize_admin("root").await.is_ok());
        assert!(components.state.service.authorize("nobody").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = Config {
            window_millis: 0,
            ..Config::default()
        };
        assert!(build_components(&config).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_task_drops_old_events() {
        let store = Arc::new(InMemoryUsageStore::new());
        store.record("k", 1_000).await.unwrap();
        store.record("k", 95_000).await.unwrap();

        let clock = Arc::new(ManualClock::new(100_000));
        let handle = spawn_usage_eviction(
            store.clone(),
            clock,
            SlidingWindow::from_millis(60_000),
            Duration::from_secs(1),
        );

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        handle.abort();

        assert_eq!(store.total_events("k").await, 1);
    }
}
