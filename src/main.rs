use anyhow::Result;
use clap::Parser;
use keygate::config::Config;
use keygate::server::Server;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// API key authorization and request quota service
#[derive(Debug, Parser)]
#[command(name = "keygate", version, about)]
struct Cli {
    /// Overrides BIND_ADDR
    #[arg(long)]
    bind_addr: Option<SocketAddr>,

    /// Overrides LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Load configuration from environment
    let mut config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(bind_addr) = cli.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("keygate={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let backend = if config.uses_redis() { "redis" } else { "memory" };
    tracing::info!("Starting keygate service");
    tracing::info!(
        bind_addr = %config.bind_addr,
        backend,
        window_millis = config.window_millis,
        quota_mode = %config.quota_mode,
        "Configuration loaded"
    );

    // Create and run the server
    let server = Server::new(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
