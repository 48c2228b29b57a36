//! exrate server binary.

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use exrate_server::{RateService, ServiceConfig};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("EXRATE_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting exrate server");

    let config = ServiceConfig::from_env()
        .and_then(|config| config.validate().map(|_| config))
        .map_err(|e| {
            error!(error = %e, "Invalid configuration");
            anyhow::anyhow!("Configuration error: {}", e)
        })?;

    let service = RateService::build(config.clone())
        .await
        .context("failed to build rate service")?;
    service.start().await.context("failed to start rate service")?;

    let listener = tokio::net::TcpListener::bind((config.listen_addr.as_str(), config.listen_port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.listen_addr, config.listen_port))?;

    info!(
        listen_addr = %config.listen_addr,
        listen_port = config.listen_port,
        "Rate service listening"
    );

    axum::serve(listener, service.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.stop().await;
    info!("exrate server shutdown complete");
    Ok(())
}
