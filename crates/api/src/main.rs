use anyhow::Context;

use cloudwatcher_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cloudwatcher_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(config = %serde_json::to_string(&config)?, "configuration loaded");

    let services = cloudwatcher_api::app::services::build_services(&config)?;
    let heartbeat = services.spawn_heartbeat();
    let app = cloudwatcher_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let closed = heartbeat.shutdown().await;
    tracing::info!(closed, "shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
