use anyhow::Result;
use std::net::SocketAddr;

use api::routes;
use api::state::AppState;
use common::config::Settings;
use common::db::DbPool;
use common::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Settings::load()?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        "minicrm-api",
        &config.observability.log_level,
        config.observability.tracing_endpoint.as_deref(),
    )?;
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        env = %common::config::app_env(),
        "Starting API server"
    );

    let metrics_handle = telemetry::install_metrics_recorder()?;

    let db_pool = DbPool::new(&config.database).await?;
    tracing::info!("Database connection pool established");

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let state = AppState::new(db_pool.clone(), config, Some(metrics_handle))?;
    let app = routes::create_router(state);

    tracing::info!(addr = %addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    telemetry::shutdown_tracer();
    tracing::info!("API server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
