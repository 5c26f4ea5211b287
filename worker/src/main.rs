// Worker binary: records task reminders as they come due

mod dispatcher;

use anyhow::Result;
use common::config::Settings;
use common::db::DbPool;
use common::telemetry;
use dispatcher::{DispatcherConfig, ReminderDispatcher, RepositoryStore};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        "minicrm-worker",
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;
    info!("Starting reminder worker");

    telemetry::init_metrics_listener(settings.observability.metrics_port)?;

    let db_pool = DbPool::new(&settings.database).await.map_err(|e| {
        error!(error = %e, "Failed to initialize database pool");
        anyhow::anyhow!("Database initialization error: {}", e)
    })?;
    info!("Database pool initialized");

    let dispatcher = Arc::new(ReminderDispatcher::new(
        DispatcherConfig {
            poll_interval_seconds: settings.worker.poll_interval_seconds,
            batch_size: settings.worker.batch_size,
        },
        Arc::new(RepositoryStore::new(db_pool.clone())),
    ));

    let runner = dispatcher.clone();
    let handle = tokio::spawn(async move { runner.start().await });

    shutdown_signal().await;
    dispatcher.stop();

    info!("Waiting for in-flight reminders to finish");
    if let Err(e) = handle.await {
        error!(error = %e, "Dispatcher task ended abnormally");
    }

    db_pool.close().await;
    telemetry::shutdown_tracer();
    info!("Worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}
