// Applies schema migrations and seed data, then exits

use anyhow::Result;
use common::config::Settings;
use common::db::migrations::Migrator;
use common::db::DbPool;
use common::telemetry;
use std::process::ExitCode;
use tracing::{error, info};

async fn run() -> Result<()> {
    let settings = Settings::load().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    telemetry::init_logging("minicrm-migrator", &settings.observability.log_level, None)?;
    info!("Running database migrations");

    let db_pool = DbPool::new(&settings.database).await?;
    let report = Migrator::new(db_pool.clone(), settings.admin.clone()).run().await;
    db_pool.close().await;

    let report = report?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Migration failed");
            eprintln!("Migration failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
