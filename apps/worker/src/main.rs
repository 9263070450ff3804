use anyhow::Context;
use dotenv::dotenv;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod wiring;

use shared_config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic background worker");

    let config = AppConfig::from_env();
    let clinic = wiring::Clinic::connect(&config).await?;

    clinic
        .admin
        .ensure_admin(&config.default_admin_name, &config.default_admin_email)
        .await
        .context("Failed to bootstrap the admin account")?;

    tokio::fs::create_dir_all(&config.export_dir)
        .await
        .with_context(|| format!("Failed to create export directory {}", config.export_dir.display()))?;

    clinic
        .worker
        .recover_stalled_jobs()
        .await
        .context("Failed to recover stalled jobs")?;

    let worker_handles = clinic.worker.start();
    let scheduler = Arc::clone(&clinic.scheduler);
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    clinic.scheduler.shutdown();
    clinic.worker.shutdown();

    for result in futures::future::join_all(worker_handles).await {
        if let Err(e) = result {
            warn!("Worker loop ended abnormally: {}", e);
        }
    }
    if let Err(e) = scheduler_handle.await {
        warn!("Scheduler ended abnormally: {}", e);
    }

    info!("Clinic worker stopped");
    Ok(())
}
