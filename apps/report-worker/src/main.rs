//! One-shot report cycle. Meant to be started by an external timer
//! (cron, systemd timer, Kubernetes CronJob).

use chrono::Utc;
use core_lib::{config::WorkerConfig, runtime};
use dotenvy::dotenv;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing (logging)
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(EnvFilter::from_default_env()) // Allow RUST_LOG
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting Report Worker v{}...", env!("CARGO_PKG_VERSION"));
    dotenv().ok();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let pool = match runtime::connect_database(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Database setup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let scheduler = match runtime::build_scheduler(&config, pool) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("Failed to build scheduler: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match scheduler.run_cycle(Utc::now()).await {
        Ok(summary) => {
            info!(
                processed = summary.processed,
                errors = summary.errors,
                skipped = summary.skipped,
                "Worker finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Report cycle failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
