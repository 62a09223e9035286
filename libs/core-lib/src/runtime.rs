//! Production wiring shared by the worker and the gateway.

use crate::{
    CoreError,
    adapters::{
        gemini::GeminiModel, google_analytics::GoogleAnalyticsClient,
        postgres_store::PostgresStore, resend_notifier::ResendNotifier,
    },
    config::WorkerConfig,
    ga4::Ga4MetricsFetcher,
    insight::ModelInsightGenerator,
    processor::{ProcessorPorts, ReportProcessor},
    scheduler::DueReportScheduler,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{path::Path, sync::Arc};
use tracing::{info, warn};

pub const MIGRATIONS_DIR: &str = "./migrations";

/// Connects the pool and applies pending migrations from [`MIGRATIONS_DIR`].
pub async fn connect_database(config: &WorkerConfig) -> Result<PgPool, CoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Connected to Postgres");

    info!("Applying database migrations...");
    let migrator = sqlx::migrate::Migrator::new(Path::new(MIGRATIONS_DIR))
        .await
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;
    migrator
        .run(&pool)
        .await
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;
    info!("Migrations applied successfully.");

    Ok(pool)
}

/// Builds the scheduler over Postgres and the HTTP collaborators.
pub fn build_scheduler(
    config: &WorkerConfig,
    pool: PgPool,
) -> Result<DueReportScheduler, CoreError> {
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;

    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set; every analysis will fail");
    }
    if config.google_client_id.is_empty() || config.google_client_secret.is_empty() {
        warn!("GOOGLE_CLIENT_ID or GOOGLE_CLIENT_SECRET not set; analytics fetches will fail");
    }

    let store = Arc::new(PostgresStore::new(pool));
    let analytics = GoogleAnalyticsClient::new(
        http.clone(),
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    );
    let model = GeminiModel::new(
        http.clone(),
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
    );
    let notifier = ResendNotifier::new(
        http,
        config.resend_api_key.clone(),
        config.report_from_address.clone(),
        config.app_url.clone(),
    );

    let processor = ReportProcessor::new(ProcessorPorts {
        tenants: store.clone(),
        properties: store.clone(),
        reports: store.clone(),
        fetcher: Arc::new(Ga4MetricsFetcher::new(
            Arc::new(analytics),
            config.report_window_days,
        )),
        generator: Arc::new(ModelInsightGenerator::new(Arc::new(model))),
        notifier: Arc::new(notifier),
    })
    .with_window_days(config.report_window_days);

    Ok(
        DueReportScheduler::new(store.clone(), store, Arc::new(processor))
            .with_quota(config.quota)
            .with_tenant_concurrency(config.tenant_concurrency),
    )
}
