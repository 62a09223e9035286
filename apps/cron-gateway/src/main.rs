use core_lib::{config::WorkerConfig, runtime};
use cron_gateway::{AppState, PROCESS_REPORTS_PATH, create_app};
use dotenvy::dotenv;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() {
    // Initialize tracing (logging)
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(EnvFilter::from_default_env()) // Allow RUST_LOG
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting Cron Gateway v{}...", env!("CARGO_PKG_VERSION"));
    // Load environment (.env) if present
    dotenv().ok();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let Some(cron_secret) = config.cron_secret.clone() else {
        error!("CRON_SECRET must be set for the cron gateway");
        std::process::exit(1);
    };

    let pool = match runtime::connect_database(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Database setup failed: {}", e);
            std::process::exit(1);
        }
    };
    let scheduler = match runtime::build_scheduler(&config, pool) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("Failed to build scheduler: {}", e);
            std::process::exit(1);
        }
    };

    let app_state = AppState {
        scheduler: Arc::new(scheduler),
        cron_secret: Arc::from(cron_secret),
    };
    let app = create_app(app_state);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .expect("LISTEN_ADDR must be a socket address");
    info!("Listening on {} (trigger: GET {})", addr, PROCESS_REPORTS_PATH);
    let listener = TcpListener::bind(addr).await.expect("Failed to bind address");
    axum::serve(listener, app.into_make_service())
        .await
        .expect("Server failed");
}
