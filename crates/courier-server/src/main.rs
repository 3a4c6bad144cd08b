//! Courier - Notification service entry point

use anyhow::Result;
use courier_api::auth::TokenVerifier;
use courier_api::{create_router, AppState};
use courier_common::config::{Config, LoggingConfig};
use courier_core::directory::{CloudControllerClient, HttpDirectory, UaaClient};
use courier_core::{Repositories, ServiceSettings, Services, SmtpMailer};
use courier_storage::DatabasePool;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_logging(&config.logging);

    info!("Starting Courier notification service...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.migrate().await?;

    // Directory clients. The UAA client also issues our own tokens.
    let uaa = Arc::new(UaaClient::new(&config.uaa)?);
    let cloud_controller = CloudControllerClient::new(&config.cloud_controller)?;
    let directory = Arc::new(HttpDirectory::new(uaa.clone(), cloud_controller));
    let mailer = Arc::new(SmtpMailer::new(&config.smtp)?);

    let services = Services::build(
        Repositories::postgres(db_pool.clone(), config.worker.max_attempts),
        uaa,
        directory,
        mailer,
        ServiceSettings {
            default_scopes: config.dispatch.default_scopes.clone(),
            worker: config.worker.clone(),
        },
    );

    // Start the delivery worker
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = {
        let worker = services.worker.clone();
        tokio::spawn(async move {
            worker.run(shutdown_rx).await;
        })
    };
    info!(
        concurrency = config.worker.concurrency,
        "Delivery worker started"
    );

    // Start API server
    let verifier = TokenVerifier::from_config(&config.uaa)?;
    let app = create_router(AppState::new(&services, verifier, Some(db_pool)));
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting API server on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        error!("API server error: {}", e);
    }

    // Let in-flight jobs finish
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        error!("Delivery worker stopped abnormally: {}", e);
    }

    info!("Courier shutdown complete");
    served.map_err(Into::into)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},courier=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
