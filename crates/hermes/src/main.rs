//! Hermes - scheduled trigger worker for Registrar
//!
//! Periodically claims due scheduled triggers and runs the actions of the
//! rule each one names. Failed runs stay queued and are retried on a later
//! sweep once their lease expires.

mod config;
mod scheduler;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use registrar::AppState;
use registrar::db::connect_and_migrate;
use registrar_rules::actions::TracingMessenger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::scheduler::TriggerScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::from_env()?);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hermes=debug,registrar=debug,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Hermes trigger worker");
    tracing::info!("Environment: {}", config.environment);

    tracing::info!("Connecting to database...");
    let db_pool = connect_and_migrate(&config.app.database).await?;
    tracing::info!("Database connected");

    let state = AppState::new(db_pool, Arc::new(TracingMessenger), config.app.clone());

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        tracing::info!("Shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    let mut scheduler = TriggerScheduler::new(config, state).await?;
    scheduler.setup_jobs().await?;

    tracing::info!("Hermes ready, starting scheduler");
    scheduler.start().await?;

    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
    }

    tracing::info!("Shutting down scheduler...");
    scheduler.shutdown().await?;

    tracing::info!("Hermes shutdown complete");
    Ok(())
}
