//! Gavel Backend Worker
//!
//! Entry point for the auction expiration worker. This process:
//! - re-arms expiration triggers for auctions that were active at startup
//! - runs the periodic sweep that closes auctions whose trigger was lost
//! - delivers queued webhooks to the fraud/analytics collaborator

use gavel_backend::config::AppConfig;
use gavel_backend::database::{create_pool, run_migrations};
use gavel_backend::error::{AppError, AppResult};
use gavel_backend::AppState;
use tracing::{error, info};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    // Initialize tracing/logging with config
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("gavel_backend={},sqlx=warn", config.log_level).into()
            }),
        )
        .init();

    info!("Gavel auction worker starting");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("Sweep interval: {}s", config.sweep_interval_secs);

    // =========================================================================
    // DATABASE SETUP
    // =========================================================================
    info!("Connecting to database...");

    let pool = create_pool(&config.database).await.map_err(|e| {
        error!("Failed to create database pool: {}", e);
        AppError::Database(e)
    })?;

    info!("Database connection pool created successfully");
    info!("Max connections: {}", config.database.max_connections);

    info!("Running database migrations...");
    run_migrations(&pool, None).await.map_err(|e| {
        error!("Database migration failed: {}", e);
        AppError::Database(e)
    })?;
    info!("Database migrations completed successfully");

    // =========================================================================
    // SERVICES
    // =========================================================================
    let state = AppState::new(pool, &config);
    info!("✓ Stores, collaborators and services initialized");

    // Timers do not survive restarts; re-arm a trigger per active auction
    let rearmed = state.scheduler.rearm_active_auctions().await?;
    info!("✓ Re-armed expiration triggers for {} active auctions", rearmed);

    let sweep_handle = tokio::spawn(state.scheduler.clone().start_sweep());
    info!("✓ Expiration sweep started");

    info!("Gavel auction worker ready, press Ctrl+C to shut down");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = sweep_handle => {
            error!("Expiration sweep exited unexpectedly");
        }
    }

    info!("Gavel auction worker shutdown complete");
    Ok(())
}
