//! services/client/src/bin/vaccimap.rs

use client_lib::{
    adapters::{BundledScheduleAdapter, DeviceLocationAdapter, LocalIdentityAdapter, PgProfileAdapter},
    config::Config,
    error::ClientError,
    shell::Shell,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vaccimap_core::{Lifecycle, Services, VerifierToken};

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Configuration loaded. Starting VacciMap...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let profiles = Arc::new(PgProfileAdapter::new(db_pool, config.app_instance_id.clone()));
    info!("Running database migrations...");
    profiles.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();
    let identity = Arc::new(
        LocalIdentityAdapter::open(&config.session_store_path, config.otp_ttl, deliveries_tx).await?,
    );
    let location = Arc::new(DeviceLocationAdapter::new(
        config.location_permission,
        config.device_location,
    ));
    let schedule = Arc::new(BundledScheduleAdapter::new(config.schedule_path.clone()));

    let services = Services {
        identity,
        profiles,
        location,
        schedule,
    };

    // --- 4. Run the Terminal Shell ---
    let shell = Shell::new(
        Lifecycle::new(services),
        VerifierToken(config.verifier_token.clone()),
        tokio::io::stdout(),
    );
    shell
        .run(BufReader::new(tokio::io::stdin()), deliveries_rx)
        .await?;

    info!("Goodbye.");
    Ok(())
}
