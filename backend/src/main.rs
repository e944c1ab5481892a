//! CropSense monitoring service entry point

use shared::NutrientModel;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cropsense_backend::config::Config;
use cropsense_backend::external::OpenWeatherClient;
use cropsense_backend::services::{CycleService, MonitorScheduler, MonitorSettings};
use cropsense_backend::store::PgCycleStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cropsense_backend=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(environment = %config.environment, "starting CropSense monitor");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    if config.environment == "development" {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("migrations applied");
    }

    let gateway_timeout = Duration::from_secs(config.weather.timeout_seconds);
    let gateway = Arc::new(OpenWeatherClient::with_base_url(
        config.weather.api_key.clone(),
        config.weather.api_endpoint.clone(),
        gateway_timeout,
    )?);
    let store = Arc::new(PgCycleStore::new(pool));
    let service = Arc::new(CycleService::new(
        store,
        gateway,
        NutrientModel::default(),
        gateway_timeout,
    ));

    let scheduler = MonitorScheduler::new(
        Arc::clone(&service),
        MonitorSettings {
            interval: Duration::from_secs(config.monitor.interval_minutes * 60),
            max_concurrent_checks: config.monitor.max_concurrent_checks,
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler.run(shutdown_rx).await;
    tracing::info!("monitor stopped");
    Ok(())
}
