use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use confirmation_queue_cell::{ConsumerService, CountryConsumer, RedisNotificationChannel, WorkerConfig};
use shared_config::AppConfig;
use shared_database::{AppointmentStore, RedisAppointmentStore, SupabaseConfirmedStore};
use shared_models::CountryCode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    anyhow::ensure!(
        config.is_confirmed_store_configured(),
        "SUPABASE_URL and SUPABASE_ANON_PUBLIC_KEY are required to persist confirmations"
    );

    let worker_config = WorkerConfig::from_app_config(&config);
    info!("Starting confirmation worker {}", worker_config.worker_id);

    let master: Arc<dyn AppointmentStore> = Arc::new(
        RedisAppointmentStore::new(&config)
            .await
            .context("failed to connect to the appointment store")?,
    );

    let mut consumers = Vec::new();
    for country in CountryCode::ALL {
        consumers.push(build_consumer(&config, &worker_config, country, Arc::clone(&master)).await?);
    }

    let service = Arc::new(ConsumerService::new(consumers));
    let running = Arc::clone(&service);
    let handle = tokio::spawn(async move { running.start().await });

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("Ctrl-C received");
    service.shutdown().await;

    match handle.await {
        Ok(Ok(())) => info!("Confirmation worker stopped"),
        Ok(Err(e)) => error!("Consumer service failed: {}", e),
        Err(e) => error!("Consumer service task panicked: {}", e),
    }

    Ok(())
}

async fn build_consumer(
    config: &AppConfig,
    worker_config: &WorkerConfig,
    country: CountryCode,
    master: Arc<dyn AppointmentStore>,
) -> anyhow::Result<CountryConsumer> {
    let channel_name = match country {
        CountryCode::Peru => &config.channel_pe_name,
        CountryCode::Chile => &config.channel_cl_name,
    };

    let channel = RedisNotificationChannel::new(config, channel_name, &worker_config.worker_id)
        .await
        .with_context(|| format!("failed to open channel {}", channel_name))?;
    let store = SupabaseConfirmedStore::for_country(config, country);

    info!("{} consumer bound to channel {} and table {}", country, channel_name, store.table());

    let consumer = CountryConsumer::new(
        country,
        Arc::new(channel),
        Arc::new(store),
        master,
        worker_config.clone(),
    )?;
    Ok(consumer)
}
