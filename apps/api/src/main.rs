use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::AppointmentState;
use confirmation_queue_cell::{FanOutRouter, RedisNotificationChannel};
use shared_config::AppConfig;
use shared_database::RedisAppointmentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting appointment API server");

    let config = AppConfig::from_env();

    let store = RedisAppointmentStore::new(&config)
        .await
        .context("failed to connect to the appointment store")?;

    // Publishing never touches a processing list, so the worker id is informational.
    let peru = RedisNotificationChannel::new(&config, &config.channel_pe_name, "api")
        .await
        .context("failed to open the PE channel")?;
    let chile = RedisNotificationChannel::new(&config, &config.channel_cl_name, "api")
        .await
        .context("failed to open the CL channel")?;

    let state = Arc::new(AppointmentState::new(
        &config,
        Arc::new(store),
        FanOutRouter::new(Arc::new(peru), Arc::new(chile)),
    ));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
