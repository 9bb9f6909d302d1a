//! Sigfox ingest web server.
//!
//! This binary:
//! - Receives Sigfox callbacks
//! - Rejects messages older than five minutes
//! - Fans each message out to RabbitMQ
//! - Answers with the downlink decision in the same response

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sigfox_ingest::message::SystemClock;
use sigfox_ingest::{build_router, AppState, Config, InMemoryShadow, Pipeline, Publisher};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        cloudamqp_url_set = !config.cloudamqp_url.is_empty(),
        exchange = %config.queue_exchange,
        queue_root = %config.queue_root,
        routing_mode = ?config.routing_mode,
        downlink_source = ?config.downlink_source,
        "config_loaded"
    );

    // Create RabbitMQ publisher; connects lazily on first publish
    let publisher = Publisher::new(config.cloudamqp_url.clone(), config.queue_exchange.clone());
    info!(exchange = %publisher.exchange(), "rabbitmq_publisher_created");

    let pipeline = Pipeline::from_config(
        &config,
        Arc::new(publisher.clone()),
        Arc::new(InMemoryShadow::new()),
        Arc::new(SystemClock),
    );

    let state = AppState::new(pipeline);
    let app = build_router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Close publisher connection
    publisher.close().await;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
