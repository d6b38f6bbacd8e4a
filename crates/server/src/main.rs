mod bootstrap;
mod gateway;
mod health;
mod llm_http;
mod messaging_http;
mod ops;
mod webhook;

use anyhow::Result;
use axum::Router;
use souk_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use souk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let ops_state = ops::OpsState::new(
        std::sync::Arc::new(gateway::HttpNetworkClient::new(app.config.network.timeout_secs)?),
        app.messaging.clone(),
        &app.config.backend,
        app.config.channel.test_recipient.clone(),
    );

    let router = Router::new()
        .merge(health::router(app.db_pool.clone()))
        .merge(webhook::router(
            app.orchestrator.clone(),
            app.sessions.clone(),
            app.messaging.clone(),
        ))
        .merge(ops::router(ops_state));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "souk-server started"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "souk-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
