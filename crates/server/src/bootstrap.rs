use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use souk_agent::runtime::TurnOrchestrator;
use souk_channel::messaging::MessagingClient;
use souk_core::config::{AppConfig, ConfigError, LoadOptions};
use souk_core::registry::{NetworkRegistry, RegistryError};
use souk_db::repositories::{SessionRepository, SqlSessionRepository};
use souk_db::{connect_with_settings, migrations, DbPool};

use crate::gateway::HttpNetworkClient;
use crate::llm_http::OpenAiChatClient;
use crate::messaging_http::TwilioMessagingClient;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub registry: Arc<NetworkRegistry>,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub sessions: Arc<dyn SessionRepository>,
    pub messaging: Arc<dyn MessagingClient>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("client construction failed: {0}")]
    Client(#[source] anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    // The registry is loaded once per process lifetime and read-only after.
    let registry = match &config.network.registry_path {
        Some(path) => NetworkRegistry::load(path)?,
        None => NetworkRegistry::builtin(&config.network.bap_id, &config.network.bap_uri),
    };
    let registry = Arc::new(registry);
    info!(
        event_name = "system.bootstrap.registry_loaded",
        correlation_id = "bootstrap",
        domains = registry.domains.len(),
        "network registry loaded"
    );

    let llm = Arc::new(OpenAiChatClient::from_config(&config.llm).map_err(BootstrapError::Client)?);
    let network = Arc::new(
        HttpNetworkClient::new(config.network.timeout_secs).map_err(BootstrapError::Client)?,
    );
    let messaging: Arc<dyn MessagingClient> = Arc::new(
        TwilioMessagingClient::from_config(&config.channel).map_err(BootstrapError::Client)?,
    );

    let orchestrator = Arc::new(TurnOrchestrator::new(llm, network, registry.clone()));
    let sessions: Arc<dyn SessionRepository> =
        Arc::new(SqlSessionRepository::new(db_pool.clone()));

    Ok(Application { config, db_pool, registry, orchestrator, sessions, messaging })
}
