use souk_core::config::{AppConfig, LoadOptions};
use souk_db::{connect_with_settings, migrations};

use super::CommandResult;

pub async fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("migrate", "config", error.to_string(), 2),
    };

    let pool = match connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    {
        Ok(pool) => pool,
        Err(error) => return CommandResult::failure("migrate", "database", error.to_string(), 2),
    };

    let result = migrations::run_pending(&pool).await;
    pool.close().await;

    match result {
        Ok(()) => CommandResult::success("migrate", "migrations applied"),
        Err(error) => CommandResult::failure("migrate", "migration", error.to_string(), 2),
    }
}
