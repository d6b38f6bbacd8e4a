use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub channel: ChannelConfig,
    pub llm: LlmConfig,
    pub network: NetworkConfig,
    pub backend: BackendConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Messaging-provider credentials (Twilio-style WhatsApp channel).
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// Number messages are sent from, e.g. `+14155238886`.
    pub sender: String,
    /// Fallback recipient for back-office notifications.
    pub test_recipient: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
}

/// Requesting-participant identity on the commerce network plus the optional
/// registry file describing supported domains.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub bap_id: String,
    pub bap_uri: String,
    pub registry_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

/// Internal order-management backend used by the back-office routes.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: Option<String>,
    pub api_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_api_base: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub channel_account_sid: Option<String>,
    pub channel_auth_token: Option<String>,
    pub channel_sender: Option<String>,
    pub bap_id: Option<String>,
    pub bap_uri: Option<String>,
    pub registry_path: Option<PathBuf>,
    pub backend_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://souk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            channel: ChannelConfig {
                account_sid: String::new(),
                auth_token: String::new().into(),
                sender: String::new(),
                test_recipient: None,
                timeout_secs: 15,
            },
            llm: LlmConfig {
                api_base: "https://api.openai.com/v1".to_string(),
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
            },
            network: NetworkConfig {
                bap_id: "bap.souk.example".to_string(),
                bap_uri: "https://bap.souk.example".to_string(),
                registry_path: None,
                timeout_secs: 30,
            },
            backend: BackendConfig { base_url: None, api_token: None },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("souk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(channel) = patch.channel {
            if let Some(account_sid) = channel.account_sid {
                self.channel.account_sid = account_sid;
            }
            if let Some(auth_token_value) = channel.auth_token {
                self.channel.auth_token = secret_value(auth_token_value);
            }
            if let Some(sender) = channel.sender {
                self.channel.sender = sender;
            }
            if let Some(test_recipient) = channel.test_recipient {
                self.channel.test_recipient = Some(test_recipient);
            }
            if let Some(timeout_secs) = channel.timeout_secs {
                self.channel.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_base) = llm.api_base {
                self.llm.api_base = api_base;
            }
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key_value));
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(network) = patch.network {
            if let Some(bap_id) = network.bap_id {
                self.network.bap_id = bap_id;
            }
            if let Some(bap_uri) = network.bap_uri {
                self.network.bap_uri = bap_uri;
            }
            if let Some(registry_path) = network.registry_path {
                self.network.registry_path = Some(PathBuf::from(registry_path));
            }
            if let Some(timeout_secs) = network.timeout_secs {
                self.network.timeout_secs = timeout_secs;
            }
        }

        if let Some(backend) = patch.backend {
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = Some(base_url);
            }
            if let Some(api_token_value) = backend.api_token {
                self.backend.api_token = Some(secret_value(api_token_value));
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SOUK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SOUK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("SOUK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SOUK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SOUK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOUK_CHANNEL_ACCOUNT_SID") {
            self.channel.account_sid = value;
        }
        if let Some(value) = read_env("SOUK_CHANNEL_AUTH_TOKEN") {
            self.channel.auth_token = secret_value(value);
        }
        if let Some(value) = read_env("SOUK_CHANNEL_SENDER") {
            self.channel.sender = value;
        }
        if let Some(value) = read_env("SOUK_CHANNEL_TEST_RECIPIENT") {
            self.channel.test_recipient = Some(value);
        }
        if let Some(value) = read_env("SOUK_CHANNEL_TIMEOUT_SECS") {
            self.channel.timeout_secs = parse_u64("SOUK_CHANNEL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOUK_LLM_API_BASE") {
            self.llm.api_base = value;
        }
        if let Some(value) = read_env("SOUK_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SOUK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SOUK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SOUK_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOUK_NETWORK_BAP_ID") {
            self.network.bap_id = value;
        }
        if let Some(value) = read_env("SOUK_NETWORK_BAP_URI") {
            self.network.bap_uri = value;
        }
        if let Some(value) = read_env("SOUK_NETWORK_REGISTRY_PATH") {
            self.network.registry_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("SOUK_NETWORK_TIMEOUT_SECS") {
            self.network.timeout_secs = parse_u64("SOUK_NETWORK_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOUK_BACKEND_BASE_URL") {
            self.backend.base_url = Some(value);
        }
        if let Some(value) = read_env("SOUK_BACKEND_API_TOKEN") {
            self.backend.api_token = Some(secret_value(value));
        }

        if let Some(value) = read_env("SOUK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SOUK_SERVER_PORT") {
            self.server.port = parse_u16("SOUK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SOUK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SOUK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("SOUK_LOGGING_LEVEL").or_else(|| read_env("SOUK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("SOUK_LOGGING_FORMAT").or_else(|| read_env("SOUK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_api_base) = overrides.llm_api_base {
            self.llm.api_base = llm_api_base;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(account_sid) = overrides.channel_account_sid {
            self.channel.account_sid = account_sid;
        }
        if let Some(auth_token) = overrides.channel_auth_token {
            self.channel.auth_token = secret_value(auth_token);
        }
        if let Some(sender) = overrides.channel_sender {
            self.channel.sender = sender;
        }
        if let Some(bap_id) = overrides.bap_id {
            self.network.bap_id = bap_id;
        }
        if let Some(bap_uri) = overrides.bap_uri {
            self.network.bap_uri = bap_uri;
        }
        if let Some(registry_path) = overrides.registry_path {
            self.network.registry_path = Some(registry_path);
        }
        if let Some(backend_base_url) = overrides.backend_base_url {
            self.backend.base_url = Some(backend_base_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_channel(&self.channel)?;
        validate_llm(&self.llm)?;
        validate_network(&self.network)?;
        validate_backend(&self.backend)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("souk.toml"), PathBuf::from("config/souk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_channel(channel: &ChannelConfig) -> Result<(), ConfigError> {
    if channel.account_sid.is_empty() {
        return Err(ConfigError::Validation(
            "channel.account_sid is required. Get it from your messaging provider console"
                .to_string(),
        ));
    }
    if !channel.account_sid.starts_with("AC") {
        return Err(ConfigError::Validation(
            "channel.account_sid must start with `AC` (hint: this is the account SID, not the auth token)"
                .to_string(),
        ));
    }

    if channel.auth_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation("channel.auth_token is required".to_string()));
    }

    if channel.sender.trim().is_empty() {
        return Err(ConfigError::Validation(
            "channel.sender is required (the provisioned WhatsApp number, e.g. +14155238886)"
                .to_string(),
        ));
    }

    if channel.timeout_secs == 0 || channel.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "channel.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !llm.api_base.starts_with("http://") && !llm.api_base.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.api_base must start with http:// or https://".to_string(),
        ));
    }

    let missing =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing {
        return Err(ConfigError::Validation("llm.api_key is required".to_string()));
    }

    Ok(())
}

fn validate_network(network: &NetworkConfig) -> Result<(), ConfigError> {
    if network.bap_id.trim().is_empty() {
        return Err(ConfigError::Validation("network.bap_id is required".to_string()));
    }
    if !network.bap_uri.starts_with("http://") && !network.bap_uri.starts_with("https://") {
        return Err(ConfigError::Validation(
            "network.bap_uri must start with http:// or https://".to_string(),
        ));
    }
    if network.timeout_secs == 0 || network.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "network.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &backend.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "backend.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    channel: Option<ChannelPatch>,
    llm: Option<LlmPatch>,
    network: Option<NetworkPatch>,
    backend: Option<BackendPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelPatch {
    account_sid: Option<String>,
    auth_token: Option<String>,
    sender: Option<String>,
    test_recipient: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NetworkPatch {
    bap_id: Option<String>,
    bap_uri: Option<String>,
    registry_path: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    base_url: Option<String>,
    api_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
