use secrecy::ExposeSecret;
use souk_core::config::{AppConfig, LoadOptions};

/// Renders the effective configuration with secrets redacted.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];

    lines.push(render_line("database.url", &config.database.url));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
    ));
    lines.push(render_line("database.timeout_secs", &config.database.timeout_secs.to_string()));

    lines.push(render_line("channel.account_sid", &redact(&config.channel.account_sid)));
    lines.push(render_line(
        "channel.auth_token",
        &redact(config.channel.auth_token.expose_secret()),
    ));
    lines.push(render_line("channel.sender", &config.channel.sender));
    lines.push(render_line(
        "channel.test_recipient",
        config.channel.test_recipient.as_deref().unwrap_or("<unset>"),
    ));

    lines.push(render_line("llm.api_base", &config.llm.api_base));
    lines.push(render_line(
        "llm.api_key",
        &config.llm.api_key.as_ref().map(|key| redact(key.expose_secret())).unwrap_or_default(),
    ));
    lines.push(render_line("llm.model", &config.llm.model));
    lines.push(render_line("llm.timeout_secs", &config.llm.timeout_secs.to_string()));

    lines.push(render_line("network.bap_id", &config.network.bap_id));
    lines.push(render_line("network.bap_uri", &config.network.bap_uri));
    lines.push(render_line(
        "network.registry_path",
        &config
            .network
            .registry_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<builtin>".to_string()),
    ));

    lines.push(render_line(
        "backend.base_url",
        config.backend.base_url.as_deref().unwrap_or("<unset>"),
    ));

    lines.push(render_line("server.bind_address", &config.server.bind_address));
    lines.push(render_line("server.port", &config.server.port.to_string()));

    lines.push(render_line("logging.level", &config.logging.level));
    lines.push(render_line("logging.format", &format!("{:?}", config.logging.format)));

    lines.join("\n")
}

fn render_line(key: &str, value: &str) -> String {
    format!("  {key} = {value}")
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "<unset>".to_string();
    }
    if secret.len() <= 4 {
        return "****".to_string();
    }
    format!("{}****", &secret[..4])
}

#[cfg(test)]
mod tests {
    use super::redact;

    #[test]
    fn redaction_keeps_only_a_short_prefix() {
        assert_eq!(redact("ACxxxxsecretsecret"), "ACxx****");
        assert_eq!(redact("abc"), "****");
        assert_eq!(redact(""), "<unset>");
    }
}
